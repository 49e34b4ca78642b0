use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{make_executable, Installer};
use crate::tool::BINARY_NAME;
use crate::{DriverError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://releases.hashicorp.com";

/// Downloads one exact terraform release, checks it against the published
/// SHA256SUMS, and unpacks the binary into a private temp directory.
pub struct ReleaseInstaller {
    version: String,
    endpoint: String,
    skip_tls_verify: bool,
    install_dir: Mutex<Option<TempDir>>,
}

impl ReleaseInstaller {
    pub fn new(version: String, endpoint: Option<String>, skip_tls_verify: bool) -> Self {
        let endpoint = endpoint
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            version,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            skip_tls_verify,
            install_dir: Mutex::new(None),
        }
    }

    fn release_url(&self, file: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.endpoint, BINARY_NAME, self.version, file
        )
    }

    async fn fetch(&self, client: &reqwest::Client, file: &str) -> Result<Vec<u8>> {
        let url = self.release_url(file);
        debug!(url = %url, "downloading");
        let download = |source| DriverError::Download {
            url: url.clone(),
            source,
        };
        let resp = client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(download)?;
        let bytes = resp.bytes().await.map_err(download)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Installer for ReleaseInstaller {
    async fn install(&self) -> Result<PathBuf> {
        let (os, arch) = platform()?;
        let archive_name = archive_name(&self.version, os, arch);
        let sums_name = format!("{BINARY_NAME}_{}_SHA256SUMS", self.version);

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.skip_tls_verify)
            .build()
            .map_err(|source| DriverError::Download {
                url: self.endpoint.clone(),
                source,
            })?;

        let sums = self.fetch(&client, &sums_name).await?;
        let sums = String::from_utf8_lossy(&sums);
        let expected = expected_sum(&sums, &archive_name).ok_or_else(|| {
            DriverError::Config(format!("{sums_name} has no entry for {archive_name}"))
        })?;

        let archive = self.fetch(&client, &archive_name).await?;
        verify_sum(&archive_name, &archive, &expected)?;

        let dir = tempfile::Builder::new().prefix("tf-install-").tempdir()?;
        let dest = dir.path().to_path_buf();
        let exec_path = tokio::task::spawn_blocking(move || extract_binary(&archive, &dest))
            .await
            .map_err(std::io::Error::other)??;

        info!(
            version = %self.version,
            path = %exec_path.display(),
            "installed terraform release"
        );
        *self.install_dir.lock().await = Some(dir);
        Ok(exec_path)
    }

    async fn remove(&self) -> Result<()> {
        if let Some(dir) = self.install_dir.lock().await.take() {
            dir.close()?;
        }
        Ok(())
    }
}

/// Release platform names for the running host.
fn platform() -> Result<(&'static str, &'static str)> {
    let os = match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "darwin",
        "freebsd" => "freebsd",
        "openbsd" => "openbsd",
        other => {
            return Err(DriverError::UnsupportedPlatform {
                os: other.into(),
                arch: std::env::consts::ARCH.into(),
            })
        }
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        other => {
            return Err(DriverError::UnsupportedPlatform {
                os: os.into(),
                arch: other.into(),
            })
        }
    };
    Ok((os, arch))
}

fn archive_name(version: &str, os: &str, arch: &str) -> String {
    format!("{BINARY_NAME}_{version}_{os}_{arch}.zip")
}

/// Find `file`'s digest in a `sha256sum`-style listing.
fn expected_sum(sums: &str, file: &str) -> Option<String> {
    sums.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?;
        (name == file).then(|| digest.to_lowercase())
    })
}

fn verify_sum(file: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = format!("{:x}", Sha256::digest(data));
    if actual != expected {
        return Err(DriverError::Checksum {
            file: file.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn extract_binary(archive: &[u8], dest: &Path) -> Result<PathBuf> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut entry = zip.by_name(BINARY_NAME)?;
    let path = dest.join(BINARY_NAME);
    let mut out = std::fs::File::create(&path)?;
    std::io::copy(&mut entry, &mut out)?;
    make_executable(&path, 0o755)?;
    Ok(path)
}
