use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::info;

use super::{make_executable, Installer};
use crate::tool::BINARY_NAME;
use crate::{DriverError, Result};

/// Stages a pre-built binary (a custom build, or one already on `PATH`)
/// by copying it into a private directory, owner-executable only.
pub struct LocalInstaller {
    source: PathBuf,
    install_dir: Mutex<Option<TempDir>>,
}

impl LocalInstaller {
    pub fn new(source: PathBuf) -> Self {
        Self {
            source,
            install_dir: Mutex::new(None),
        }
    }

    /// A bare name like `terraform` is looked up on `PATH`; anything with a
    /// directory component is taken as a path.
    fn resolve_source(&self) -> Result<PathBuf> {
        let is_bare_name = self.source.components().count() == 1 && !self.source.exists();
        if is_bare_name {
            return which::which(&self.source)
                .map_err(|e| DriverError::BinaryNotFound(format!("{}: {e}", self.source.display())));
        }
        if !self.source.is_file() {
            return Err(DriverError::BinaryNotFound(self.source.display().to_string()));
        }
        Ok(self.source.clone())
    }
}

#[async_trait]
impl Installer for LocalInstaller {
    async fn install(&self) -> Result<PathBuf> {
        let source = self.resolve_source()?;
        let dir = tempfile::Builder::new().prefix("tf-install-").tempdir()?;
        let dest = dir.path().join(BINARY_NAME);
        copy_binary(&source, &dest)?;
        info!(
            source = %source.display(),
            path = %dest.display(),
            "staged local terraform binary"
        );
        *self.install_dir.lock().await = Some(dir);
        Ok(dest)
    }

    async fn remove(&self) -> Result<()> {
        if let Some(dir) = self.install_dir.lock().await.take() {
            dir.close()?;
        }
        Ok(())
    }
}

fn copy_binary(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst)?;
    make_executable(dst, 0o700)?;
    Ok(())
}
