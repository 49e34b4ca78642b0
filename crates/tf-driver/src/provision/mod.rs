//! Acquiring a specific terraform binary and releasing it afterwards.
//!
//! Two installers share one contract: [`ReleaseInstaller`] downloads an exact
//! release and verifies it, [`LocalInstaller`] stages a pre-built binary.
//! Both install into a private temporary directory that `remove` deletes.

mod local;
mod release;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::DriverConfig;
use crate::Result;

pub use local::LocalInstaller;
pub use release::{ReleaseInstaller, DEFAULT_ENDPOINT};

#[async_trait]
pub trait Installer: Send + Sync {
    /// Make the binary available locally and return its path.
    async fn install(&self) -> Result<PathBuf>;

    /// Delete whatever `install` put in place. Best effort: callers log a
    /// failure and carry on.
    async fn remove(&self) -> Result<()>;
}

/// The executable a run is bound to, with the version it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTool {
    pub exec_path: PathBuf,
    pub version: String,
}

/// Pick the installer `config` asks for.
pub fn installer_for(config: &DriverConfig) -> Box<dyn Installer> {
    match &config.tool_binary {
        Some(source) => Box::new(LocalInstaller::new(source.clone())),
        None => Box::new(ReleaseInstaller::new(
            config.version.clone(),
            config.download_endpoint.clone(),
            config.skip_tls_verify,
        )),
    }
}

#[async_trait]
impl Installer for Box<dyn Installer> {
    async fn install(&self) -> Result<PathBuf> {
        (**self).install().await
    }

    async fn remove(&self) -> Result<()> {
        (**self).remove().await
    }
}

fn make_executable(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}
