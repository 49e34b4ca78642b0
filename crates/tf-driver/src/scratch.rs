use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::DriverConfig;
use crate::Result;

pub const SCRATCH_DIR: &str = "scratch";
pub const PLAN_JSON: &str = "plan.json";
pub const OUTPUT_JSON: &str = "output.json";
pub const LOG_FILE: &str = "job.log";

/// Filesystem layout of one job: the terraform working directory plus a
/// scratch directory for the artifacts a run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    pub work_dir: PathBuf,
    pub scratch_dir: PathBuf,
    /// `show -json` output of the saved plan.
    pub plan_path: PathBuf,
    /// `output -json` result.
    pub output_path: PathBuf,
    /// Terraform's own log (`TF_LOG_PATH`).
    pub log_path: PathBuf,
}

impl JobLayout {
    pub fn new(config: &DriverConfig) -> Self {
        let scratch_dir = config.job_root.join(SCRATCH_DIR);
        Self {
            work_dir: config.resolved_work_dir(),
            plan_path: scratch_dir.join(PLAN_JSON),
            output_path: scratch_dir.join(OUTPUT_JSON),
            log_path: scratch_dir.join(LOG_FILE),
            scratch_dir,
        }
    }

    /// Create the working and scratch directories if absent.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(&self.scratch_dir)?;
        Ok(())
    }
}

/// Files created during a run that must not outlive it.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    files: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &Path) {
        if !self.files.iter().any(|f| f == path) {
            self.files.push(path.to_path_buf());
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove every registered file. All removals are attempted; failures
    /// are logged and the number of failures returned. Already-missing files
    /// count as removed.
    pub fn cleanup(&mut self) -> usize {
        debug!(count = self.files.len(), "cleaning up files...");
        let mut failed = 0;
        for path in self.files.drain(..) {
            let res = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match res {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error while cleaning up");
                    failed += 1;
                }
            }
        }
        failed
    }
}
