use std::path::PathBuf;

use clap::Args;
use tf_driver::{DriverConfig, ToolLogLevel};

/// Job settings shared by every subcommand. Anything given here overrides the
/// value loaded from `--config`.
#[derive(Args, Debug, Default)]
pub struct JobArgs {
    /// Exact terraform version to install (e.g. 1.5.7)
    #[arg(id = "tf_version", long = "tf-version", env = "TFDRIVE_VERSION")]
    pub version: Option<String>,

    /// Terraform working directory, relative to the job root
    #[arg(long, env = "TFDRIVE_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Directory the working directory and scratch files hang off
    #[arg(long, env = "TFDRIVE_JOB_ROOT")]
    pub job_root: Option<PathBuf>,

    /// Saved plan file: written by plan, shown as JSON, consumed by apply
    #[arg(long, env = "TFDRIVE_PLAN_FILE")]
    pub plan_file: Option<PathBuf>,

    // ---- init ----
    /// Skip backend initialisation
    #[arg(long)]
    pub no_backend: bool,

    /// Backend configuration (repeatable)
    #[arg(long, value_name = "KEY=VALUE")]
    pub backend_config: Vec<String>,

    #[arg(long)]
    pub force_copy: bool,

    /// Copy a module into the empty working directory first
    #[arg(long)]
    pub from_module: Option<String>,

    /// Do not download modules
    #[arg(long)]
    pub no_get: bool,

    #[arg(long)]
    pub reconfigure: bool,

    #[arg(long)]
    pub upgrade: bool,

    // ---- plan / apply / destroy ----
    /// Do not hold a state lock
    #[arg(long)]
    pub no_lock: bool,

    #[arg(long)]
    pub lock_timeout: Option<String>,

    /// Input variable (repeatable)
    #[arg(long, value_name = "NAME=VALUE")]
    pub var: Vec<String>,

    /// Variables file (repeatable)
    #[arg(long)]
    pub var_file: Vec<String>,

    /// Resource address to target (repeatable)
    #[arg(long)]
    pub target: Vec<String>,

    /// Resource address to force replacement of (repeatable)
    #[arg(long)]
    pub replace: Vec<String>,

    /// Skip state refresh
    #[arg(long)]
    pub no_refresh: bool,

    /// Produce a destroy plan
    #[arg(long)]
    pub plan_destroy: bool,

    #[arg(long)]
    pub parallelism: Option<u32>,

    #[arg(long)]
    pub backup: Option<String>,

    #[arg(long)]
    pub state_out: Option<String>,

    // ---- force-unlock ----
    #[arg(long, env = "TFDRIVE_LOCK_ID")]
    pub lock_id: Option<String>,

    // ---- tool ----
    /// Terraform's own log level (trace, debug, info, warn, error, off)
    #[arg(long, env = "TFDRIVE_TF_LOG")]
    pub tf_log: Option<ToolLogLevel>,

    /// Release mirror to download terraform from
    #[arg(long, env = "TFDRIVE_DOWNLOAD_ENDPOINT")]
    pub download_endpoint: Option<String>,

    #[arg(long, env = "TFDRIVE_SKIP_TLS_VERIFY")]
    pub skip_tls_verify: bool,

    /// Use this terraform binary (path or name on PATH) instead of downloading
    #[arg(long, env = "TFDRIVE_TF_BINARY")]
    pub tf_binary: Option<PathBuf>,

    /// Override files to copy into the working directory
    #[arg(long, env = "TFDRIVE_OVERRIDE_DIR")]
    pub override_dir: Option<PathBuf>,
}

impl JobArgs {
    /// Fold flags into `config`. Switches only ever move a setting away from
    /// terraform's default; list flags append.
    pub fn apply_to(self, config: &mut DriverConfig) {
        if let Some(v) = self.version {
            config.version = v;
        }
        if let Some(v) = self.work_dir {
            config.work_dir = v;
        }
        if let Some(v) = self.job_root {
            config.job_root = v;
        }
        if self.plan_file.is_some() {
            config.plan_file = self.plan_file;
        }

        config.backend &= !self.no_backend;
        config.backend_config.extend(self.backend_config);
        config.force_copy |= self.force_copy;
        if self.from_module.is_some() {
            config.from_module = self.from_module;
        }
        config.get &= !self.no_get;
        config.reconfigure |= self.reconfigure;
        config.upgrade |= self.upgrade;

        config.lock &= !self.no_lock;
        if let Some(v) = self.lock_timeout {
            config.lock_timeout = v;
        }
        config.var.extend(self.var);
        config.var_file.extend(self.var_file);
        config.target.extend(self.target);
        config.replace.extend(self.replace);
        config.refresh &= !self.no_refresh;
        config.destroy |= self.plan_destroy;
        if let Some(v) = self.parallelism {
            config.parallelism = v;
        }
        if self.backup.is_some() {
            config.backup = self.backup;
        }
        if self.state_out.is_some() {
            config.state_out = self.state_out;
        }

        if self.lock_id.is_some() {
            config.lock_id = self.lock_id;
        }

        if let Some(v) = self.tf_log {
            config.tool_log = v;
        }
        if self.download_endpoint.is_some() {
            config.download_endpoint = self.download_endpoint;
        }
        config.skip_tls_verify |= self.skip_tls_verify;
        if self.tf_binary.is_some() {
            config.tool_binary = self.tf_binary;
        }
        if self.override_dir.is_some() {
            config.override_dir = self.override_dir;
        }
    }
}
