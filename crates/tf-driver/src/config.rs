use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::{DriverError, Result};

pub const DEFAULT_LOCK_TIMEOUT: &str = "0s";
pub const DEFAULT_PARALLELISM: u32 = 10;

// ---------------------------------------------------------------------------
// ToolLogLevel
// ---------------------------------------------------------------------------

/// Level passed to terraform through `TF_LOG` / `TF_LOG_PROVIDER`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolLogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl ToolLogLevel {
    /// The value terraform expects, or `None` when tool logging is disabled.
    pub fn as_env(&self) -> Option<&'static str> {
        match self {
            ToolLogLevel::Trace => Some("TRACE"),
            ToolLogLevel::Debug => Some("DEBUG"),
            ToolLogLevel::Info => Some("INFO"),
            ToolLogLevel::Warn => Some("WARN"),
            ToolLogLevel::Error => Some("ERROR"),
            ToolLogLevel::Off => None,
        }
    }
}

impl std::str::FromStr for ToolLogLevel {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(ToolLogLevel::Trace),
            "debug" => Ok(ToolLogLevel::Debug),
            "info" => Ok(ToolLogLevel::Info),
            "warn" => Ok(ToolLogLevel::Warn),
            "error" => Ok(ToolLogLevel::Error),
            "off" => Ok(ToolLogLevel::Off),
            other => Err(DriverError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// DriverConfig
// ---------------------------------------------------------------------------

/// Everything one driver invocation needs. Built once, then only read.
///
/// Boolean and scalar fields default to terraform's own defaults so that an
/// untouched config produces no override flags at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Actions in execution order.
    pub actions: Vec<Action>,
    /// Exact terraform version to install, e.g. `1.5.7`.
    pub version: String,
    /// Root that relative `work_dir` and the scratch directory hang off.
    pub job_root: PathBuf,
    /// Directory holding the terraform program and its state.
    pub work_dir: PathBuf,
    /// Binary plan file written by `plan` and read by `show` / `apply`.
    pub plan_file: Option<PathBuf>,

    // init
    pub backend: bool,
    pub backend_config: Vec<String>,
    pub force_copy: bool,
    pub from_module: Option<String>,
    pub get: bool,
    pub reconfigure: bool,
    pub upgrade: bool,

    // plan / apply / destroy
    pub lock: bool,
    pub lock_timeout: String,
    pub var: Vec<String>,
    pub var_file: Vec<String>,
    pub target: Vec<String>,
    pub replace: Vec<String>,
    pub refresh: bool,
    pub destroy: bool,
    pub parallelism: u32,
    pub backup: Option<String>,
    pub state_out: Option<String>,

    // force-unlock
    pub lock_id: Option<String>,

    /// Echo captured `show` / `output` JSON to the console as well.
    pub debug: bool,
    pub tool_log: ToolLogLevel,

    // provisioning
    pub download_endpoint: Option<String>,
    pub skip_tls_verify: bool,
    /// Pre-built binary (path or name on `PATH`) used instead of a download.
    pub tool_binary: Option<PathBuf>,
    /// Override files copied into the working directory before any action.
    pub override_dir: Option<PathBuf>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
            version: String::new(),
            job_root: PathBuf::from("."),
            work_dir: PathBuf::new(),
            plan_file: None,
            backend: true,
            backend_config: Vec::new(),
            force_copy: false,
            from_module: None,
            get: true,
            reconfigure: false,
            upgrade: false,
            lock: true,
            lock_timeout: DEFAULT_LOCK_TIMEOUT.to_string(),
            var: Vec::new(),
            var_file: Vec::new(),
            target: Vec::new(),
            replace: Vec::new(),
            refresh: true,
            destroy: false,
            parallelism: DEFAULT_PARALLELISM,
            backup: None,
            state_out: None,
            lock_id: None,
            debug: false,
            tool_log: ToolLogLevel::default(),
            download_endpoint: None,
            skip_tls_verify: false,
            tool_binary: None,
            override_dir: None,
        }
    }
}

static VERSION_RE: OnceLock<Regex> = OnceLock::new();

fn version_re() -> &'static Regex {
    VERSION_RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.\-]+)?$").unwrap())
}

impl DriverConfig {
    pub fn new(actions: Vec<Action>, version: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            actions,
            version: version.into(),
            work_dir: work_dir.into(),
            ..Default::default()
        }
    }

    /// `init`, `plan`, `apply`: publish the program in `work_dir`.
    pub fn deploy(version: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            vec![Action::Init, Action::Plan, Action::Apply],
            version,
            work_dir,
        )
    }

    /// `init`, `destroy`: tear down what `work_dir` manages.
    pub fn teardown(version: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self::new(vec![Action::Init, Action::Destroy], version, work_dir)
    }

    /// Load a config from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: DriverConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    /// Parse action names as given on a command line.
    pub fn parse_actions<S: AsRef<str>>(names: &[S]) -> Result<Vec<Action>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }

    /// Check everything that can be checked without touching terraform.
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(DriverError::NoActions);
        }

        for action in &self.actions {
            match action {
                Action::ForceUnlock if self.lock_id().is_none() => {
                    return Err(DriverError::MissingLockId);
                }
                Action::Show if self.plan_file().is_none() => {
                    return Err(DriverError::MissingPlanFile);
                }
                _ => {}
            }
        }

        if !version_re().is_match(&self.version) {
            return Err(DriverError::InvalidVersion(self.version.clone()));
        }

        if self.work_dir.as_os_str().is_empty() {
            return Err(DriverError::Config("work_dir is required".into()));
        }

        if self.parallelism == 0 {
            return Err(DriverError::Config("parallelism must be at least 1".into()));
        }

        Ok(())
    }

    pub fn lock_id(&self) -> Option<&str> {
        self.lock_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn plan_file(&self) -> Option<&Path> {
        self.plan_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Working directory resolved against the job root.
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.job_root.join(&self.work_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DriverConfig {
        DriverConfig::deploy("1.5.7", "gen-ai-tf")
    }

    #[test]
    fn presets_validate() {
        valid().validate().unwrap();
        DriverConfig::teardown("1.5.7", "gen-ai-tf")
            .validate()
            .unwrap();
    }

    #[test]
    fn empty_actions_rejected() {
        let mut cfg = valid();
        cfg.actions.clear();
        assert!(matches!(cfg.validate(), Err(DriverError::NoActions)));
    }

    #[test]
    fn force_unlock_requires_lock_id() {
        let mut cfg = valid();
        cfg.actions = vec![Action::ForceUnlock];
        assert!(matches!(cfg.validate(), Err(DriverError::MissingLockId)));

        cfg.lock_id = Some(String::new());
        assert!(matches!(cfg.validate(), Err(DriverError::MissingLockId)));

        cfg.lock_id = Some("d9a7c3b0".into());
        cfg.validate().unwrap();
    }

    #[test]
    fn show_requires_plan_file() {
        let mut cfg = valid();
        cfg.actions = vec![Action::Show];
        assert!(matches!(cfg.validate(), Err(DriverError::MissingPlanFile)));

        cfg.plan_file = Some(PathBuf::from("tfplan"));
        cfg.validate().unwrap();
    }

    #[test]
    fn version_must_be_exact() {
        for bad in ["", "1.5", "latest", "~> 1.5", "v1.5.7"] {
            let mut cfg = valid();
            cfg.version = bad.into();
            assert!(
                matches!(cfg.validate(), Err(DriverError::InvalidVersion(_))),
                "{bad} should be rejected"
            );
        }
        let mut cfg = valid();
        cfg.version = "1.6.0-beta2".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn work_dir_is_required() {
        let mut cfg = valid();
        cfg.work_dir = PathBuf::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn parse_actions_rejects_unknown_names() {
        let err = DriverConfig::parse_actions(&["init", "deploy"]).unwrap_err();
        assert!(matches!(err, DriverError::InvalidAction(ref a) if a == "deploy"));
        let ok = DriverConfig::parse_actions(&["init", "force-unlock"]).unwrap();
        assert_eq!(ok, vec![Action::Init, Action::ForceUnlock]);
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("driver.yaml");
        std::fs::write(
            &path,
            "actions: [init, plan]\nversion: 1.5.7\nwork_dir: infra\nparallelism: 4\ntarget:\n  - aws_s3_bucket.logs\n",
        )
        .unwrap();

        let cfg = DriverConfig::load(&path).unwrap();
        assert_eq!(cfg.actions, vec![Action::Init, Action::Plan]);
        assert_eq!(cfg.parallelism, 4);
        assert_eq!(cfg.target, vec!["aws_s3_bucket.logs"]);
        assert!(cfg.backend);
        assert!(cfg.refresh);
        assert_eq!(cfg.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        cfg.validate().unwrap();
    }

    #[test]
    fn work_dir_resolves_under_job_root() {
        let mut cfg = valid();
        cfg.job_root = PathBuf::from("/jobs/42");
        assert_eq!(cfg.resolved_work_dir(), PathBuf::from("/jobs/42/gen-ai-tf"));
    }

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!("TRACE".parse::<ToolLogLevel>().unwrap(), ToolLogLevel::Trace);
        assert_eq!("off".parse::<ToolLogLevel>().unwrap().as_env(), None);
        assert!("verbose".parse::<ToolLogLevel>().is_err());
    }
}
