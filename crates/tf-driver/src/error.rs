use thiserror::Error;

use crate::action::Action;

#[derive(Debug, Error)]
pub enum DriverError {
    // ─── Configuration ────────────────────────────────────────────────────
    #[error("at least one action is required")]
    NoActions,

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("a lock id is required when force-unlock is used")]
    MissingLockId,

    #[error("a plan file is required to show the terraform plan")]
    MissingPlanFile,

    #[error("invalid terraform version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // ─── Install ──────────────────────────────────────────────────────────
    #[error("error installing {tool}: {source}")]
    Install {
        tool: String,
        #[source]
        source: Box<DriverError>,
    },

    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    Checksum {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("release archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("no terraform release for platform {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("terraform binary not found: {0}")]
    BinaryNotFound(String),

    // ─── Invocation ───────────────────────────────────────────────────────
    #[error("error running {action}: {source}")]
    Action {
        action: Action,
        #[source]
        source: Box<DriverError>,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", tool_failure(.code, .stderr))]
    Tool { code: Option<i32>, stderr: String },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DriverError {
    /// Errors detected from configuration alone, before any install or
    /// invocation. These are never retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DriverError::NoActions
                | DriverError::InvalidAction(_)
                | DriverError::MissingLockId
                | DriverError::MissingPlanFile
                | DriverError::InvalidVersion(_)
                | DriverError::Config(_)
        )
    }

    /// The action this error is attributed to, if any.
    pub fn action(&self) -> Option<Action> {
        match self {
            DriverError::Action { action, .. } => Some(*action),
            _ => None,
        }
    }

    pub(crate) fn in_action(self, action: Action) -> Self {
        DriverError::Action {
            action,
            source: Box::new(self),
        }
    }
}

fn tool_failure(code: &Option<i32>, stderr: &str) -> String {
    let head = match code {
        Some(code) => format!("terraform exited with code {code}"),
        None => "terraform terminated by signal".to_string(),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        head
    } else {
        format!("{head}\n{stderr}")
    }
}
