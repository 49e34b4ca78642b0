//! `tf-driver`: runs terraform jobs on behalf of an automation platform.
//!
//! A job names an exact terraform version, a working directory and an ordered
//! list of actions. The driver installs that version into a private
//! directory, turns the job's settings into command-line options for each
//! action, runs the actions in order, and stops at the first failure.
//!
//! # Architecture
//!
//! ```text
//! DriverConfig ─── validate()
//!     │
//!     ▼
//! Runner          ← prepares the job directory, copies overrides,
//!     │              always removes the binary and scratch files
//!     ▼
//! Installer       ← release download (SHA256-verified) or local binary;
//!     │              retried 3× with a fixed 5 s delay
//!     ▼
//! Executor        ← one action at a time; `init` retried, nothing else
//!     │              options from the `options` rule table
//!     ▼
//! Terraform       ← spawns the binary in its own process group
//!
//! AbortController ← SIGINT/SIGTERM: SIGTERM terraform's group, wait,
//!                    cancel the run; a second signal exits(1)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use tf_driver::{AbortController, DriverConfig, LiveProcess, Runner};
//!
//! let live = LiveProcess::new();
//! let abort = AbortController::install(live.clone())?;
//! let report = Runner::new(DriverConfig::deploy("1.5.7", "infra"))
//!     .cancel_token(abort.token())
//!     .live_process(live)
//!     .execute()
//!     .await;
//! report.into_result()?;
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod executor;
pub mod options;
pub mod overrides;
pub mod provision;
pub mod retry;
pub mod runner;
pub mod scratch;
pub mod signal;
pub mod tool;


pub use action::Action;
pub use config::{DriverConfig, ToolLogLevel};
pub use error::DriverError;
pub use options::TfOption;
pub use provision::{installer_for, Installer, LocalInstaller, ReleaseInstaller};
pub use retry::RetryPolicy;
pub use runner::{RunReport, Runner, StepOutcome, StepStatus, Timer};
pub use signal::{AbortController, AbortTarget};
pub use tool::{LiveProcess, Terraform};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;
