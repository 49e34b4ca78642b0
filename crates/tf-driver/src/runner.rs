use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::action::{resolve_steps, Action};
use crate::config::DriverConfig;
use crate::executor::Executor;
use crate::overrides::copy_overrides;
use crate::provision::{installer_for, InstalledTool, Installer};
use crate::retry::RetryPolicy;
use crate::scratch::{JobLayout, ScratchFiles};
use crate::tool::{LiveProcess, Terraform, BINARY_NAME};
use crate::{DriverError, Result};

// ─── Timer ────────────────────────────────────────────────────────────────

/// Logs how long it lived when dropped.
#[derive(Debug)]
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        debug!(
            timer = self.name,
            duration_ms = elapsed.as_millis() as u64,
            "time taken to execute"
        );
    }
}

// ─── RunReport ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// `changes` is only known for `plan`.
    Succeeded { changes: Option<bool> },
    Failed(String),
    /// Not attempted because an earlier step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub action: Action,
    pub status: StepStatus,
    pub duration: Duration,
}

/// What one run did. Produced even when the run fails.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub requested_version: String,
    /// Version the installed binary reports; `None` if install never finished.
    pub version: Option<String>,
    pub steps: Vec<StepOutcome>,
    pub elapsed: Duration,
    /// First error encountered.
    pub error: Option<DriverError>,
}

impl RunReport {
    fn new(config: &DriverConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            requested_version: config.version.clone(),
            version: None,
            steps: Vec::new(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn first_error(&self) -> Option<&DriverError> {
        self.error.as_ref()
    }

    /// Steps that ran to completion.
    pub fn succeeded(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Succeeded { .. }))
    }

    pub fn into_result(mut self) -> Result<RunReport> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

// ─── Runner ───────────────────────────────────────────────────────────────

/// Drives one invocation end to end: prepare the job directory, install the
/// requested terraform, run the actions in order, and clean up whatever
/// happened.
pub struct Runner<I = Box<dyn Installer>> {
    config: DriverConfig,
    installer: I,
    retry: RetryPolicy,
    cancel: CancellationToken,
    live: LiveProcess,
}

impl Runner<Box<dyn Installer>> {
    /// Runner with the installer `config` selects.
    pub fn new(config: DriverConfig) -> Self {
        let installer = installer_for(&config);
        Self::with_installer(config, installer)
    }
}

impl<I: Installer> Runner<I> {
    pub fn with_installer(config: DriverConfig, installer: I) -> Self {
        Self {
            config,
            installer,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            live: LiveProcess::new(),
        }
    }

    /// Retry policy for install and `init`.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Slot the running terraform's pid is published to.
    pub fn live_process(mut self, live: LiveProcess) -> Self {
        self.live = live;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run to completion. Never skips cleanup: the installed binary and the
    /// scratch files are removed on success, failure and cancellation alike.
    pub async fn execute(self) -> RunReport {
        let _timer = Timer::start("run");
        let started = Instant::now();
        let mut report = RunReport::new(&self.config);
        info!(
            run_id = %report.run_id,
            version = %self.config.version,
            actions = ?self.config.actions,
            "starting terraform job"
        );

        if let Err(e) = self.config.validate() {
            error!(error = %e, "invalid configuration");
            report.error = Some(e);
            report.elapsed = started.elapsed();
            return report;
        }

        let layout = JobLayout::new(&self.config);
        let mut scratch = ScratchFiles::new();
        let result = self.drive(&layout, &mut scratch, &mut report).await;

        {
            let _timer = Timer::start("cleanup");
            if let Err(e) = self.installer.remove().await {
                warn!(error = %e, "error while removing terraform binary");
            }
            scratch.cleanup();
        }

        if let Err(e) = result {
            error!(error = %e, "failed to run terraform job");
            report.error = Some(e);
        }
        report.elapsed = started.elapsed();
        report
    }

    async fn drive(
        &self,
        layout: &JobLayout,
        scratch: &mut ScratchFiles,
        report: &mut RunReport,
    ) -> Result<()> {
        layout.prepare()?;
        if let Some(dir) = &self.config.override_dir {
            copy_overrides(dir, &layout.work_dir)?;
        }

        let tool = self.install(layout).await?;
        report.version = Some(tool.version.clone());

        let mut tf = Terraform::new(&layout.work_dir, &tool.exec_path, self.live.clone())?;
        // terraform runs inside work_dir, so its log path must not be relative
        let log_path = std::env::current_dir()?.join(&layout.log_path);
        tf.set_log(self.config.tool_log, &log_path);

        let steps = resolve_steps(&self.config.actions, self.config.plan_file().is_some());
        let mut executor = Executor::new(
            &tf,
            &self.config,
            layout,
            scratch,
            self.retry,
            &self.cancel,
        );

        let mut pending = steps.into_iter();
        while let Some(action) = pending.next() {
            info!(
                action = %action,
                version = %tool.version,
                workdir = %layout.work_dir.display(),
                "running terraform command"
            );
            let step_start = Instant::now();
            match executor.run_action(action).await {
                Ok(changes) => report.steps.push(StepOutcome {
                    action,
                    status: StepStatus::Succeeded { changes },
                    duration: step_start.elapsed(),
                }),
                Err(e) => {
                    report.steps.push(StepOutcome {
                        action,
                        status: StepStatus::Failed(e.to_string()),
                        duration: step_start.elapsed(),
                    });
                    report.steps.extend(pending.map(|action| StepOutcome {
                        action,
                        status: StepStatus::Skipped,
                        duration: Duration::ZERO,
                    }));
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Install with retry, then ask the binary what it is. Cancellation drops
    /// the attempt in flight.
    async fn install(&self, layout: &JobLayout) -> Result<InstalledTool> {
        let _timer = Timer::start("install");
        let installer = &self.installer;
        let attempts = self.retry.run(&self.cancel, move || installer.install());
        let exec_path = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DriverError::Cancelled),
            result = attempts => result.map_err(|e| DriverError::Install {
                tool: BINARY_NAME.to_string(),
                source: Box::new(e),
            })?,
        };

        let tf = Terraform::new(&layout.work_dir, &exec_path, LiveProcess::new())?;
        let version = match tf.version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "could not read terraform version, assuming requested");
                self.config.version.clone()
            }
        };
        if version != self.config.version {
            warn!(
                requested = %self.config.version,
                installed = %version,
                "installed terraform version differs from requested"
            );
        }
        Ok(InstalledTool { exec_path, version })
    }
}
