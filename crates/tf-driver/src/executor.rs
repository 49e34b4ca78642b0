use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::action::Action;
use crate::config::DriverConfig;
use crate::options::{fields_for, translate};
use crate::retry::RetryPolicy;
use crate::scratch::{JobLayout, ScratchFiles};
use crate::tool::{StdoutSink, Terraform};
use crate::{DriverError, Result};

/// Runs single actions against an installed terraform.
///
/// It does not enforce an ordering between actions; it executes whatever it
/// is handed. It does enforce per-action preconditions and output wiring:
/// `apply`, `destroy` and `force-unlock` stream to the console, while `show`
/// and `output` write their JSON to scratch files (echoed to the console in
/// debug mode).
pub struct Executor<'a> {
    tf: &'a Terraform,
    config: &'a DriverConfig,
    layout: &'a JobLayout,
    scratch: &'a mut ScratchFiles,
    retry: RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> Executor<'a> {
    pub fn new(
        tf: &'a Terraform,
        config: &'a DriverConfig,
        layout: &'a JobLayout,
        scratch: &'a mut ScratchFiles,
        retry: RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            tf,
            config,
            layout,
            scratch,
            retry,
            cancel,
        }
    }

    /// Execute one action.
    ///
    /// Returns `Some(changes)` for `plan`, `None` otherwise. Configuration
    /// errors come back as-is; every other failure is attributed to `action`.
    pub async fn run_action(&mut self, action: Action) -> Result<Option<bool>> {
        if self.cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        debug!(%action, fields = ?fields_for(action), "translating options");
        self.dispatch(action).await.map_err(|e| {
            if e.is_config_error() {
                e
            } else {
                e.in_action(action)
            }
        })
    }

    async fn dispatch(&mut self, action: Action) -> Result<Option<bool>> {
        let tf = self.tf;
        let config = self.config;
        let options = translate(action, config);
        let options = options.as_slice();

        match action {
            Action::Init => {
                self.retry
                    .run(self.cancel, move || tf.init(options))
                    .await?;
            }
            Action::Plan => return tf.plan(options).await.map(Some),
            Action::Show => {
                let plan_file = config.plan_file().ok_or(DriverError::MissingPlanFile)?;
                let path = self.layout.plan_path.clone();
                let sink = self.capture_to(path);
                tf.show_plan_file(plan_file, &sink).await?;
            }
            Action::Apply => tf.apply(options).await?,
            Action::Destroy => tf.destroy(options).await?,
            Action::Output => {
                let path = self.layout.output_path.clone();
                let sink = self.capture_to(path);
                tf.output(&sink).await?;
            }
            Action::ForceUnlock => {
                let lock_id = config.lock_id().ok_or(DriverError::MissingLockId)?;
                tf.force_unlock(lock_id).await?;
            }
        }
        Ok(None)
    }

    fn capture_to(&mut self, path: PathBuf) -> StdoutSink {
        self.scratch.register(&path);
        StdoutSink::File {
            path,
            tee: self.config.debug,
        }
    }
}
