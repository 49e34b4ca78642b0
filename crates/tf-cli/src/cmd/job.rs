use anyhow::{anyhow, Context};
use tf_driver::{AbortController, DriverConfig, LiveProcess, Runner};
use tracing::info;

use crate::output;

// ---------------------------------------------------------------------------
// run / deploy / destroy
// ---------------------------------------------------------------------------

pub fn run(config: DriverConfig, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(async move {
        let live = LiveProcess::new();
        let abort =
            AbortController::install(live.clone()).context("failed to install signal handlers")?;

        let report = Runner::new(config)
            .cancel_token(abort.token())
            .live_process(live)
            .execute()
            .await;
        anyhow::Ok(report)
    })?;

    info!(
        run_id = %report.run_id,
        elapsed_ms = report.elapsed.as_millis() as u64,
        success = report.is_success(),
        steps_succeeded = report.succeeded().count(),
        "terraform job finished"
    );
    output::print_report(&report, json)?;
    report.into_result().map_err(|e| anyhow!("{e}"))?;
    Ok(())
}
