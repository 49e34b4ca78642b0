use anyhow::anyhow;
use serde::Serialize;
use tf_driver::action::resolve_steps;
use tf_driver::options::{to_args, translate};
use tf_driver::DriverConfig;

use crate::output::{print_json, print_table};

#[derive(Serialize)]
struct StepPlan {
    action: String,
    options: Vec<String>,
}

/// Validate the job and show the options each step would be given, without
/// installing or running anything.
pub fn run(config: &DriverConfig, json: bool) -> anyhow::Result<()> {
    config.validate().map_err(|e| anyhow!("{e}"))?;

    let steps: Vec<StepPlan> = resolve_steps(&config.actions, config.plan_file().is_some())
        .into_iter()
        .map(|action| StepPlan {
            action: action.to_string(),
            options: to_args(&translate(action, config)),
        })
        .collect();

    if json {
        return print_json(&steps);
    }

    let rows = steps
        .into_iter()
        .enumerate()
        .map(|(i, s)| vec![(i + 1).to_string(), s.action, s.options.join(" ")])
        .collect();
    print_table(&["#", "ACTION", "OPTIONS"], rows);
    Ok(())
}
