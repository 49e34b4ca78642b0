pub mod explain;
pub mod job;

use std::path::Path;

use anyhow::{anyhow, Context};
use tf_driver::{Action, DriverConfig};

use crate::args::JobArgs;

/// Which actions a subcommand asks for.
pub enum ActionSource {
    /// Names given on the command line; empty means "take them from the file".
    Named(Vec<String>),
    Preset(Vec<Action>),
}

/// Build the job from `--config` (if any), the action source and the flags.
pub fn build_config(
    config_path: Option<&Path>,
    actions: ActionSource,
    job: JobArgs,
    debug: bool,
) -> anyhow::Result<DriverConfig> {
    let mut config = match config_path {
        Some(path) => DriverConfig::load(path)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => DriverConfig::default(),
    };

    match actions {
        ActionSource::Named(names) if names.is_empty() => {}
        ActionSource::Named(names) => {
            config.actions = DriverConfig::parse_actions(&names).map_err(|e| anyhow!("{e}"))?;
        }
        ActionSource::Preset(preset) => config.actions = preset,
    }

    job.apply_to(&mut config);
    config.debug |= debug;
    Ok(config)
}
