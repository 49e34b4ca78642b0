mod args;
mod cmd;
mod output;

use std::path::PathBuf;

use args::JobArgs;
use clap::{Parser, Subcommand};
use cmd::ActionSource;
use tf_driver::Action;

#[derive(Parser)]
#[command(
    name = "tfdrive",
    about = "Run terraform jobs: install an exact version, run actions in order, clean up",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML job file; flags override its values
    #[arg(long, global = true, env = "TFDRIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logs, and echo plan/output JSON to the console
    #[arg(long, global = true, env = "TFDRIVE_DEBUG")]
    debug: bool,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the given actions in order, stopping at the first failure
    Run {
        /// init, plan, apply, destroy, output, show, force-unlock (comma separated or repeated)
        #[arg(long = "action", value_delimiter = ',', env = "TFDRIVE_ACTIONS")]
        actions: Vec<String>,

        #[command(flatten)]
        job: JobArgs,
    },

    /// init, plan, apply
    Deploy {
        #[command(flatten)]
        job: JobArgs,
    },

    /// init, destroy
    Destroy {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Validate a job and print the options each action would receive
    Explain {
        #[arg(long = "action", value_delimiter = ',', env = "TFDRIVE_ACTIONS")]
        actions: Vec<String>,

        #[command(flatten)]
        job: JobArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    let (source, job, explain) = match cli.command {
        Commands::Run { actions, job } => (ActionSource::Named(actions), job, false),
        Commands::Deploy { job } => (
            ActionSource::Preset(vec![Action::Init, Action::Plan, Action::Apply]),
            job,
            false,
        ),
        Commands::Destroy { job } => (
            ActionSource::Preset(vec![Action::Init, Action::Destroy]),
            job,
            false,
        ),
        Commands::Explain { actions, job } => (ActionSource::Named(actions), job, true),
    };

    let result = cmd::build_config(config_path, source, job, cli.debug).and_then(|config| {
        if explain {
            cmd::explain::run(&config, cli.json)
        } else {
            cmd::job::run(config, cli.json)
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
