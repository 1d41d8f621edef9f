pub mod projects;

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use projects::print_projects;
use tracing::level_filters::LevelFilter;

use crate::{
    tracker::{
        args::{TrackerArgs, TrackerConfig},
        start_tracker,
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, SERVE_PREFIX},
        runtime::single_thread_runtime,
    },
    vcs::{GitRemoteResolver, ProjectIdResolver, DEFAULT_REMOTE},
};

/// Extra time given to the runtime after the tracker stopped. Stdin is read on a blocking thread
/// that never notices cancellation.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "projclock", version, long_about = None)]
#[command(about = "Tracks time spent per project workspace", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging to the console")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the tracker. Reads editor events from stdin and writes status lines to stdout"
    )]
    Serve {
        #[command(flatten)]
        args: TrackerArgs,
    },
    #[command(about = "Show time tracked per project")]
    Projects {
        #[arg(
            long,
            help = "Application directory. By default tries to read from $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Print the project identifier of a workspace folder")]
    Resolve {
        path: PathBuf,
        #[arg(long, default_value = DEFAULT_REMOTE)]
        remote: String,
    },
}

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Serve { args } => serve(args),
        Commands::Projects { dir } => {
            let dir = dir.map_or_else(create_application_default_path, Ok)?;
            enable_cli_logging(&dir, args.log)?;
            single_thread_runtime()?.block_on(print_projects(&dir))
        }
        Commands::Resolve { path, remote } => {
            enable_cli_logging(&create_application_default_path()?, args.log)?;
            let resolved = single_thread_runtime()?
                .block_on(async { GitRemoteResolver::new(remote.clone()).resolve(&path).await });
            match resolved {
                Some(project_id) => {
                    println!("{project_id}");
                    Ok(())
                }
                None => bail!("{path:?} has no {remote} remote"),
            }
        }
    }
}

fn serve(args: TrackerArgs) -> Result<()> {
    let config = TrackerConfig::from_args(&args)?;
    enable_logging(SERVE_PREFIX, &config.dir, args.log, args.log_console)?;

    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(start_tracker(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

fn enable_cli_logging(dir: &std::path::Path, log: bool) -> Result<()> {
    let logging_level = if log { Some(LevelFilter::TRACE) } else { None };
    enable_logging(CLI_PREFIX, dir, logging_level, log)
}
