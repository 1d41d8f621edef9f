use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::{utils::dir::create_application_default_path, vcs::DEFAULT_REMOTE};

use super::storage::PROJECTS_FILE;

#[derive(Parser, Debug, Clone)]
pub struct TrackerArgs {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(
        long,
        env = "PROJCLOCK_ENDPOINT",
        help = "Endpoint receiving project totals. Nothing is sent when missing"
    )]
    pub endpoint: Option<String>,
    #[arg(long = "tick-seconds", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_seconds: u64,
    #[arg(
        long = "flush-timeout-seconds",
        default_value_t = 5,
        help = "How long shutdown waits for reports still being sent"
    )]
    pub flush_timeout_seconds: u64,
    #[arg(long = "request-timeout-seconds", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout_seconds: u64,
    #[arg(long, default_value = DEFAULT_REMOTE, help = "Git remote whose url identifies a project")]
    pub remote: String,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

/// Resolved settings of a running tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub dir: PathBuf,
    pub endpoint: Option<String>,
    pub tick_interval: Duration,
    pub flush_timeout: Duration,
    pub request_timeout: Duration,
    pub remote: String,
}

impl TrackerConfig {
    pub fn from_args(args: &TrackerArgs) -> Result<Self> {
        let dir = match &args.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => create_application_default_path()?,
        };

        Ok(Self {
            dir,
            endpoint: args
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_owned),
            tick_interval: Duration::from_secs(args.tick_seconds),
            flush_timeout: Duration::from_secs(args.flush_timeout_seconds),
            request_timeout: Duration::from_secs(args.request_timeout_seconds),
            remote: args.remote.clone(),
        })
    }

    pub fn projects_file(&self) -> PathBuf {
        self.dir.join(PROJECTS_FILE)
    }
}
