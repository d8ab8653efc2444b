pub mod alarms;
pub mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::{load_config, App};
use crate::models::AlarmConfig;

/// Finger friendly alarms - one-shot alarm clock on top of the `at` spool
#[derive(Parser, Debug)]
#[command(
    name = "ffalarms",
    version,
    about = "Finger friendly alarms - one-shot alarm clock on top of the at spool"
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// `at` spool directory (overrides config)
    #[arg(long = "spool-dir", global = true)]
    pub spool_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Schedule an alarm at the next HH:MM
    Set {
        /// Wall-clock time, 24 hour HH:MM
        time: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scheduled alarms
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the alarms scheduled at a timestamp
    Del {
        /// Epoch timestamp as shown by `list`
        timestamp: i64,
    },

    /// Stop the alarm that is currently playing
    Kill,

    /// Wait for firing alarms and offer to turn them off
    Watch,

    /// Ask whether to turn off the running alarm
    Prompt {
        /// Seconds before the prompt dismisses itself
        #[arg(short = 't', long)]
        timeout: Option<u64>,
    },

    /// Wake a running watcher (used by alarm jobs)
    Notify,
}

/// Parse `HH:MM` into hour and minute.
pub fn parse_time(s: &str) -> Result<(u32, u32), String> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| format!("Invalid time '{}'. Expected HH:MM", s))?;
    let hour: u32 = h
        .trim()
        .parse()
        .map_err(|_| format!("Invalid hour in '{}'", s))?;
    let minute: u32 = m
        .trim()
        .parse()
        .map_err(|_| format!("Invalid minute in '{}'", s))?;
    if hour > 23 || minute > 59 {
        return Err(format!("Time '{}' is out of range (00:00-23:59)", s));
    }
    Ok((hour, minute))
}

/// Load configuration for this invocation, applying the `--spool-dir`
/// override.
pub fn resolve_config(cli: &Cli) -> anyhow::Result<AlarmConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.spool_dir {
        config.spool_dir = dir.clone();
    }
    Ok(config)
}

/// Dispatch the CLI command to the appropriate handler.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    let Some(command) = &cli.command else {
        // No subcommand provided -- print help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let app = App::new(resolve_config(cli)?);
    match command {
        Commands::Set { time, json } => alarms::cmd_set(&app, time, *json),
        Commands::List { json } => alarms::cmd_list(&app, *json),
        Commands::Del { timestamp } => alarms::cmd_del(&app, *timestamp),
        Commands::Kill => alarms::cmd_kill(&app),
        Commands::Watch => watch::cmd_watch(&app).await,
        Commands::Prompt { timeout } => watch::cmd_prompt(&app, *timeout).await,
        Commands::Notify => watch::cmd_notify(&app),
    }
}
