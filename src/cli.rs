//! CLI argument parsing, logging setup and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use crate::commands;

/// Metacloud Export - Synchronize OpenNebula users and groups with an identity feed
#[derive(Parser, Debug)]
#[command(name = "metacloud-export")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Set log level; RUST_LOG is used when omitted
    #[arg(long, global = true, value_name = "LEVEL", value_enum)]
    log_level: Option<LogLevel>,

    /// Where log lines are written
    #[arg(long, global = true, value_name = "STREAM", value_enum, default_value = "stderr")]
    log_to: LogTarget,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the target platform in line with the identity feed
    Sync(commands::sync::SyncArgs),

    /// Validate an identity feed without contacting the platform
    Check(commands::check::CheckArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogTarget {
    Stdout,
    Stderr,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        self.init_logging();

        match self.command {
            Commands::Sync(args) => commands::sync::execute(args),
            Commands::Check(args) => commands::check::execute(args),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }

    /// Explicit flags win over RUST_LOG, which wins over the `warn` default.
    fn level(&self) -> Option<LevelFilter> {
        if self.debug {
            Some(LevelFilter::Debug)
        } else {
            self.log_level.map(LevelFilter::from)
        }
    }

    fn init_logging(&self) {
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        if let Some(level) = self.level() {
            builder.filter_level(level);
        }
        builder.target(match self.log_to {
            LogTarget::Stdout => env_logger::Target::Stdout,
            LogTarget::Stderr => env_logger::Target::Stderr,
        });
        // a second initialisation (tests) is harmless
        let _ = builder.try_init();
    }
}
