//! # Metacloud Export CLI
//!
//! This is the binary entry point for the `metacloud-export` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments using `clap`.
//! - Initialising logging.
//! - Executing the appropriate command and turning unhandled errors into a
//!   non-zero exit status.
//!
//! The reconciliation itself lives in the `metacloud_export` library crate;
//! the binary is a thin wrapper around it.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
