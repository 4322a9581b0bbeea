//! # Check Command Implementation
//!
//! Validates an identity feed offline: the feed must parse, logins must be
//! unique, no record may carry a protected login or empty credentials, and no
//! requested group may be an excluded one.
//!
//! Checks that need the platform (unknown groups, unmanaged accounts) are left
//! to `sync`. This command never contacts the frontend.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use metacloud_export::config::{ConfigFile, DataSource};

/// Validate an identity feed without contacting the platform
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Identity feed: a file path, `file://` URI, `-` or `stdin`
    #[arg(short, long, value_name = "SOURCE", default_value = "stdin")]
    pub source: DataSource,

    /// YAML file overriding the policy
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Execute the `check` command.
pub fn execute(args: CheckArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let feed = args
        .source
        .load_feed()
        .context("Failed to load the identity feed")?;

    let groups = feed.group_names();
    config.policy.check_feed_groups(&groups)?;
    for user in feed.users() {
        config.policy.check_user(user)?;
    }

    println!(
        "Feed is valid: {} users in {} groups",
        feed.len(),
        groups.len()
    );
    Ok(())
}
