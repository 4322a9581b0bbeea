//! # Sync Command Implementation
//!
//! Runs one reconciliation pass: the feed is read, the platform snapshot is
//! loaded, managed accounts missing from the feed are removed and the rest
//! are created or updated.
//!
//! With `--dry-run` every mutating call is logged instead of sent; combine it
//! with `--log-level info` to see the calls a real run would issue.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use log::info;

use metacloud_export::config::{ConfigFile, DataSource, TargetConfig, TargetOverrides};
use metacloud_export::feed::Feed;
use metacloud_export::opennebula::OneClient;
use metacloud_export::platform::{DryRun, Platform};
use metacloud_export::properties::TemplateProperties;
use metacloud_export::reconcile::{Reconciler, SyncSummary};

/// Synchronize the target platform with the identity feed
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Identity feed: a file path, `file://` URI, `-` or `stdin`
    #[arg(short, long, value_name = "SOURCE", default_value = "stdin")]
    pub source: DataSource,

    /// XML-RPC endpoint of the OpenNebula frontend
    #[arg(short, long, value_name = "URI", env = "ONE_XMLRPC")]
    pub endpoint: Option<String>,

    /// User name for the endpoint (defaults to the ONE_AUTH file)
    #[arg(short, long, value_name = "USER")]
    pub username: Option<String>,

    /// Password for the endpoint (defaults to the ONE_AUTH file)
    #[arg(short, long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Timeout for each remote call, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub timeout: u64,

    /// YAML file overriding the policy and defining account properties
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log the changes instead of applying them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not print the run summary
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `sync` command.
pub fn execute(args: SyncArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let feed = args
        .source
        .load_feed()
        .context("Failed to load the identity feed")?;
    info!("Loaded {} users from the feed", feed.len());

    let target = TargetConfig::resolve(TargetOverrides {
        endpoint: args.endpoint.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        timeout: Some(Duration::from_secs(args.timeout)),
    })?;
    let client = OneClient::new(
        target.endpoint,
        &target.username,
        &target.password,
        target.timeout,
    );

    let summary = if args.dry_run {
        info!("Dry run, no changes will be made");
        run(&DryRun::new(client), &config, &feed)?
    } else {
        run(&client, &config, &feed)?
    };

    if !args.quiet {
        if args.dry_run {
            println!("Dry run: {}", summary);
        } else {
            println!("{}", summary);
        }
    }
    Ok(())
}

fn run<P: Platform>(platform: &P, config: &ConfigFile, feed: &Feed) -> Result<SyncSummary> {
    let properties = TemplateProperties::new(config.properties.clone());
    let summary = Reconciler::new(platform, &config.policy)
        .with_properties(&properties)
        .run(feed)
        .context("Synchronization aborted")?;
    Ok(summary)
}
