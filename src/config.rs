//! # Configuration
//!
//! Everything a run needs besides the feed itself.
//!
//! ## Target
//!
//! The OpenNebula endpoint and credentials are resolved in the same order the
//! OpenNebula command-line tools use:
//!
//! 1. Explicit values (command-line flags).
//! 2. `ONE_XMLRPC` for the endpoint, the `user:password` file named by
//!    `ONE_AUTH` for the credentials.
//! 3. `http://localhost:2633/RPC2` and `~/.one/one_auth`.
//!
//! ## Policy file
//!
//! An optional YAML file overrides the safety policy and configures account
//! properties:
//!
//! ```yaml
//! policy:
//!   excluded_groups: [staff]
//!   auth_driver: x509
//! properties:
//!   PERUN_LOGIN: "{login}"
//! ```
//!
//! The listed groups and logins are protected in addition to the built-in
//! `oneadmin`, `users` and `serveradmin` entries. Unknown keys are rejected.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::feed::Feed;
use crate::policy::Policy;

/// Endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:2633/RPC2";
/// Per-call timeout used when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How to reach and authenticate against the target platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub endpoint: Url,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Values given explicitly, typically on the command line.
#[derive(Debug, Clone, Default)]
pub struct TargetOverrides {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Option<Duration>,
}

impl TargetConfig {
    /// Resolves the target from overrides, the process environment and the
    /// user's home directory.
    pub fn resolve(overrides: TargetOverrides) -> Result<Self> {
        Self::resolve_with(
            overrides,
            |name| std::env::var(name).ok(),
            dirs::home_dir(),
        )
    }

    /// Resolution with injectable environment lookup and home directory.
    pub fn resolve_with(
        overrides: TargetOverrides,
        env: impl Fn(&str) -> Option<String>,
        home: Option<PathBuf>,
    ) -> Result<Self> {
        let endpoint = overrides
            .endpoint
            .or_else(|| env("ONE_XMLRPC"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint)?;

        let (username, password) = match (overrides.username, overrides.password) {
            (Some(username), Some(password)) => (username, password),
            (username, password) => {
                let auth_file = env("ONE_AUTH")
                    .map(PathBuf::from)
                    .or_else(|| home.map(|h| h.join(".one").join("one_auth")));
                let (file_user, file_password) = match auth_file {
                    Some(path) => read_auth_file(&path)?,
                    None => return Err(missing_credentials()),
                };
                (
                    username.unwrap_or(file_user),
                    password.unwrap_or(file_password),
                )
            }
        };

        debug!("Target endpoint {} as {:?}", endpoint, username);
        Ok(Self {
            endpoint,
            username,
            password,
            timeout: overrides.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

fn missing_credentials() -> Error {
    Error::Config {
        message: "no credentials for the target platform".to_string(),
        hint: Some("pass --username/--password, set ONE_AUTH or create ~/.one/one_auth".to_string()),
    }
}

/// Reads a `user:password` file. The password is everything after the first
/// colon of the first line.
pub fn read_auth_file(path: &Path) -> Result<(String, String)> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::Config {
            message: format!("auth file {} not found", path.display()),
            hint: Some("pass --username/--password or set ONE_AUTH".to_string()),
        },
        _ => Error::Io(e),
    })?;

    let line = content.lines().next().unwrap_or_default().trim();
    match line.split_once(':') {
        Some((user, password)) if !user.is_empty() => {
            Ok((user.to_string(), password.to_string()))
        }
        _ => Err(Error::Config {
            message: format!("auth file {} is not in user:password format", path.display()),
            hint: None,
        }),
    }
}

/// Contents of the optional YAML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub policy: Policy,
    /// Property name to template, see [`crate::properties`].
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn parse(yaml_content: &str) -> Result<Self> {
        if yaml_content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml_content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }
}

/// Where the identity feed is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Stdin,
    File(PathBuf),
}

impl FromStr for DataSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "-" || s.eq_ignore_ascii_case("stdin") {
            return Ok(DataSource::Stdin);
        }
        let path = s.strip_prefix("file://").unwrap_or(s);
        Ok(DataSource::File(PathBuf::from(path)))
    }
}

impl DataSource {
    pub fn load_feed(&self) -> Result<Feed> {
        match self {
            DataSource::Stdin => {
                debug!("Reading feed from standard input");
                Feed::from_reader(io::stdin().lock())
            }
            DataSource::File(path) => Feed::from_file(path),
        }
    }
}
