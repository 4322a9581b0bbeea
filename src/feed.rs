//! # Identity Feed
//!
//! Loading of the authoritative identity batch. The feed is a JSON array of
//! records:
//!
//! ```json
//! [
//!   {
//!     "login": "alice",
//!     "groups": ["labA", "labB"],
//!     "krb_principals": ["alice@EXAMPLE.ORG"],
//!     "cert_dns": ["/DC=org/DC=example/CN=Alice"]
//!   }
//! ]
//! ```
//!
//! Records are decoded into [`FeedRecord`] and then frozen into a [`Feed`] of
//! [`SourceUser`] values. A missing field is a fatal parse error, as is a
//! login that appears twice. Content checks (protected names, empty lists)
//! belong to [`crate::policy`], since a record can be well-formed and still
//! not allowed.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};

/// A record exactly as it appears in the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedRecord {
    pub login: String,
    pub groups: Vec<String>,
    pub krb_principals: Vec<String>,
    pub cert_dns: Vec<String>,
}

/// One user from the identity feed.
///
/// `groups` keeps the feed order; its first element is the desired primary
/// group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUser {
    login: String,
    groups: Vec<String>,
    krb_principals: Vec<String>,
    cert_dns: Vec<String>,
}

impl SourceUser {
    pub fn new(
        login: impl Into<String>,
        groups: Vec<String>,
        krb_principals: Vec<String>,
        cert_dns: Vec<String>,
    ) -> Self {
        Self {
            login: login.into(),
            groups,
            krb_principals,
            cert_dns,
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// The desired primary group, if the record has any group at all.
    pub fn primary_group(&self) -> Option<&str> {
        self.groups.first().map(String::as_str)
    }

    pub fn krb_principals(&self) -> &[String] {
        &self.krb_principals
    }

    pub fn cert_dns(&self) -> &[String] {
        &self.cert_dns
    }
}

impl From<FeedRecord> for SourceUser {
    fn from(record: FeedRecord) -> Self {
        SourceUser::new(
            record.login,
            record.groups,
            record.krb_principals,
            record.cert_dns,
        )
    }
}

/// The whole batch for one run, in feed order.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    users: Vec<SourceUser>,
}

impl Feed {
    /// Builds a feed, rejecting duplicate logins.
    pub fn new(users: Vec<SourceUser>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for user in &users {
            if !seen.insert(user.login()) {
                return Err(Error::validation(
                    user.login(),
                    "login appears more than once in the feed",
                ));
            }
        }
        Ok(Self { users })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<FeedRecord> = serde_json::from_str(json)?;
        debug!("Decoded {} feed records", records.len());
        Self::new(records.into_iter().map(SourceUser::from).collect())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let records: Vec<FeedRecord> = serde_json::from_reader(reader)?;
        debug!("Decoded {} feed records", records.len());
        Self::new(records.into_iter().map(SourceUser::from).collect())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading feed from {}", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn users(&self) -> &[SourceUser] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Union of every group referenced by any user.
    pub fn group_names(&self) -> BTreeSet<String> {
        self.users
            .iter()
            .flat_map(|user| user.groups().iter().cloned())
            .collect()
    }

    pub fn logins(&self) -> BTreeSet<&str> {
        self.users.iter().map(SourceUser::login).collect()
    }

    pub fn contains_login(&self, login: &str) -> bool {
        self.users.iter().any(|user| user.login() == login)
    }
}
