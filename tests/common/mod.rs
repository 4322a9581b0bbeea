//! Shared test utilities for the CLI end-to-end tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = TestFixture::new().with_feed(feeds::VALID);
//! fixture.command().arg("check").arg("--source").arg(fixture.feed_path()).assert().success();
//! ```

use assert_cmd::Command;
use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    pub use super::feeds;
    pub use super::TestFixture;
}

/// Identity feeds used across tests.
#[allow(dead_code)]
pub mod feeds {
    pub const VALID: &str = r#"[
  {"login": "alice", "groups": ["labA", "labB"],
   "krb_principals": ["alice@REALM"], "cert_dns": ["CN=Alice A"]},
  {"login": "carol", "groups": ["labB"],
   "krb_principals": ["carol@REALM"], "cert_dns": ["CN=Carol C"]}
]"#;

    pub const ADMIN_GROUP: &str = r#"[
  {"login": "mallory", "groups": ["oneadmin"],
   "krb_principals": ["mallory@REALM"], "cert_dns": ["CN=Mallory"]}
]"#;

    pub const PROTECTED_LOGIN: &str = r#"[
  {"login": "serveradmin", "groups": ["labA"],
   "krb_principals": ["x@REALM"], "cert_dns": ["CN=X"]}
]"#;

    pub const NO_CREDENTIALS: &str = r#"[
  {"login": "dave", "groups": ["labA"], "krb_principals": [], "cert_dns": ["CN=Dave"]}
]"#;

    pub const DUPLICATE_LOGIN: &str = r#"[
  {"login": "alice", "groups": ["labA"], "krb_principals": ["a@R"], "cert_dns": []},
  {"login": "alice", "groups": ["labB"], "krb_principals": ["a@R"], "cert_dns": []}
]"#;

    pub const EMPTY_LOGIN: &str = r#"[
  {"login": "", "groups": ["labA"], "krb_principals": ["x@REALM"], "cert_dns": ["CN=X"]}
]"#;

    pub const MISSING_FIELD: &str = r#"[{"login": "alice", "groups": ["labA"]}]"#;

    pub const MALFORMED: &str = "[{\"login\": ";
}

/// Policy files used across tests.
#[allow(dead_code)]
pub mod configs {
    pub const EXCLUDE_LAB_B: &str = r#"
policy:
  excluded_groups: [labB]
"#;

    /// Lists that leave out every built-in protected name.
    pub const WITHOUT_BUILTINS: &str = r#"
policy:
  excluded_groups: [staff]
  protected_logins: []
  removal_protected_logins: []
"#;

    pub const UNKNOWN_KEY: &str = "polcy:\n  excluded_groups: []\n";
}

/// A temporary directory holding a feed and optional policy file.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Writes `feed.json`.
    pub fn with_feed(self, content: &str) -> Self {
        self.temp_dir
            .child("feed.json")
            .write_str(content)
            .expect("Failed to write feed");
        self
    }

    /// Writes `policy.yaml`.
    #[allow(dead_code)]
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("policy.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn feed_path(&self) -> PathBuf {
        self.temp_dir.path().join("feed.json")
    }

    #[allow(dead_code)]
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("policy.yaml")
    }

    /// The binary, run inside the fixture with a clean OpenNebula environment.
    pub fn command(&self) -> Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("metacloud-export");
        cmd.current_dir(self.path())
            .env_remove("ONE_XMLRPC")
            .env_remove("ONE_AUTH")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
