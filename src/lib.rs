//! # Metacloud Export Library
//!
//! This library keeps the users and groups of an OpenNebula installation in
//! line with an external identity feed. It is designed to be used by the
//! `metacloud-export` command-line tool, but every step is exposed so that it
//! can be driven against any [`platform::Platform`] implementation.
//!
//! ## Quick Example
//!
//! ```
//! use metacloud_export::credentials;
//! use metacloud_export::feed::Feed;
//! use metacloud_export::policy::Policy;
//!
//! let feed = Feed::from_json_str(
//!     r#"[{"login": "alice", "groups": ["labA"],
//!          "krb_principals": ["alice@REALM"], "cert_dns": ["CN=Alice A"]}]"#,
//! )
//! .unwrap();
//!
//! let policy = Policy::default();
//! policy.check_feed_groups(&feed.group_names()).unwrap();
//! for user in feed.users() {
//!     policy.check_user(user).unwrap();
//! }
//!
//! let password = credentials::encode(feed.users()[0].krb_principals(), feed.users()[0].cert_dns());
//! assert_eq!(password, "alice@REALM|CN=Alice\\20A");
//! ```
//!
//! ## Core Concepts
//!
//! - **Feed (`feed`)**: the desired state, one record per login.
//! - **Platform (`platform`, `opennebula`)**: the target directory behind a
//!   trait, with an XML-RPC client and a dry-run wrapper.
//! - **Snapshot (`snapshot`)**: groups and users loaded once per run.
//! - **Policy (`policy`)**: which groups and accounts the engine may touch.
//! - **Reconciliation (`reconcile`, `membership`, `removal`, `properties`)**:
//!   the per-user diff and the calls that apply it.
//!
//! ## Execution Flow
//!
//! [`reconcile::Reconciler::run`] performs one pass:
//!
//! 1.  **Snapshot**: list every group and user on the platform.
//! 2.  **Plan**: validate the feed against the policy and classify users.
//! 3.  **Removal**: delete managed users missing from the feed, stopping their
//!     workloads first.
//! 4.  **Upsert**: create missing users and bring existing ones in line with
//!     their records.
//!
//! A second pass with the same feed issues no mutating calls.

pub mod config;
pub mod credentials;
pub mod error;
pub mod feed;
pub mod membership;
pub mod opennebula;
pub mod platform;
pub mod policy;
pub mod properties;
pub mod reconcile;
pub mod removal;
pub mod snapshot;
