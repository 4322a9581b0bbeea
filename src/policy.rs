//! # Policy Validator
//!
//! Safety rules deciding what a run may touch.
//!
//! - The **managed group set** is every target group that is not on the
//!   excluded list. The administrative `oneadmin` group and the catch-all
//!   `users` group are always on it; a policy file can only add more.
//! - A target user is **managed** only when *all* of its groups are managed.
//!   Accounts with a single foot outside that boundary are never updated or
//!   deleted.
//! - The feed may only reference managed groups that already exist; groups
//!   are provisioned out of band.
//! - Empty source logins, and logins containing a protected account name,
//!   are refused.
//!
//! Protected names are matched as substrings, not for equality, so
//! `oneadmin2` is refused as well.

use std::collections::BTreeSet;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::feed::SourceUser;
use crate::platform::TargetUser;
use crate::snapshot::DirectorySnapshot;

/// Administrative account of the target platform.
pub const ADMIN_ACCOUNT: &str = "oneadmin";
/// Service account the platform's front-ends authenticate with.
pub const SERVICE_ACCOUNT: &str = "serveradmin";
/// Catch-all group new accounts land in.
pub const DEFAULT_GROUP: &str = "users";
/// Authentication driver every managed account uses.
pub const DEFAULT_AUTH_DRIVER: &str = "x509";

/// Groups that are never managed, whatever the configuration says.
pub const BUILTIN_EXCLUDED_GROUPS: [&str; 2] = [ADMIN_ACCOUNT, DEFAULT_GROUP];
/// Substrings no source login may ever contain.
pub const BUILTIN_PROTECTED_LOGINS: [&str; 2] = [ADMIN_ACCOUNT, SERVICE_ACCOUNT];
/// Substrings no removed login may ever contain.
pub const BUILTIN_REMOVAL_PROTECTED_LOGINS: [&str; 1] = [ADMIN_ACCOUNT];

/// Tunable safety rules; the defaults match a stock OpenNebula install.
///
/// The configured lists extend the built-in ones. A configuration can
/// widen the protected boundary but never shrink it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Groups outside of the managed boundary, on top of
    /// [`BUILTIN_EXCLUDED_GROUPS`].
    pub excluded_groups: BTreeSet<String>,
    /// Substrings no source login may contain, on top of
    /// [`BUILTIN_PROTECTED_LOGINS`].
    pub protected_logins: Vec<String>,
    /// Substrings no removed login may contain, on top of
    /// [`BUILTIN_REMOVAL_PROTECTED_LOGINS`].
    pub removal_protected_logins: Vec<String>,
    /// Authentication driver set on every managed account.
    pub auth_driver: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            excluded_groups: BTreeSet::new(),
            protected_logins: Vec::new(),
            removal_protected_logins: Vec::new(),
            auth_driver: DEFAULT_AUTH_DRIVER.to_string(),
        }
    }
}

impl Policy {
    pub fn is_excluded(&self, group: &str) -> bool {
        BUILTIN_EXCLUDED_GROUPS.iter().any(|g| *g == group) || self.excluded_groups.contains(group)
    }

    /// Names of every existing target group that is not excluded.
    pub fn managed_groups(&self, snapshot: &DirectorySnapshot) -> BTreeSet<String> {
        snapshot
            .groups()
            .iter()
            .filter(|g| !self.is_excluded(&g.name))
            .map(|g| g.name.clone())
            .collect()
    }

    /// Whether every group of `user` is managed.
    pub fn is_managed_user(
        &self,
        snapshot: &DirectorySnapshot,
        managed_groups: &BTreeSet<String>,
        user: &TargetUser,
    ) -> Result<bool> {
        let groups = snapshot.user_group_names(user)?;
        Ok(groups.is_subset(managed_groups))
    }

    /// Rejects feed groups that are excluded.
    ///
    /// This half of [`Policy::check_groups`] needs no platform access.
    pub fn check_feed_groups(&self, desired_groups: &BTreeSet<String>) -> Result<()> {
        if let Some(group) = desired_groups.iter().find(|g| self.is_excluded(g)) {
            return Err(Error::policy(format!("Group {:?} is not allowed!", group)));
        }
        Ok(())
    }

    /// Rejects feed groups that are excluded or do not exist as managed
    /// groups on the platform.
    pub fn check_groups(
        &self,
        managed_groups: &BTreeSet<String>,
        desired_groups: &BTreeSet<String>,
    ) -> Result<()> {
        debug!(
            "Checking feed groups {:?} against managed groups {:?}",
            desired_groups, managed_groups
        );
        self.check_feed_groups(desired_groups)?;

        if let Some(group) = desired_groups.difference(managed_groups).next() {
            return Err(Error::policy(format!(
                "Group {:?} is not allowed! It does not exist as a managed group",
                group
            )));
        }
        Ok(())
    }

    /// Validates one source record before it is created or updated.
    pub fn check_user(&self, user: &SourceUser) -> Result<()> {
        debug!("Checking user {:?} from the feed", user.login());

        if user.login().trim().is_empty() {
            return Err(Error::validation(user.login(), "login is empty"));
        }

        if let Some(name) =
            protected_substring(&BUILTIN_PROTECTED_LOGINS, &self.protected_logins, user.login())
        {
            return Err(Error::policy(format!(
                "User {:?} is not allowed! Login contains {:?}",
                user.login(),
                name
            )));
        }

        if user.groups().is_empty() {
            return Err(Error::validation(
                user.login(),
                "user is not a member of any group",
            ));
        }

        if user.krb_principals().is_empty() || user.cert_dns().is_empty() {
            return Err(Error::validation(
                user.login(),
                "user doesn't have required credentials",
            ));
        }
        Ok(())
    }

    /// Last check before a user is removed, independent of how the caller
    /// selected it.
    pub fn check_removal(&self, login: &str, groups: &BTreeSet<String>) -> Result<()> {
        if let Some(name) = protected_substring(
            &BUILTIN_REMOVAL_PROTECTED_LOGINS,
            &self.removal_protected_logins,
            login,
        ) {
            return Err(Error::policy(format!(
                "Cannot remove {:?}! Login contains {:?}",
                login, name
            )));
        }

        if let Some(group) = groups.iter().find(|g| self.is_excluded(g)) {
            return Err(Error::policy(format!(
                "Cannot remove {:?}! It's a member of protected group {:?}",
                login, group
            )));
        }
        Ok(())
    }
}

/// First protected name, built-in or configured, contained in `login`.
fn protected_substring<'a>(
    builtin: &'a [&'a str],
    configured: &'a [String],
    login: &str,
) -> Option<&'a str> {
    builtin
        .iter()
        .copied()
        .chain(configured.iter().map(String::as_str))
        .find(|name| !name.is_empty() && login.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::TargetGroup;

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn source(login: &str, groups: &[&str], krb: &[&str], dns: &[&str]) -> SourceUser {
        SourceUser::new(
            login,
            groups.iter().map(|g| g.to_string()).collect(),
            krb.iter().map(|g| g.to_string()).collect(),
            dns.iter().map(|g| g.to_string()).collect(),
        )
    }

    fn snapshot() -> DirectorySnapshot {
        DirectorySnapshot::new(
            vec![
                TargetGroup::new(0, "oneadmin"),
                TargetGroup::new(1, "users"),
                TargetGroup::new(100, "labA"),
                TargetGroup::new(101, "labB"),
            ],
            vec![
                TargetUser::new(5, "bob", 100).with_groups([101]),
                TargetUser::new(6, "admin-ish", 100).with_groups([0]),
                TargetUser::new(8, "default", 1),
            ],
        )
    }

    #[test]
    fn test_managed_groups_skip_excluded() {
        let policy = Policy::default();
        assert_eq!(policy.managed_groups(&snapshot()), names(&["labA", "labB"]));
    }

    #[test]
    fn test_managed_user_requires_all_groups_managed() {
        let policy = Policy::default();
        let snap = snapshot();
        let managed = policy.managed_groups(&snap);

        let bob = snap.require_user("bob").unwrap();
        assert!(policy.is_managed_user(&snap, &managed, bob).unwrap());

        let admin_ish = snap.require_user("admin-ish").unwrap();
        assert!(!policy.is_managed_user(&snap, &managed, admin_ish).unwrap());

        let default = snap.require_user("default").unwrap();
        assert!(!policy.is_managed_user(&snap, &managed, default).unwrap());
    }

    #[test]
    fn test_check_groups_accepts_known_managed() {
        let policy = Policy::default();
        let managed = names(&["labA", "labB"]);
        assert!(policy.check_groups(&managed, &names(&["labA"])).is_ok());
    }

    #[test]
    fn test_check_groups_rejects_excluded() {
        let policy = Policy::default();
        let err = policy
            .check_groups(&names(&["labA"]), &names(&["labA", "oneadmin"]))
            .unwrap_err();
        assert!(matches!(err, Error::PolicyViolation { .. }));
        assert!(err.to_string().contains("oneadmin"));
    }

    #[test]
    fn test_check_groups_rejects_unknown() {
        let policy = Policy::default();
        let err = policy
            .check_groups(&names(&["labA"]), &names(&["labC"]))
            .unwrap_err();
        assert!(err.to_string().contains("labC"));
    }

    #[test]
    fn test_check_user_substring_protection() {
        let policy = Policy::default();
        for login in ["oneadmin", "xoneadminx", "serveradmin2"] {
            let err = policy
                .check_user(&source(login, &["labA"], &["k"], &["d"]))
                .unwrap_err();
            assert!(matches!(err, Error::PolicyViolation { .. }), "{}", login);
        }
    }

    #[test]
    fn test_check_user_requires_groups_and_credentials() {
        let policy = Policy::default();
        assert!(matches!(
            policy.check_user(&source("alice", &[], &["k"], &["d"])),
            Err(Error::Validation { .. })
        ));
        assert!(policy
            .check_user(&source("alice", &["labA"], &[], &["d"]))
            .is_err());
        assert!(policy
            .check_user(&source("alice", &["labA"], &["k"], &[]))
            .is_err());
        assert!(policy
            .check_user(&source("alice", &["labA"], &["k"], &["d"]))
            .is_ok());
    }

    #[test]
    fn test_check_removal() {
        let policy = Policy::default();
        assert!(policy.check_removal("bob", &names(&["labA"])).is_ok());
        assert!(policy.check_removal("oneadmin-old", &names(&["labA"])).is_err());
        assert!(policy
            .check_removal("bob", &names(&["labA", "users"]))
            .is_err());
        // service account is only protected on the way in
        assert!(policy.check_removal("serveradmin", &names(&["labA"])).is_ok());
    }

    #[test]
    fn test_policy_from_yaml_with_defaults() {
        let policy: Policy = serde_yaml::from_str("excluded_groups: [admins]").unwrap();
        assert_eq!(policy.excluded_groups, names(&["admins"]));
        assert_eq!(policy.auth_driver, DEFAULT_AUTH_DRIVER);
        assert!(serde_yaml::from_str::<Policy>("unknown_key: 1").is_err());
    }

    #[test]
    fn test_configured_lists_extend_builtin_protection() {
        let policy: Policy = serde_yaml::from_str(
            "excluded_groups: [staff]\nprotected_logins: []\nremoval_protected_logins: []\n",
        )
        .unwrap();

        assert!(policy.is_excluded("staff"));
        assert!(policy.is_excluded("oneadmin"));
        assert!(policy.is_excluded("users"));
        assert_eq!(policy.managed_groups(&snapshot()), names(&["labA", "labB"]));

        let err = policy.check_feed_groups(&names(&["labA", "oneadmin"])).unwrap_err();
        assert!(matches!(err, Error::PolicyViolation { .. }));

        for login in ["oneadmin", "serveradmin"] {
            assert!(matches!(
                policy.check_user(&source(login, &["labA"], &["k"], &["d"])),
                Err(Error::PolicyViolation { .. })
            ));
        }
        assert!(policy.check_removal("oneadmin-old", &names(&["labA"])).is_err());
    }

    #[test]
    fn test_configured_protected_login_is_added() {
        let policy: Policy = serde_yaml::from_str("protected_logins: [root]").unwrap();
        assert!(policy
            .check_user(&source("rootkit", &["labA"], &["k"], &["d"]))
            .is_err());
        assert!(policy
            .check_user(&source("xoneadmin", &["labA"], &["k"], &["d"]))
            .is_err());
    }

    #[test]
    fn test_check_user_rejects_empty_login() {
        let policy = Policy::default();
        for login in ["", "  "] {
            assert!(matches!(
                policy.check_user(&source(login, &["labA"], &["k"], &["d"])),
                Err(Error::Validation { .. })
            ));
        }
    }
}
