//! # User Reconciler
//!
//! Converges the target platform's users to the identity feed in a single
//! sequential pass:
//!
//! 1. **Load**: snapshot the group and user pools.
//! 2. **Validate**: the feed's groups must all be existing managed groups and
//!    every record must pass the user policy. Nothing has been changed yet if
//!    this fails.
//! 3. **Plan**: classify every login as absent, managed or unmanaged.
//! 4. **Remove**: managed users missing from the feed are torn down through
//!    [`crate::removal`]. Removals finish before any creation so that a freed
//!    login can be reused in the same run.
//! 5. **Upsert**: in feed order, managed users are updated and absent users
//!    are created. Logins held by unmanaged accounts are left alone.
//!
//! Every mutation is preceded by a comparison with the snapshot, so running
//! the pass again against a converged platform issues no mutating call.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, info, warn};

use crate::credentials;
use crate::error::Result;
use crate::feed::{Feed, SourceUser};
use crate::membership::sync_groups;
use crate::platform::Platform;
use crate::policy::Policy;
use crate::properties::{NoProperties, PropertiesApplier};
use crate::removal::{remove_user, KeepResources, ResourceReclaimer};
use crate::snapshot::DirectorySnapshot;

/// Where a login stands relative to the managed boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    AbsentInTarget,
    /// Exists, but belongs to at least one group outside the boundary.
    PresentUnmanaged,
    PresentManaged,
}

/// The set-level diff between feed and platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Managed users missing from the feed, in snapshot order.
    pub to_remove: Vec<String>,
    /// Feed logins without an account, in feed order.
    pub to_create: Vec<String>,
    /// Feed logins with a managed account, in feed order.
    pub to_update: Vec<String>,
    /// Feed logins held by unmanaged accounts.
    pub unmanaged: Vec<String>,
}

impl SyncPlan {
    /// Computes the plan. `managed_users` must come from
    /// [`Reconciler::managed_users`].
    pub fn compute(
        feed: &Feed,
        snapshot: &DirectorySnapshot,
        managed_users: &BTreeSet<String>,
    ) -> Self {
        let source_logins = feed.logins();
        let mut plan = SyncPlan {
            to_remove: snapshot
                .users()
                .iter()
                .filter(|u| managed_users.contains(&u.name) && !source_logins.contains(u.name.as_str()))
                .map(|u| u.name.clone())
                .collect(),
            ..SyncPlan::default()
        };

        for source in feed.users() {
            let login = source.login().to_string();
            match classify(snapshot, managed_users, source.login()) {
                UserState::AbsentInTarget => plan.to_create.push(login),
                UserState::PresentManaged => plan.to_update.push(login),
                UserState::PresentUnmanaged => plan.unmanaged.push(login),
            }
        }
        plan
    }
}

fn classify(snapshot: &DirectorySnapshot, managed_users: &BTreeSet<String>, login: &str) -> UserState {
    if managed_users.contains(login) {
        UserState::PresentManaged
    } else if snapshot.user(login).is_some() {
        UserState::PresentUnmanaged
    } else {
        UserState::AbsentInTarget
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    /// Managed users that needed at least one change.
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Feed logins held by unmanaged accounts.
    pub skipped: usize,
    pub workloads_stopped: usize,
    /// Mutating calls issued against the platform.
    pub calls: usize,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} removed, {} skipped, {} workloads stopped ({} calls)",
            self.created,
            self.updated,
            self.unchanged,
            self.removed,
            self.skipped,
            self.workloads_stopped,
            self.calls
        )
    }
}

/// Drives one synchronization pass against a platform.
pub struct Reconciler<'a, P: Platform> {
    platform: &'a P,
    policy: &'a Policy,
    properties: &'a dyn PropertiesApplier,
    reclaimer: &'a dyn ResourceReclaimer,
}

impl<'a, P: Platform> Reconciler<'a, P> {
    pub fn new(platform: &'a P, policy: &'a Policy) -> Self {
        Self {
            platform,
            policy,
            properties: &NoProperties,
            reclaimer: &KeepResources,
        }
    }

    pub fn with_properties(mut self, properties: &'a dyn PropertiesApplier) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_reclaimer(mut self, reclaimer: &'a dyn ResourceReclaimer) -> Self {
        self.reclaimer = reclaimer;
        self
    }

    /// Logins of every target user whose groups are all managed.
    pub fn managed_users(
        &self,
        snapshot: &DirectorySnapshot,
        managed_groups: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let mut managed = BTreeSet::new();
        for user in snapshot.users() {
            if self.policy.is_managed_user(snapshot, managed_groups, user)? {
                managed.insert(user.name.clone());
            }
        }
        debug!("Managed users: {:?}", managed);
        Ok(managed)
    }

    /// Checks the whole feed against the policy and computes the plan,
    /// without mutating anything.
    pub fn plan(&self, feed: &Feed, snapshot: &DirectorySnapshot) -> Result<SyncPlan> {
        let feed_groups = feed.group_names();
        let managed_groups = self.policy.managed_groups(snapshot);
        self.policy.check_groups(&managed_groups, &feed_groups)?;

        for source in feed.users() {
            self.policy.check_user(source)?;
        }

        let managed_users = self.managed_users(snapshot, &managed_groups)?;
        Ok(SyncPlan::compute(feed, snapshot, &managed_users))
    }

    /// Runs the full pass.
    pub fn run(&self, feed: &Feed) -> Result<SyncSummary> {
        let mut snapshot = DirectorySnapshot::load(self.platform)?;
        let plan = self.plan(feed, &snapshot)?;
        let mut summary = SyncSummary::default();

        info!("Clean-up of old accounts");
        for login in &plan.to_remove {
            let outcome = remove_user(
                self.platform,
                &snapshot,
                self.policy,
                self.reclaimer,
                login,
            )?;
            snapshot.forget_user(outcome.user_id);
            summary.removed += 1;
            summary.workloads_stopped += outcome.workloads_stopped;
            summary.calls += outcome.workloads_stopped + 1;
        }

        info!("Adding/Updating accounts");
        for source in feed.users() {
            match classify_plan(&plan, source.login()) {
                UserState::PresentManaged => {
                    let calls = self.update_user(&mut snapshot, source)?;
                    if calls > 0 {
                        summary.updated += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                    summary.calls += calls;
                }
                UserState::AbsentInTarget => {
                    summary.calls += self.create_user(&mut snapshot, source)?;
                    summary.created += 1;
                }
                UserState::PresentUnmanaged => {
                    warn!(
                        "User {:?} exists outside of the managed groups, leaving it untouched",
                        source.login()
                    );
                    summary.skipped += 1;
                }
            }
        }

        info!("Synchronization finished: {}", summary);
        Ok(summary)
    }

    /// Brings an existing managed account in line with its record. Returns
    /// the number of mutating calls issued.
    fn update_user(&self, snapshot: &mut DirectorySnapshot, source: &SourceUser) -> Result<usize> {
        info!("Updating user {:?}", source.login());
        let mut user = snapshot.require_user(source.login())?.clone();
        let mut calls = 0;

        if user.auth_driver != self.policy.auth_driver {
            debug!(
                "Changing auth driver of {:?} from {:?} to {:?}",
                user.name, user.auth_driver, self.policy.auth_driver
            );
            self.platform
                .set_auth_driver(user.id, &self.policy.auth_driver)?;
            user.auth_driver = self.policy.auth_driver.clone();
            calls += 1;
        }

        let password = credentials::encode(source.krb_principals(), source.cert_dns());
        if user.password != password {
            debug!(
                "Changing password of {:?} from {:?} to {:?}",
                user.name, user.password, password
            );
            self.platform.set_password(user.id, &password)?;
            user.password = password;
            calls += 1;
        }

        calls += sync_groups(self.platform, snapshot, &mut user, source.groups())?.calls();
        calls += self.properties.apply(self.platform, &mut user, source)?;

        snapshot.refresh_user(user);
        Ok(calls)
    }

    /// Allocates a new account and sets it up. Returns the number of
    /// mutating calls issued.
    fn create_user(&self, snapshot: &mut DirectorySnapshot, source: &SourceUser) -> Result<usize> {
        info!("Creating user {:?}", source.login());
        let password = credentials::encode(source.krb_principals(), source.cert_dns());
        debug!("With password {:?}", password);

        let id = self
            .platform
            .allocate_user(source.login(), &password, &self.policy.auth_driver)?;
        let mut user = self.platform.user_info(id)?;
        snapshot.refresh_user(user.clone());

        let mut calls = 1;
        calls += sync_groups(self.platform, snapshot, &mut user, source.groups())?.calls();
        calls += self.properties.apply(self.platform, &mut user, source)?;

        snapshot.refresh_user(user);
        Ok(calls)
    }
}

fn classify_plan(plan: &SyncPlan, login: &str) -> UserState {
    if plan.to_update.iter().any(|l| l == login) {
        UserState::PresentManaged
    } else if plan.unmanaged.iter().any(|l| l == login) {
        UserState::PresentUnmanaged
    } else {
        UserState::AbsentInTarget
    }
}
