//! # Directory Snapshot
//!
//! The state of the target platform's group and user pools, fetched once at
//! the start of a run. Nothing here is refreshed implicitly: the only way a
//! user changes inside a snapshot is [`DirectorySnapshot::refresh_user`],
//! called after a mutation whose result (new ID, default group) is only
//! known once the platform has answered.

use std::collections::BTreeSet;

use log::debug;

use crate::error::{Error, Result};
use crate::platform::{Platform, TargetGroup, TargetUser};

#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    groups: Vec<TargetGroup>,
    users: Vec<TargetUser>,
}

impl DirectorySnapshot {
    pub fn new(groups: Vec<TargetGroup>, users: Vec<TargetUser>) -> Self {
        Self { groups, users }
    }

    /// Lists groups and users. Either listing failing aborts the run.
    pub fn load<P: Platform + ?Sized>(platform: &P) -> Result<Self> {
        debug!("Getting GroupPool");
        let groups = platform.list_groups()?;
        debug!("Getting UserPool");
        let users = platform.list_users()?;
        debug!(
            "Snapshot holds {} groups and {} users",
            groups.len(),
            users.len()
        );
        Ok(Self::new(groups, users))
    }

    pub fn groups(&self) -> &[TargetGroup] {
        &self.groups
    }

    pub fn users(&self) -> &[TargetUser] {
        &self.users
    }

    pub fn group_names(&self) -> BTreeSet<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    /// Resolves a group name to its ID.
    pub fn group_id(&self, name: &str) -> Result<i64> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.id)
            .ok_or_else(|| Error::resolution(format!("group name {:?} not found", name)))
    }

    /// Resolves a group ID to its name.
    pub fn group_name(&self, id: i64) -> Result<&str> {
        self.groups
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.as_str())
            .ok_or_else(|| Error::resolution(format!("group ID {} not found", id)))
    }

    /// Names of every group `user` belongs to.
    pub fn user_group_names(&self, user: &TargetUser) -> Result<BTreeSet<String>> {
        user.group_ids
            .iter()
            .map(|&id| self.group_name(id).map(str::to_string))
            .collect()
    }

    pub fn user(&self, login: &str) -> Option<&TargetUser> {
        self.users.iter().find(|u| u.name == login)
    }

    /// Looks a login up, failing when it is unknown.
    pub fn require_user(&self, login: &str) -> Result<&TargetUser> {
        self.user(login)
            .ok_or_else(|| Error::resolution(format!("user name {:?} not found", login)))
    }

    /// Replaces (or adds) the local copy of one user.
    pub fn refresh_user(&mut self, user: TargetUser) {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.users.push(user),
        }
    }

    /// Drops a user after it was deleted on the platform.
    pub fn forget_user(&mut self, user_id: i64) {
        self.users.retain(|u| u.id != user_id);
    }
}
