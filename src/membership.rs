//! # Group Membership Synchronizer
//!
//! Converges one user's group memberships to the list requested by the feed.
//!
//! 1. The primary group is kept when it is one of the desired groups, so a
//!    user whose membership is only being extended keeps its owning group.
//!    Otherwise the first desired group becomes primary.
//! 2. Missing secondary groups are added.
//! 3. Groups the user has but the feed does not list are removed.
//!
//! Adding an existing member or removing a non-member is reported as an
//! action error by the platform; both are treated as success. Any other
//! provider error is returned as is.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::platform::{Platform, TargetUser};
use crate::snapshot::DirectorySnapshot;

/// What [`sync_groups`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    /// New primary group, if it changed.
    pub primary: Option<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl MembershipChange {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of mutating calls issued.
    pub fn calls(&self) -> usize {
        usize::from(self.primary.is_some()) + self.added.len() + self.removed.len()
    }
}

/// Picks the primary group for a user with `current_primary` that should be
/// in `desired` groups.
pub fn select_primary<'a>(current_primary: Option<&'a str>, desired: &'a [String]) -> Option<&'a str> {
    match current_primary {
        Some(current) if desired.iter().any(|g| g == current) => Some(current),
        _ => desired.first().map(String::as_str),
    }
}

/// Applies the membership diff for `user` and updates its local copy.
pub fn sync_groups<P: Platform + ?Sized>(
    platform: &P,
    snapshot: &DirectorySnapshot,
    user: &mut TargetUser,
    desired: &[String],
) -> Result<MembershipChange> {
    let mut change = MembershipChange::default();
    let current = snapshot.user_group_names(user)?;
    let current_primary = if user.group_ids.contains(&user.primary_group_id) {
        Some(snapshot.group_name(user.primary_group_id)?.to_string())
    } else {
        None
    };

    let primary = select_primary(current_primary.as_deref(), desired)
        .ok_or_else(|| Error::validation(&user.name, "user is not a member of any group"))?
        .to_string();

    if current_primary.as_deref() != Some(primary.as_str()) {
        info!("Setting primary group of {:?} to {:?}", user.name, primary);
        let gid = snapshot.group_id(&primary)?;
        platform.set_primary_group(user.id, gid)?;
        user.primary_group_id = gid;
        user.group_ids.insert(gid);
        change.primary = Some(primary.clone());
    }

    let mut seen = BTreeSet::new();
    for group in desired {
        if *group == primary || !seen.insert(group.as_str()) || current.contains(group) {
            continue;
        }
        debug!("Also adding {:?} to group {:?}", user.name, group);
        let gid = snapshot.group_id(group)?;
        tolerate(platform.add_group(user.id, gid), |e| {
            e.as_provider().is_some_and(|p| p.is_already_member())
        })?;
        user.group_ids.insert(gid);
        change.added.push(group.clone());
    }

    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();
    for group in current.iter().filter(|g| !desired.contains(g.as_str())) {
        info!("Removing {:?} from group {:?}", user.name, group);
        let gid = snapshot.group_id(group)?;
        tolerate(platform.remove_group(user.id, gid), |e| {
            e.as_provider().is_some_and(|p| p.is_not_member())
        })?;
        user.group_ids.remove(&gid);
        change.removed.push(group.clone());
    }

    Ok(change)
}

/// Turns the errors `accept` recognizes into success.
fn tolerate(result: Result<()>, accept: impl Fn(&Error) -> bool) -> Result<()> {
    match result {
        Err(e) if accept(&e) => {
            debug!("Ignoring tolerated provider error: {}", e);
            Ok(())
        }
        other => other,
    }
}
