//! # Cascading Removal
//!
//! Deleting a managed account happens in a fixed order:
//!
//! 1. Re-check the removal policy, whatever selected the user.
//! 2. Hard-stop every unfinished workload the user owns, so nothing is left
//!    running under a deleted owner.
//! 3. Release other owned resources through a [`ResourceReclaimer`].
//! 4. Delete the account.
//!
//! Every step is safe to repeat: finished workloads are skipped, a workload
//! that vanished in between counts as stopped, and the reclaimer hooks must
//! treat absent resources as released. An interrupted removal is simply
//! picked up again by the next run.

use log::{debug, info};

use crate::error::Result;
use crate::platform::{Platform, TargetUser};
use crate::policy::Policy;
use crate::snapshot::DirectorySnapshot;

/// Hooks releasing resources a removed user owns, other than workloads.
pub trait ResourceReclaimer {
    fn release_images(&self, owner: &TargetUser) -> Result<()>;

    fn release_networks(&self, owner: &TargetUser) -> Result<()>;
}

/// Reclaimer that leaves images and networks in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepResources;

impl ResourceReclaimer for KeepResources {
    fn release_images(&self, owner: &TargetUser) -> Result<()> {
        debug!("Image release for user {} is not implemented, skipping", owner.id);
        Ok(())
    }

    fn release_networks(&self, owner: &TargetUser) -> Result<()> {
        debug!("Network release for user {} is not implemented, skipping", owner.id);
        Ok(())
    }
}

/// What a removal did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub user_id: i64,
    pub workloads_stopped: usize,
}

/// Removes the managed user `login` together with what it owns.
pub fn remove_user<P: Platform + ?Sized>(
    platform: &P,
    snapshot: &DirectorySnapshot,
    policy: &Policy,
    reclaimer: &dyn ResourceReclaimer,
    login: &str,
) -> Result<RemovalOutcome> {
    debug!("Removing user {:?}", login);
    let user = snapshot.require_user(login)?;
    let groups = snapshot.user_group_names(user)?;
    policy.check_removal(login, &groups)?;

    let workloads_stopped = stop_workloads(platform, user)?;
    reclaimer.release_images(user)?;
    reclaimer.release_networks(user)?;

    info!("Deleting user {:?} (ID {})", login, user.id);
    platform.delete_user(user.id)?;

    Ok(RemovalOutcome {
        user_id: user.id,
        workloads_stopped,
    })
}

/// Hard-stops the unfinished workloads owned by `owner`.
pub fn stop_workloads<P: Platform + ?Sized>(platform: &P, owner: &TargetUser) -> Result<usize> {
    let mut stopped = 0;
    for workload in platform.list_workloads(owner.id)? {
        if workload.owner_id != owner.id || workload.state.is_terminated() {
            continue;
        }
        info!(
            "Shutting down workload {} ({:?}) of {:?}",
            workload.id, workload.name, owner.name
        );
        match platform.shutdown_workload(workload.id, true) {
            Ok(()) => {}
            Err(e) if e.as_provider().is_some_and(|p| p.is_already_gone()) => {
                debug!("Workload {} already gone: {}", workload.id, e);
            }
            Err(e) => return Err(e),
        }
        stopped += 1;
    }
    Ok(stopped)
}
