//! # Target Platform Interface
//!
//! This module defines the `Platform` trait, the black-box view the
//! reconciliation engine has of the resource-management platform it keeps in
//! sync, along with the plain data types the platform hands back.
//!
//! ## Design
//!
//! The engine never talks to the network directly. Every listing and every
//! mutation goes through `Platform`, which keeps the reconciliation logic
//! independent of the wire protocol:
//!
//! - **`OneClient`** (in [`crate::opennebula`]) implements the trait over
//!   OpenNebula's XML-RPC API.
//! - **`DryRun`** wraps any other implementation, forwards reads and only
//!   logs writes.
//! - Tests provide recording mocks.
//!
//! All calls are synchronous. Timeouts are a property of the implementation
//! (the OpenNebula client takes one from the command line).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use log::info;

use crate::error::Result;

/// A group on the target platform. Never created or modified by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroup {
    pub id: i64,
    pub name: String,
}

impl TargetGroup {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A user account on the target platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    pub id: i64,
    pub name: String,
    pub auth_driver: String,
    /// Stored password, compared but never decoded.
    pub password: String,
    pub primary_group_id: i64,
    /// Every group the user belongs to, primary included.
    pub group_ids: BTreeSet<i64>,
    pub properties: BTreeMap<String, String>,
}

impl TargetUser {
    pub fn new(id: i64, name: impl Into<String>, primary_group_id: i64) -> Self {
        Self {
            id,
            name: name.into(),
            auth_driver: String::new(),
            password: String::new(),
            primary_group_id,
            group_ids: BTreeSet::from([primary_group_id]),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_groups(mut self, group_ids: impl IntoIterator<Item = i64>) -> Self {
        self.group_ids.extend(group_ids);
        self
    }

    pub fn with_auth(mut self, auth_driver: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth_driver = auth_driver.into();
        self.password = password.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Lifecycle state of a workload (virtual machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadState {
    Init,
    Pending,
    Hold,
    Active,
    Stopped,
    Suspended,
    Done,
    Poweroff,
    Undeployed,
    Other(i64),
}

impl WorkloadState {
    /// Maps OpenNebula's numeric VM `STATE`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => WorkloadState::Init,
            1 => WorkloadState::Pending,
            2 => WorkloadState::Hold,
            3 => WorkloadState::Active,
            4 => WorkloadState::Stopped,
            5 => WorkloadState::Suspended,
            6 => WorkloadState::Done,
            8 => WorkloadState::Poweroff,
            9 => WorkloadState::Undeployed,
            other => WorkloadState::Other(other),
        }
    }

    /// A finished workload needs no shutdown.
    pub fn is_terminated(self) -> bool {
        self == WorkloadState::Done
    }
}

/// A workload owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub state: WorkloadState,
}

/// Operations the engine needs from the target platform.
///
/// Every method returns `Error::Provider` when the platform rejects the
/// call; callers decide which provider errors they tolerate.
pub trait Platform: Send + Sync {
    fn list_groups(&self) -> Result<Vec<TargetGroup>>;

    fn list_users(&self) -> Result<Vec<TargetUser>>;

    /// Fetches a single user, e.g. to refresh it after allocation.
    fn user_info(&self, user_id: i64) -> Result<TargetUser>;

    /// Creates a user and returns its ID.
    fn allocate_user(&self, login: &str, password: &str, auth_driver: &str) -> Result<i64>;

    fn set_primary_group(&self, user_id: i64, group_id: i64) -> Result<()>;

    fn add_group(&self, user_id: i64, group_id: i64) -> Result<()>;

    fn remove_group(&self, user_id: i64, group_id: i64) -> Result<()>;

    fn set_auth_driver(&self, user_id: i64, auth_driver: &str) -> Result<()>;

    fn set_password(&self, user_id: i64, password: &str) -> Result<()>;

    /// Merges `properties` into the user's template.
    fn update_properties(&self, user_id: i64, properties: &BTreeMap<String, String>)
        -> Result<()>;

    fn delete_user(&self, user_id: i64) -> Result<()>;

    /// Lists the owner's workloads that have not finished yet.
    fn list_workloads(&self, owner_id: i64) -> Result<Vec<Workload>>;

    fn shutdown_workload(&self, workload_id: i64, hard: bool) -> Result<()>;
}

/// A `Platform` that forwards reads and only logs writes.
///
/// Allocated users get synthetic negative IDs so that the rest of a dry run
/// can still refer to them.
pub struct DryRun<P: Platform> {
    inner: P,
    allocated: Mutex<BTreeMap<i64, TargetUser>>,
}

impl<P: Platform> DryRun<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            allocated: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: Platform> Platform for DryRun<P> {
    fn list_groups(&self) -> Result<Vec<TargetGroup>> {
        self.inner.list_groups()
    }

    fn list_users(&self) -> Result<Vec<TargetUser>> {
        self.inner.list_users()
    }

    fn user_info(&self, user_id: i64) -> Result<TargetUser> {
        if user_id < 0 {
            let allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(user) = allocated.get(&user_id) {
                return Ok(user.clone());
            }
        }
        self.inner.user_info(user_id)
    }

    fn allocate_user(&self, login: &str, password: &str, auth_driver: &str) -> Result<i64> {
        let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
        let id = -(allocated.len() as i64) - 1;
        info!("[dry-run] allocate user {:?} with driver {:?}", login, auth_driver);
        let mut user = TargetUser::new(id, login, -1).with_auth(auth_driver, password);
        user.group_ids.clear();
        allocated.insert(id, user);
        Ok(id)
    }

    fn set_primary_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        info!("[dry-run] set primary group of user {} to {}", user_id, group_id);
        Ok(())
    }

    fn add_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        info!("[dry-run] add user {} to group {}", user_id, group_id);
        Ok(())
    }

    fn remove_group(&self, user_id: i64, group_id: i64) -> Result<()> {
        info!("[dry-run] remove user {} from group {}", user_id, group_id);
        Ok(())
    }

    fn set_auth_driver(&self, user_id: i64, auth_driver: &str) -> Result<()> {
        info!("[dry-run] set auth driver of user {} to {:?}", user_id, auth_driver);
        Ok(())
    }

    fn set_password(&self, user_id: i64, _password: &str) -> Result<()> {
        info!("[dry-run] set password of user {}", user_id);
        Ok(())
    }

    fn update_properties(
        &self,
        user_id: i64,
        properties: &BTreeMap<String, String>,
    ) -> Result<()> {
        info!(
            "[dry-run] update properties {:?} of user {}",
            properties.keys().collect::<Vec<_>>(),
            user_id
        );
        Ok(())
    }

    fn delete_user(&self, user_id: i64) -> Result<()> {
        info!("[dry-run] delete user {}", user_id);
        Ok(())
    }

    fn list_workloads(&self, owner_id: i64) -> Result<Vec<Workload>> {
        self.inner.list_workloads(owner_id)
    }

    fn shutdown_workload(&self, workload_id: i64, hard: bool) -> Result<()> {
        info!("[dry-run] shutdown workload {} (hard: {})", workload_id, hard);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording in-memory platform shared by the engine tests.

    use super::*;
    use crate::error::{Error, ProviderError, ProviderErrorKind};
    use std::sync::{Arc, Mutex};

    /// A call recorded by [`MockPlatform`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Allocate(String),
        SetPrimaryGroup(i64, i64),
        AddGroup(i64, i64),
        RemoveGroup(i64, i64),
        SetAuthDriver(i64, String),
        SetPassword(i64, String),
        UpdateProperties(i64, Vec<String>),
        DeleteUser(i64),
        Shutdown(i64, bool),
    }

    #[derive(Default)]
    struct State {
        groups: Vec<TargetGroup>,
        users: Vec<TargetUser>,
        workloads: Vec<Workload>,
        next_id: i64,
        /// Group assigned to freshly allocated users.
        default_group: i64,
        failures: BTreeMap<&'static str, ProviderError>,
    }

    /// In-memory platform that applies calls to its own state.
    ///
    /// Membership calls behave like OpenNebula: adding a member or removing
    /// a non-member fails with an action error.
    #[derive(Clone)]
    pub struct MockPlatform {
        state: Arc<Mutex<State>>,
        pub calls: Arc<Mutex<Vec<Call>>>,
    }

    impl MockPlatform {
        pub fn new(groups: Vec<TargetGroup>, users: Vec<TargetUser>) -> Self {
            let next_id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
            let default_group = groups
                .iter()
                .find(|g| g.name == "users")
                .map(|g| g.id)
                .unwrap_or(1);
            Self {
                state: Arc::new(Mutex::new(State {
                    groups,
                    users,
                    workloads: Vec::new(),
                    next_id,
                    default_group,
                    failures: BTreeMap::new(),
                })),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn with_workloads(self, workloads: Vec<Workload>) -> Self {
            self.state.lock().unwrap().workloads = workloads;
            self
        }

        /// Makes every call of the named operation fail with `error`.
        pub fn failing(self, operation: &'static str, error: ProviderError) -> Self {
            self.state.lock().unwrap().failures.insert(operation, error);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn user(&self, name: &str) -> Option<TargetUser> {
            self.state
                .lock()
                .unwrap()
                .users
                .iter()
                .find(|u| u.name == name)
                .cloned()
        }

        pub fn workloads(&self) -> Vec<Workload> {
            self.state.lock().unwrap().workloads.clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn check_failure(&self, operation: &'static str) -> Result<()> {
            match self.state.lock().unwrap().failures.get(operation) {
                Some(error) => Err(Error::provider(operation, error.clone())),
                None => Ok(()),
            }
        }

        fn with_user<T>(
            &self,
            operation: &'static str,
            user_id: i64,
            f: impl FnOnce(&mut TargetUser) -> Result<T>,
        ) -> Result<T> {
            let mut state = self.state.lock().unwrap();
            match state.users.iter_mut().find(|u| u.id == user_id) {
                Some(user) => f(user),
                None => Err(Error::provider(
                    operation,
                    ProviderError::new(
                        ProviderErrorKind::NoExists,
                        format!("Error getting user [{}]", user_id),
                    ),
                )),
            }
        }
    }

    impl Platform for MockPlatform {
        fn list_groups(&self) -> Result<Vec<TargetGroup>> {
            self.check_failure("list_groups")?;
            Ok(self.state.lock().unwrap().groups.clone())
        }

        fn list_users(&self) -> Result<Vec<TargetUser>> {
            self.check_failure("list_users")?;
            Ok(self.state.lock().unwrap().users.clone())
        }

        fn user_info(&self, user_id: i64) -> Result<TargetUser> {
            self.with_user("user_info", user_id, |user| Ok(user.clone()))
        }

        fn allocate_user(&self, login: &str, password: &str, auth_driver: &str) -> Result<i64> {
            self.record(Call::Allocate(login.to_string()));
            self.check_failure("allocate_user")?;
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            let user =
                TargetUser::new(id, login, state.default_group).with_auth(auth_driver, password);
            state.users.push(user);
            Ok(id)
        }

        fn set_primary_group(&self, user_id: i64, group_id: i64) -> Result<()> {
            self.record(Call::SetPrimaryGroup(user_id, group_id));
            self.check_failure("set_primary_group")?;
            self.with_user("set_primary_group", user_id, |user| {
                user.group_ids.remove(&user.primary_group_id);
                user.primary_group_id = group_id;
                user.group_ids.insert(group_id);
                Ok(())
            })
        }

        fn add_group(&self, user_id: i64, group_id: i64) -> Result<()> {
            self.record(Call::AddGroup(user_id, group_id));
            self.check_failure("add_group")?;
            self.with_user("add_group", user_id, |user| {
                if user.group_ids.insert(group_id) {
                    Ok(())
                } else {
                    Err(Error::provider(
                        "add_group",
                        ProviderError::new(
                            ProviderErrorKind::Action,
                            "[UserAddGroup] User is already in this group",
                        ),
                    ))
                }
            })
        }

        fn remove_group(&self, user_id: i64, group_id: i64) -> Result<()> {
            self.record(Call::RemoveGroup(user_id, group_id));
            self.check_failure("remove_group")?;
            self.with_user("remove_group", user_id, |user| {
                if user.group_ids.remove(&group_id) {
                    Ok(())
                } else {
                    Err(Error::provider(
                        "remove_group",
                        ProviderError::new(
                            ProviderErrorKind::Action,
                            "[UserDelGroup] User is not part of this group",
                        ),
                    ))
                }
            })
        }

        fn set_auth_driver(&self, user_id: i64, auth_driver: &str) -> Result<()> {
            self.record(Call::SetAuthDriver(user_id, auth_driver.to_string()));
            self.check_failure("set_auth_driver")?;
            self.with_user("set_auth_driver", user_id, |user| {
                user.auth_driver = auth_driver.to_string();
                Ok(())
            })
        }

        fn set_password(&self, user_id: i64, password: &str) -> Result<()> {
            self.record(Call::SetPassword(user_id, password.to_string()));
            self.check_failure("set_password")?;
            self.with_user("set_password", user_id, |user| {
                user.password = password.to_string();
                Ok(())
            })
        }

        fn update_properties(
            &self,
            user_id: i64,
            properties: &BTreeMap<String, String>,
        ) -> Result<()> {
            self.record(Call::UpdateProperties(
                user_id,
                properties.keys().cloned().collect(),
            ));
            self.check_failure("update_properties")?;
            self.with_user("update_properties", user_id, |user| {
                user.properties.extend(properties.clone());
                Ok(())
            })
        }

        fn delete_user(&self, user_id: i64) -> Result<()> {
            self.record(Call::DeleteUser(user_id));
            self.check_failure("delete_user")?;
            self.with_user("delete_user", user_id, |_| Ok(()))?;
            self.state.lock().unwrap().users.retain(|u| u.id != user_id);
            Ok(())
        }

        fn list_workloads(&self, owner_id: i64) -> Result<Vec<Workload>> {
            self.check_failure("list_workloads")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .workloads
                .iter()
                .filter(|w| w.owner_id == owner_id && !w.state.is_terminated())
                .cloned()
                .collect())
        }

        fn shutdown_workload(&self, workload_id: i64, hard: bool) -> Result<()> {
            self.record(Call::Shutdown(workload_id, hard));
            self.check_failure("shutdown_workload")?;
            let mut state = self.state.lock().unwrap();
            if let Some(workload) = state.workloads.iter_mut().find(|w| w.id == workload_id) {
                workload.state = WorkloadState::Done;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Call, MockPlatform};
    use super::*;

    #[test]
    fn test_workload_state_codes() {
        assert_eq!(WorkloadState::from_code(3), WorkloadState::Active);
        assert_eq!(WorkloadState::from_code(8), WorkloadState::Poweroff);
        assert_eq!(WorkloadState::from_code(42), WorkloadState::Other(42));
        assert!(WorkloadState::from_code(6).is_terminated());
        assert!(!WorkloadState::Poweroff.is_terminated());
    }

    #[test]
    fn test_target_user_builder_includes_primary_group() {
        let user = TargetUser::new(5, "alice", 100).with_groups([101]);
        assert_eq!(user.group_ids, BTreeSet::from([100, 101]));
    }

    #[test]
    fn test_dry_run_does_not_forward_writes() {
        let mock = MockPlatform::new(
            vec![TargetGroup::new(100, "labA")],
            vec![TargetUser::new(5, "alice", 100)],
        );
        let dry = DryRun::new(mock.clone());

        dry.set_password(5, "secret").unwrap();
        dry.delete_user(5).unwrap();
        dry.shutdown_workload(9, true).unwrap();

        assert!(mock.calls().is_empty());
        assert_eq!(dry.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_dry_run_allocations_are_visible() {
        let mock = MockPlatform::new(vec![], vec![]);
        let dry = DryRun::new(mock.clone());

        let first = dry.allocate_user("alice", "pw", "x509").unwrap();
        let second = dry.allocate_user("bob", "pw", "x509").unwrap();
        assert!(first < 0 && second < 0 && first != second);

        let alice = dry.user_info(first).unwrap();
        assert_eq!(alice.name, "alice");
        assert!(alice.group_ids.is_empty());
        assert!(!mock.calls().contains(&Call::Allocate("alice".to_string())));
    }
}
