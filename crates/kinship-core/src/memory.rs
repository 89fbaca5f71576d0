//! In-memory [`GroupStore`].
//!
//! Thread-safe and non-durable. Used for embedding and tests; it can be told
//! to fail specific operations to exercise store-outage paths.

use crate::attributes::AttributeSet;
use crate::error::{Error, Result};
use crate::model::{Group, GroupId, User, UserId};
use crate::store::GroupStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateGroup,
    GetGroup,
    ListGroups,
    SetUserGroup,
    SetUserAttributes,
    GetUser,
    CreateUser,
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: BTreeMap<GroupId, Group>,
    users: BTreeMap<UserId, User>,
    last_group: u64,
    last_user: u64,
    unavailable: bool,
    pending_failures: HashMap<Operation, usize>,
}

impl MemoryState {
    fn check(&mut self, op: Operation) -> Result<()> {
        if self.unavailable {
            return Err(Error::StoreUnavailable("memory store offline".into()));
        }
        if let Some(remaining) = self.pending_failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::StoreUnavailable(format!("injected failure: {:?}", op)));
            }
        }
        Ok(())
    }
}

/// Non-durable store keeping everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `StoreUnavailable`.
    pub fn fail_next(&self, op: Operation) {
        if let Ok(mut state) = self.state.lock() {
            *state.pending_failures.entry(op).or_insert(0) += 1;
        }
    }

    /// Take the whole store offline (or bring it back).
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::StoreUnavailable("poisoned lock: memory store".into()))
    }
}

impl GroupStore for MemoryStore {
    fn create_group(&self, attributes: &AttributeSet) -> Result<GroupId> {
        let mut state = self.lock()?;
        state.check(Operation::CreateGroup)?;
        state.last_group += 1;
        let id = GroupId(state.last_group);
        state.groups.insert(id, Group::new(id, attributes.clone()));
        Ok(id)
    }

    fn get_group(&self, id: GroupId) -> Result<Group> {
        let mut state = self.lock()?;
        state.check(Operation::GetGroup)?;
        state
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::GroupNotFound(id))
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let mut state = self.lock()?;
        state.check(Operation::ListGroups)?;
        Ok(state.groups.values().cloned().collect())
    }

    fn set_user_group(&self, user: UserId, group: GroupId) -> Result<()> {
        let mut state = self.lock()?;
        state.check(Operation::SetUserGroup)?;
        if !state.groups.contains_key(&group) {
            return Err(Error::GroupNotFound(group));
        }
        let record = state
            .users
            .get_mut(&user)
            .ok_or_else(|| Error::UserNotFound(user))?;
        record.group_id = Some(group);
        Ok(())
    }

    fn set_user_attributes(&self, user: UserId, attributes: Vec<String>) -> Result<()> {
        let mut state = self.lock()?;
        state.check(Operation::SetUserAttributes)?;
        let record = state
            .users
            .get_mut(&user)
            .ok_or_else(|| Error::UserNotFound(user))?;
        record.attributes = attributes;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        let mut state = self.lock()?;
        state.check(Operation::GetUser)?;
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::UserNotFound(id))
    }

    fn create_user(&self, attributes: Vec<String>) -> Result<UserId> {
        let mut state = self.lock()?;
        state.check(Operation::CreateUser)?;
        state.last_user += 1;
        let id = UserId(state.last_user);
        state.users.insert(id, User::new(id, attributes));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_listing_is_ordered() {
        let store = MemoryStore::new();
        let a = store.create_group(&AttributeSet::new(["a"])).unwrap();
        let b = store.create_group(&AttributeSet::new(["b"])).unwrap();
        assert!(a < b);

        let ids: Vec<_> = store.list_groups().unwrap().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn set_user_group_requires_both_records() {
        let store = MemoryStore::new();
        let group = store.create_group(&AttributeSet::new(["a"])).unwrap();
        assert!(matches!(
            store.set_user_group(UserId(99), group),
            Err(Error::UserNotFound(UserId(99)))
        ));

        let user = store.create_user(vec!["a".into()]).unwrap();
        assert!(matches!(
            store.set_user_group(user, GroupId(42)),
            Err(Error::GroupNotFound(GroupId(42)))
        ));

        store.set_user_group(user, group).unwrap();
        assert_eq!(store.get_user(user).unwrap().group_id, Some(group));
    }

    #[test]
    fn injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(Operation::CreateGroup);

        let err = store.create_group(&AttributeSet::new(["a"])).unwrap_err();
        assert!(err.is_retryable());
        assert!(store.list_groups().unwrap().is_empty());

        store.create_group(&AttributeSet::new(["a"])).unwrap();
        assert_eq!(store.list_groups().unwrap().len(), 1);
    }

    #[test]
    fn offline_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.list_groups(), Err(Error::StoreUnavailable(_))));
        assert!(matches!(store.get_user(UserId(1)), Err(Error::StoreUnavailable(_))));

        store.set_unavailable(false);
        assert!(store.list_groups().is_ok());
    }
}
