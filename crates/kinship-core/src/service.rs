//! User-to-group assignment.
//!
//! [`AssignmentService`] ties the matcher, the index and the store together.
//! Index and store stay coherent because the index is only extended after
//! the store acknowledges a new group, and store I/O never runs under the
//! index lock.

use crate::attributes::AttributeSet;
use crate::error::{Error, Result};
use crate::index::{GroupIndex, Snapshot};
use crate::matcher::{GroupMatcher, DEFAULT_MATCH_THRESHOLD};
use crate::model::{Group, GroupId, User, UserId};
use crate::store::GroupStore;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// How concurrent group-creation decisions are coordinated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsistencyMode {
    /// Assignments never wait on each other. Two similar users arriving at
    /// once may both miss and create near-duplicate groups.
    #[default]
    Optimistic,
    /// Creation decisions are serialized: after a miss the service waits for
    /// any in-flight creation, then matches again before creating.
    Serialized,
}

impl FromStr for ConsistencyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Ok(ConsistencyMode::Optimistic),
            "serialized" => Ok(ConsistencyMode::Serialized),
            other => Err(Error::InvalidInput(format!(
                "unknown consistency mode '{}' (expected optimistic or serialized)",
                other
            ))),
        }
    }
}

/// Tunables for [`AssignmentService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentConfig {
    /// Minimum attribute overlap for joining an existing group (inclusive)
    pub match_threshold: usize,

    /// Coordination of concurrent group creation
    pub consistency: ConsistencyMode,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            consistency: ConsistencyMode::default(),
        }
    }
}

/// Assigns users to the best-matching group, creating groups on demand.
pub struct AssignmentService<S> {
    store: S,
    index: GroupIndex,
    matcher: GroupMatcher,
    consistency: ConsistencyMode,
    creation_lock: Mutex<()>,
}

impl<S: GroupStore> AssignmentService<S> {
    /// Build the service, loading the group index from the store.
    ///
    /// Fails if the store cannot list its groups; a service without a
    /// loaded index must not serve assignments.
    pub fn new(store: S, config: AssignmentConfig) -> Result<Self> {
        let index = GroupIndex::initialize(&store)?;
        tracing::info!(
            threshold = config.match_threshold,
            consistency = ?config.consistency,
            "Assignment service ready"
        );
        Ok(Self {
            store,
            index,
            matcher: GroupMatcher::new(config.match_threshold),
            consistency: config.consistency,
            creation_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &GroupIndex {
        &self.index
    }

    pub fn matcher(&self) -> &GroupMatcher {
        &self.matcher
    }

    pub fn consistency(&self) -> ConsistencyMode {
        self.consistency
    }

    /// Register a user and assign them to a group.
    ///
    /// The user is created first. If the assignment then fails, the user
    /// stays registered without a group and the error is returned.
    pub fn signup(&self, attributes: Vec<String>) -> Result<User> {
        // Reject bad input before anything is written.
        AttributeSet::parse(attributes.iter().cloned())?;

        let id = self.store.create_user(attributes.clone())?;
        tracing::debug!(user = %id, "User created");

        match self.assign_user(id, &attributes) {
            Ok(group_id) => Ok(User {
                id,
                attributes,
                group_id: Some(group_id),
            }),
            Err(e) => {
                tracing::warn!(user = %id, error = %e, "User registered but not assigned");
                Err(e)
            }
        }
    }

    /// Assign an existing user to the best-matching group for `attributes`,
    /// creating a group when none matches.
    ///
    /// Attributes that differ from the ones stored with the user replace
    /// them before matching, so a later [`reassign_user`](Self::reassign_user)
    /// matches on the same attributes.
    ///
    /// Returns once the assignment is durably recorded. Safe to re-run after
    /// a failure: the retry matches against whatever groups now exist.
    pub fn assign_user(&self, user: UserId, attributes: &[String]) -> Result<GroupId> {
        let candidate = AttributeSet::parse(attributes.iter().cloned())?;

        // No groups for phantom users.
        let record = self.store.get_user(user)?;
        if record.attributes != attributes {
            self.store.set_user_attributes(user, attributes.to_vec())?;
            tracing::debug!(user = %user, "User attributes replaced");
        }

        let group = self.resolve_group(&candidate)?;

        if let Err(e) = self.store.set_user_group(user, group) {
            tracing::error!(user = %user, group = %group, error = %e, "Failed to record assignment");
            return Err(e);
        }
        tracing::info!(user = %user, group = %group, "User assigned");
        Ok(group)
    }

    /// Re-run the assignment using the attributes stored with the user.
    pub fn reassign_user(&self, user: UserId) -> Result<GroupId> {
        let record = self.store.get_user(user)?;
        self.assign_user(user, &record.attributes)
    }

    /// The group currently recorded for a user.
    pub fn get_group_for_user(&self, user: UserId) -> Result<Group> {
        let record = self.store.get_user(user)?;
        let group = record
            .group_id
            .ok_or(Error::Unassigned(user))?;
        self.store.get_group(group)
    }

    /// Best existing group for `candidate`, or a newly created one.
    fn resolve_group(&self, candidate: &AttributeSet) -> Result<GroupId> {
        if let Some(id) = self.find_match(candidate, &self.index.snapshot()) {
            return Ok(id);
        }

        match self.consistency {
            ConsistencyMode::Optimistic => self.create_group(candidate),
            ConsistencyMode::Serialized => {
                let _guard = self
                    .creation_lock
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                // Someone may have created a suitable group while we waited.
                if let Some(id) = self.find_match(candidate, &self.index.snapshot()) {
                    return Ok(id);
                }
                self.create_group(candidate)
            }
        }
    }

    fn find_match(&self, candidate: &AttributeSet, snapshot: &Snapshot) -> Option<GroupId> {
        let found = self.matcher.find_best(candidate, snapshot);
        match found {
            Some(id) => tracing::debug!(group = %id, groups = snapshot.len(), "Matched existing group"),
            None => tracing::debug!(groups = snapshot.len(), "No group met the threshold"),
        }
        found
    }

    /// The single creation path: durable write first, then the index.
    fn create_group(&self, attributes: &AttributeSet) -> Result<GroupId> {
        let id = self.store.create_group(attributes).map_err(|e| {
            tracing::error!(error = %e, "Failed to create group");
            e
        })?;
        self.index.insert(id, attributes.clone());
        tracing::info!(group = %id, attributes = attributes.len(), "Created group");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, Operation};
    use std::sync::Arc;
    use std::thread;

    fn tokens(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    fn setup(config: AssignmentConfig) -> (Arc<MemoryStore>, AssignmentService<Arc<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let service = AssignmentService::new(Arc::clone(&store), config).unwrap();
        (store, service)
    }

    fn index_ids<S: GroupStore>(service: &AssignmentService<S>) -> Vec<GroupId> {
        service.index().snapshot().ids().collect()
    }

    fn store_ids(store: &MemoryStore) -> Vec<GroupId> {
        store.list_groups().unwrap().iter().map(|g| g.id).collect()
    }

    #[test]
    fn similar_users_share_a_group() {
        let (_, service) = setup(AssignmentConfig::default());

        let first = service.signup(tokens(&["x", "y", "z"])).unwrap();
        let group = first.group_id.unwrap();
        assert_eq!(
            service.get_group_for_user(first.id).unwrap().attributes,
            AttributeSet::new(["x", "y", "z"])
        );

        let second = service.signup(tokens(&["x", "y", "z", "w"])).unwrap();
        assert_eq!(second.group_id, Some(group));
        assert_eq!(service.index().len(), 1);
    }

    #[test]
    fn no_match_creates_exactly_one_group_with_input_attributes() {
        let (store, service) = setup(AssignmentConfig::default());
        service.signup(tokens(&["a", "b", "c"])).unwrap();

        let user = service.signup(tokens(&["a", "b", "q", "r", "q"])).unwrap();
        let groups = store.list_groups().unwrap();
        assert_eq!(groups.len(), 2);

        let created = store.get_group(user.group_id.unwrap()).unwrap();
        assert_eq!(created.attributes, AttributeSet::new(["a", "b", "q", "r"]));
        // Raw attributes are kept on the user.
        assert_eq!(store.get_user(user.id).unwrap().attributes, tokens(&["a", "b", "q", "r", "q"]));
    }

    #[test]
    fn picks_highest_overlap_then_earliest() {
        let store = Arc::new(MemoryStore::new());
        store.create_group(&AttributeSet::new(["a", "b", "x1", "x2"])).unwrap();
        let service = AssignmentService::new(Arc::clone(&store), AssignmentConfig::default()).unwrap();

        // Overlap 2 with the first group, so this creates a second one.
        let b = service.signup(tokens(&["a", "b", "c", "d"])).unwrap().group_id.unwrap();
        let c_attrs = AttributeSet::new(["a", "b", "c", "d", "y"]);
        let c = store.create_group(&c_attrs).unwrap();
        service.index().insert(c, c_attrs);

        // Scores: 2, 4, 4.
        let user = service.signup(tokens(&["a", "b", "c", "d", "e"])).unwrap();
        assert_eq!(user.group_id, Some(b));
    }

    #[test]
    fn threshold_comes_from_config() {
        let strict = AssignmentConfig {
            match_threshold: 4,
            ..AssignmentConfig::default()
        };
        let (store, service) = setup(strict);
        service.signup(tokens(&["x", "y", "z"])).unwrap();
        service.signup(tokens(&["x", "y", "z", "w"])).unwrap();
        assert_eq!(store.list_groups().unwrap().len(), 2);
    }

    #[test]
    fn get_group_is_stable_across_reads() {
        let (_, service) = setup(AssignmentConfig::default());
        let user = service.signup(tokens(&["a", "b", "c"])).unwrap();
        let first = service.get_group_for_user(user.id).unwrap();
        for _ in 0..3 {
            assert_eq!(service.get_group_for_user(user.id).unwrap(), first);
        }
    }

    #[test]
    fn lookups_for_missing_records_are_not_found() {
        let (store, service) = setup(AssignmentConfig::default());
        assert!(matches!(
            service.get_group_for_user(UserId(1)),
            Err(Error::UserNotFound(UserId(1)))
        ));

        let unassigned = store.create_user(tokens(&["a"])).unwrap();
        assert!(matches!(
            service.get_group_for_user(unassigned),
            Err(Error::Unassigned(id)) if id == unassigned
        ));
    }

    #[test]
    fn phantom_user_creates_nothing() {
        let (store, service) = setup(AssignmentConfig::default());
        let err = service.assign_user(UserId(77), &tokens(&["a", "b", "c"])).unwrap_err();
        assert!(matches!(err, Error::UserNotFound(UserId(77))));
        assert!(store.list_groups().unwrap().is_empty());
        assert!(service.index().is_empty());
    }

    #[test]
    fn blank_attributes_are_rejected_before_writes() {
        let (store, service) = setup(AssignmentConfig::default());
        let err = service.signup(tokens(&["a", " "])).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(matches!(store.get_user(UserId(1)), Err(Error::UserNotFound(_))));
    }

    #[test]
    fn failed_group_creation_leaves_index_untouched() {
        let (store, service) = setup(AssignmentConfig::default());
        let user = store.create_user(tokens(&["a", "b", "c"])).unwrap();
        store.fail_next(Operation::CreateGroup);

        let err = service.assign_user(user, &tokens(&["a", "b", "c"])).unwrap_err();
        assert!(err.is_retryable());
        assert!(service.index().is_empty());
        assert_eq!(store.get_user(user).unwrap().group_id, None);

        let group = service.assign_user(user, &tokens(&["a", "b", "c"])).unwrap();
        assert_eq!(index_ids(&service), vec![group]);
    }

    #[test]
    fn failed_user_update_keeps_group_and_retry_reuses_it() {
        let (store, service) = setup(AssignmentConfig::default());
        let user = store.create_user(tokens(&["a", "b", "c"])).unwrap();
        store.fail_next(Operation::SetUserGroup);

        assert!(service.reassign_user(user).unwrap_err().is_retryable());
        assert_eq!(store.get_user(user).unwrap().group_id, None);
        assert_eq!(store.list_groups().unwrap().len(), 1);
        assert_eq!(index_ids(&service), store_ids(&store));

        let group = service.reassign_user(user).unwrap();
        assert_eq!(store.list_groups().unwrap().len(), 1);
        assert_eq!(store.get_user(user).unwrap().group_id, Some(group));
    }

    #[test]
    fn unavailable_store_prevents_startup() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = AssignmentService::new(store, AssignmentConfig::default()).err().unwrap();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[test]
    fn existing_groups_are_matched_after_restart() {
        let store = Arc::new(MemoryStore::new());
        let first = AssignmentService::new(Arc::clone(&store), AssignmentConfig::default()).unwrap();
        let group = first.signup(tokens(&["x", "y", "z"])).unwrap().group_id;
        drop(first);

        let second = AssignmentService::new(Arc::clone(&store), AssignmentConfig::default()).unwrap();
        assert_eq!(second.signup(tokens(&["z", "y", "x"])).unwrap().group_id, group);
    }

    #[test]
    fn concurrent_creations_keep_index_and_store_in_step() {
        let (store, service) = setup(AssignmentConfig::default());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    let attrs = vec![format!("{}-a", i), format!("{}-b", i), format!("{}-c", i)];
                    service.signup(attrs).unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(service.index().len(), 16);
        assert_eq!(index_ids(&service), store_ids(&store));
    }

    #[test]
    fn serialized_mode_creates_one_group_for_identical_users() {
        let config = AssignmentConfig {
            consistency: ConsistencyMode::Serialized,
            ..AssignmentConfig::default()
        };
        let (store, service) = setup(config);
        let service = Arc::new(service);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.signup(tokens(&["a", "b", "c"])).unwrap().group_id)
            })
            .collect();
        let groups: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.list_groups().unwrap().len(), 1);
        assert!(groups.iter().all(|g| *g == groups[0]));
    }

    #[test]
    fn optimistic_mode_never_drifts_from_store() {
        let (store, service) = setup(AssignmentConfig::default());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.signup(tokens(&["a", "b", "c"])).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Duplicates may appear under contention, but never phantoms.
        assert!(!store.list_groups().unwrap().is_empty());
        assert_eq!(index_ids(&service), store_ids(&store));
    }

    #[test]
    fn explicit_attributes_are_kept_for_later_reassignment() {
        let (store, service) = setup(AssignmentConfig::default());
        let user = service.signup(tokens(&["a", "b", "c"])).unwrap();
        let moved = service.assign_user(user.id, &tokens(&["p", "q", "r"])).unwrap();
        assert_ne!(Some(moved), user.group_id);
        assert_eq!(store.get_user(user.id).unwrap().attributes, tokens(&["p", "q", "r"]));

        // Re-running from stored attributes keeps the new group.
        assert_eq!(service.reassign_user(user.id).unwrap(), moved);
        assert_eq!(store.list_groups().unwrap().len(), 2);
    }

    #[test]
    fn failed_attribute_update_changes_nothing() {
        let (store, service) = setup(AssignmentConfig::default());
        let user = service.signup(tokens(&["a", "b", "c"])).unwrap();
        store.fail_next(Operation::SetUserAttributes);

        assert!(service.assign_user(user.id, &tokens(&["p", "q", "r"])).unwrap_err().is_retryable());
        let record = store.get_user(user.id).unwrap();
        assert_eq!(record.attributes, tokens(&["a", "b", "c"]));
        assert_eq!(record.group_id, user.group_id);
        assert_eq!(store.list_groups().unwrap().len(), 1);
    }

    #[test]
    fn consistency_mode_parses() {
        assert_eq!("Serialized".parse::<ConsistencyMode>().unwrap(), ConsistencyMode::Serialized);
        assert_eq!(" optimistic ".parse::<ConsistencyMode>().unwrap(), ConsistencyMode::Optimistic);
        assert!("linearizable".parse::<ConsistencyMode>().is_err());
    }
}
