//! In-memory group index.
//!
//! A read-mostly cache of every group's attribute set, built from the
//! [`GroupStore`] at startup and extended after each durable group creation.
//! The matcher scans [`Snapshot`]s of it instead of the store.

use crate::attributes::{AttributeSet, Signature};
use crate::error::Result;
use crate::model::GroupId;
use crate::store::GroupStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Result of inserting into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New entry added.
    Inserted,
    /// New entry added, but another group already carries the same
    /// attribute set. Two requests raced past the matcher.
    DuplicateSignature { existing: GroupId },
    /// The id was already indexed; nothing changed.
    AlreadyPresent,
}

#[derive(Debug, Default)]
struct IndexState {
    groups: BTreeMap<GroupId, Arc<AttributeSet>>,
    /// First group seen for each attribute signature.
    signatures: HashMap<Signature, GroupId>,
}

impl IndexState {
    fn insert(&mut self, id: GroupId, attributes: AttributeSet) -> InsertOutcome {
        if self.groups.contains_key(&id) {
            return InsertOutcome::AlreadyPresent;
        }
        let signature = attributes.signature();
        self.groups.insert(id, Arc::new(attributes));
        match self.signatures.get(&signature) {
            Some(&existing) => InsertOutcome::DuplicateSignature { existing },
            None => {
                self.signatures.insert(signature, id);
                InsertOutcome::Inserted
            }
        }
    }
}

/// Cache mapping group id to attribute set.
///
/// There is no uninitialized state: the only constructor loads the full
/// catalog, so a store outage at startup surfaces as an error instead of an
/// empty index that would spawn duplicate groups.
///
/// Entries are never removed. Every entry corresponds to a group the store
/// acknowledged, because [`insert`](Self::insert) is only called after a
/// successful `create_group`.
#[derive(Debug)]
pub struct GroupIndex {
    state: RwLock<IndexState>,
}

impl GroupIndex {
    /// Load every group from the store.
    pub fn initialize<S: GroupStore + ?Sized>(store: &S) -> Result<Self> {
        let groups = store.list_groups()?;
        let mut state = IndexState::default();
        let mut duplicates = 0usize;
        for group in groups {
            if let InsertOutcome::DuplicateSignature { .. } = state.insert(group.id, group.attributes) {
                duplicates += 1;
            }
        }
        tracing::info!(
            groups = state.groups.len(),
            duplicates,
            "Group index initialized"
        );
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Consistent view of all entries, ordered by ascending group id.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            entries: state
                .groups
                .iter()
                .map(|(id, attrs)| (*id, Arc::clone(attrs)))
                .collect(),
        }
    }

    /// Add a group that the store has already durably created.
    pub fn insert(&self, id: GroupId, attributes: AttributeSet) -> InsertOutcome {
        // A single map insert cannot leave the state torn, so a poisoned lock
        // is still safe to use.
        let outcome = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, attributes);

        match outcome {
            InsertOutcome::DuplicateSignature { existing } => {
                tracing::warn!(
                    group = %id,
                    existing = %existing,
                    "Concurrent assignment created a group with an existing attribute set"
                );
            }
            InsertOutcome::AlreadyPresent => {
                tracing::debug!(group = %id, "Group already indexed");
            }
            InsertOutcome::Inserted => {}
        }
        outcome
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point-in-time copy of the index.
///
/// Iteration order is ascending group id, which is also creation order, so
/// tie-breaking in the matcher is reproducible.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(GroupId, Arc<AttributeSet>)>,
}

impl Snapshot {
    /// Build a snapshot with an explicit order.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (GroupId, AttributeSet)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(id, attrs)| (id, Arc::new(attrs)))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, &AttributeSet)> {
        self.entries.iter().map(|(id, attrs)| (*id, attrs.as_ref()))
    }

    pub fn ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
