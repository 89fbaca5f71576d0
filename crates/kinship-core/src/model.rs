//! Users and groups as held by the durable store.

use crate::attributes::AttributeSet;
use serde::{Deserialize, Serialize};

/// Store-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Store-assigned group identifier. Ids grow with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier
    pub id: UserId,

    /// Attributes exactly as submitted at signup (duplicates kept)
    pub attributes: Vec<String>,

    /// Assigned group, `None` until an assignment has been recorded
    pub group_id: Option<GroupId>,
}

impl User {
    /// Create an unassigned user.
    pub fn new(id: UserId, attributes: Vec<String>) -> Self {
        Self {
            id,
            attributes,
            group_id: None,
        }
    }

    /// The user's attributes as a set, for matching.
    pub fn attribute_set(&self) -> AttributeSet {
        AttributeSet::new(self.attributes.iter().cloned())
    }
}

/// A group of users sharing attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    /// Unique identifier
    pub id: GroupId,

    /// Canonical attribute set, fixed at creation
    pub attributes: AttributeSet,
}

impl Group {
    pub fn new(id: GroupId, attributes: AttributeSet) -> Self {
        Self { id, attributes }
    }
}
