//! The durable collaborator behind the group index.

use crate::attributes::AttributeSet;
use crate::error::Result;
use crate::model::{Group, GroupId, User, UserId};
use std::sync::Arc;

/// Durable storage for users and groups.
///
/// All methods are blocking I/O. Callers must never hold the
/// [`GroupIndex`](crate::GroupIndex) lock across a call.
///
/// Lookups of missing ids return [`Error::UserNotFound`](crate::Error::UserNotFound)
/// or [`Error::GroupNotFound`](crate::Error::GroupNotFound);
/// an unreachable backend returns
/// [`Error::StoreUnavailable`](crate::Error::StoreUnavailable).
pub trait GroupStore: Send + Sync {
    /// Durably create a group and return its new id.
    fn create_group(&self, attributes: &AttributeSet) -> Result<GroupId>;

    /// Fetch a group by id.
    fn get_group(&self, id: GroupId) -> Result<Group>;

    /// All groups, in ascending id order.
    fn list_groups(&self) -> Result<Vec<Group>>;

    /// Record `group` as the user's group, replacing any previous one.
    fn set_user_group(&self, user: UserId, group: GroupId) -> Result<()>;

    /// Replace the attributes recorded for a user.
    fn set_user_attributes(&self, user: UserId, attributes: Vec<String>) -> Result<()>;

    /// Fetch a user by id.
    fn get_user(&self, id: UserId) -> Result<User>;

    /// Durably create an unassigned user and return its new id.
    fn create_user(&self, attributes: Vec<String>) -> Result<UserId>;
}

impl<S: GroupStore + ?Sized> GroupStore for Arc<S> {
    fn create_group(&self, attributes: &AttributeSet) -> Result<GroupId> {
        (**self).create_group(attributes)
    }

    fn get_group(&self, id: GroupId) -> Result<Group> {
        (**self).get_group(id)
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        (**self).list_groups()
    }

    fn set_user_group(&self, user: UserId, group: GroupId) -> Result<()> {
        (**self).set_user_group(user, group)
    }

    fn set_user_attributes(&self, user: UserId, attributes: Vec<String>) -> Result<()> {
        (**self).set_user_attributes(user, attributes)
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        (**self).get_user(id)
    }

    fn create_user(&self, attributes: Vec<String>) -> Result<UserId> {
        (**self).create_user(attributes)
    }
}
