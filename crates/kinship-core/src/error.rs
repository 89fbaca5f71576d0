//! Error types for group assignment.

use crate::model::{GroupId, UserId};
use thiserror::Error;

/// Result type for Kinship operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assigning users to groups.
///
/// A matcher finding no suitable group is not an error; see
/// [`GroupMatcher::find_best`](crate::GroupMatcher::find_best).
#[derive(Debug, Error)]
pub enum Error {
    /// User id does not exist
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Group id does not exist
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    /// User exists but no group has been recorded for them
    #[error("User {0} has no group")]
    Unassigned(UserId),

    /// Durable store unreachable or failed an I/O operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored record could not be decoded
    #[error("Corrupted record: {0}")]
    Corrupted(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the caller may safely retry the failed operation.
    ///
    /// Only store outages qualify: re-running an assignment after one
    /// re-matches against whatever the store now holds.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Whether a lookup failed because a user or group is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::UserNotFound(_) | Error::GroupNotFound(_) | Error::Unassigned(_)
        )
    }
}
