//! Kinship Core - attribute-based group assignment
//!
//! Places each new user into the existing group that shares the most
//! attributes with them, or into a fresh group when nothing overlaps enough.
//!
//! # Components
//!
//! - [`AttributeSet`]: set of attribute tokens with overlap counting
//! - [`GroupStore`]: durable storage trait for users and groups
//! - [`GroupIndex`]: in-memory cache of every group's attributes
//! - [`GroupMatcher`]: picks the best group from an index [`Snapshot`]
//! - [`AssignmentService`]: signup, assignment and group lookup
//!
//! # Matching
//!
//! A group's score is the size of its intersection with the user's
//! attributes. Groups scoring below the threshold (default 3) never match.
//! The highest score wins and ties go to the oldest group.
//!
//! # Example
//!
//! ```
//! use kinship_core::{AssignmentConfig, AssignmentService, MemoryStore};
//!
//! let service = AssignmentService::new(MemoryStore::new(), AssignmentConfig::default())?;
//! let alice = service.signup(vec!["x".into(), "y".into(), "z".into()])?;
//! let bob = service.signup(vec!["x".into(), "y".into(), "z".into(), "w".into()])?;
//! assert_eq!(alice.group_id, bob.group_id);
//! # Ok::<(), kinship_core::Error>(())
//! ```

mod attributes;
mod error;
mod index;
mod matcher;
mod memory;
mod model;
mod service;
mod store;

pub use attributes::{AttributeSet, Signature};
pub use error::{Error, Result};
pub use index::{GroupIndex, InsertOutcome, Snapshot};
pub use matcher::{GroupMatcher, DEFAULT_MATCH_THRESHOLD};
pub use memory::{MemoryStore, Operation};
pub use model::{Group, GroupId, User, UserId};
pub use service::{AssignmentConfig, AssignmentService, ConsistencyMode};
pub use store::GroupStore;
