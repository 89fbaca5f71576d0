//! Persistent storage using RocksDB.
//!
//! Key layout:
//! - `group:{id:020}` → JSON [`Group`]
//! - `user:{id:020}` → JSON [`User`]
//! - `seq:group`, `seq:user` → last issued id (big-endian u64)
//! - `node:signing_key` → 32-byte ed25519 secret
//!
//! Ids are zero-padded so prefix iteration yields ascending id order.

use ed25519_dalek::SigningKey;
use kinship_core::{AttributeSet, Error, Group, GroupId, GroupStore, Result, User, UserId};
use rand::RngCore;
use rocksdb::{Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const GROUP_PREFIX: &str = "group:";
const USER_PREFIX: &str = "user:";
const GROUP_SEQ: &[u8] = b"seq:group";
const USER_SEQ: &[u8] = b"seq:user";
const NODE_KEY: &[u8] = b"node:signing_key";

fn unavailable(e: rocksdb::Error) -> Error {
    Error::StoreUnavailable(e.to_string())
}

fn group_key(id: GroupId) -> String {
    format!("{}{:020}", GROUP_PREFIX, id.0)
}

fn user_key(id: UserId) -> String {
    format!("{}{:020}", USER_PREFIX, id.0)
}

fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::Corrupted(format!("{}: {}", key, e)))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Corrupted(e.to_string()))
}

/// Storage backend for Kinship data.
pub struct Storage {
    db: DB,
    /// Serializes id allocation so each counter bump pairs with one record.
    sequence_lock: Mutex<()>,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(unavailable)?;
        Ok(Self {
            db,
            sequence_lock: Mutex::new(()),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key.as_bytes()).map_err(unavailable)? {
            Some(data) => Ok(Some(decode(key, &data)?)),
            None => Ok(None),
        }
    }

    fn last_id(&self, counter: &[u8]) -> Result<u64> {
        match self.db.get(counter).map_err(unavailable)? {
            Some(data) => {
                let bytes: [u8; 8] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Corrupted("invalid id counter".into()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Allocate the next id from `counter` and write it with the record
    /// built for it, atomically.
    fn insert_with_next_id<F>(&self, counter: &[u8], build: F) -> Result<u64>
    where
        F: FnOnce(u64) -> Result<(String, Vec<u8>)>,
    {
        let _guard = self.sequence_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.last_id(counter)? + 1;
        let (key, value) = build(id)?;

        let mut batch = WriteBatch::default();
        batch.put(counter, id.to_be_bytes());
        batch.put(key.as_bytes(), value);
        self.db.write(batch).map_err(unavailable)?;
        Ok(id)
    }

    // --- Node Identity ---

    /// Get or create the node's signing key (persistent identity).
    pub fn get_or_create_node_key(&self) -> Result<SigningKey> {
        if let Some(data) = self.db.get(NODE_KEY).map_err(unavailable)? {
            // Load existing key
            let bytes: [u8; 32] = data
                .as_slice()
                .try_into()
                .map_err(|_| Error::Corrupted("invalid stored node key".into()))?;
            return Ok(SigningKey::from_bytes(&bytes));
        }

        // Generate new key and persist it
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        self.db.put(NODE_KEY, secret).map_err(unavailable)?;
        Ok(SigningKey::from_bytes(&secret))
    }

    /// Write a user record as-is, skipping the group existence check.
    #[cfg(test)]
    pub(crate) fn put_user_unchecked(&self, user: &User) -> Result<()> {
        self.db
            .put(user_key(user.id).as_bytes(), encode(user)?)
            .map_err(unavailable)
    }
}

impl GroupStore for Storage {
    fn create_group(&self, attributes: &AttributeSet) -> Result<GroupId> {
        let id = self.insert_with_next_id(GROUP_SEQ, |id| {
            let group = Group::new(GroupId(id), attributes.clone());
            Ok((group_key(group.id), encode(&group)?))
        })?;
        Ok(GroupId(id))
    }

    fn get_group(&self, id: GroupId) -> Result<Group> {
        self.get_json(&group_key(id))?
            .ok_or(Error::GroupNotFound(id))
    }

    fn list_groups(&self) -> Result<Vec<Group>> {
        let prefix = GROUP_PREFIX.as_bytes();
        let mut groups = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item.map_err(unavailable)?;
            if key.starts_with(prefix) {
                let group: Group = decode(&String::from_utf8_lossy(&key), &value)?;
                groups.push(group);
            } else {
                break;
            }
        }

        Ok(groups)
    }

    fn set_user_group(&self, user: UserId, group: GroupId) -> Result<()> {
        if self.db.get(group_key(group).as_bytes()).map_err(unavailable)?.is_none() {
            return Err(Error::GroupNotFound(group));
        }
        let mut record = self.get_user(user)?;
        record.group_id = Some(group);
        self.db
            .put(user_key(user).as_bytes(), encode(&record)?)
            .map_err(unavailable)
    }

    fn set_user_attributes(&self, user: UserId, attributes: Vec<String>) -> Result<()> {
        let mut record = self.get_user(user)?;
        record.attributes = attributes;
        self.db
            .put(user_key(user).as_bytes(), encode(&record)?)
            .map_err(unavailable)
    }

    fn get_user(&self, id: UserId) -> Result<User> {
        self.get_json(&user_key(id))?
            .ok_or(Error::UserNotFound(id))
    }

    fn create_user(&self, attributes: Vec<String>) -> Result<UserId> {
        let id = self.insert_with_next_id(USER_SEQ, |id| {
            let user = User::new(UserId(id), attributes);
            Ok((user_key(user.id), encode(&user)?))
        })?;
        Ok(UserId(id))
    }
}
