//! Attribute sets and their signatures.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A set of attribute tokens.
///
/// Order of construction is irrelevant and duplicates collapse, so two sets
/// built from `["a", "b", "a"]` and `["b", "a"]` are equal. Tokens iterate
/// (and serialize) in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeSet<String>);

impl AttributeSet {
    /// Build a set from raw tokens, accepting anything.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    /// Build a set from caller-supplied tokens, rejecting blank ones.
    pub fn parse<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for token in tokens {
            let token = token.into();
            if token.trim().is_empty() {
                return Err(Error::InvalidInput("attribute tokens must not be blank".into()));
            }
            set.insert(token);
        }
        Ok(Self(set))
    }

    /// Number of tokens present in both sets.
    pub fn intersection_size(&self, other: &AttributeSet) -> usize {
        // Walk the smaller set, look up in the larger.
        let (small, large) = if self.0.len() <= other.0.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        small.iter().filter(|token| large.contains(*token)).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    /// Tokens in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Stable digest of the set contents.
    ///
    /// Tokens are length-prefixed so `["ab", "c"]` and `["a", "bc"]` hash
    /// differently.
    pub fn signature(&self) -> Signature {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"kinship-attributes:");
        for token in &self.0 {
            hasher.update(&(token.len() as u64).to_be_bytes());
            hasher.update(token.as_bytes());
        }
        Signature(*hasher.finalize().as_bytes())
    }
}

impl<S: Into<String>> FromIterator<S> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// A 32-byte Blake3 digest identifying an attribute set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 32]);

impl Signature {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 hex chars
        write!(f, "{}...", &self.to_hex()[..8])
    }
}
