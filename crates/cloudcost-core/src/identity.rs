//! Row identity for pivot rows
//!
//! Records are merged into the same pivot row when their key ids hash to the
//! same [`RowId`]. Display values never take part in the identity.

use crate::types::ItemKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest identifying one pivot row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the row identity of a key sequence
///
/// Any `Fn(&[ItemKey]) -> RowId` closure is a hasher.
pub trait KeysHasher: Send + Sync {
    fn hash_keys(&self, keys: &[ItemKey]) -> RowId;
}

impl<F> KeysHasher for F
where
    F: Fn(&[ItemKey]) -> RowId + Send + Sync,
{
    fn hash_keys(&self, keys: &[ItemKey]) -> RowId {
        self(keys)
    }
}

/// blake3 over the ordered key ids, each prefixed with its byte length
///
/// # Examples
///
/// ```
/// use cloudcost_core::identity::{DefaultKeysHasher, KeysHasher};
/// use cloudcost_core::types::ItemKey;
///
/// let a = DefaultKeysHasher.hash_keys(&[ItemKey::new("a-b", "x"), ItemKey::from_id("c")]);
/// let b = DefaultKeysHasher.hash_keys(&[ItemKey::from_id("a"), ItemKey::from_id("b-c")]);
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeysHasher;

impl KeysHasher for DefaultKeysHasher {
    fn hash_keys(&self, keys: &[ItemKey]) -> RowId {
        let mut hasher = blake3::Hasher::new();
        for key in keys {
            hasher.update(&(key.id.len() as u64).to_le_bytes());
            hasher.update(key.id.as_bytes());
        }
        RowId(hasher.finalize().to_hex().to_string())
    }
}

/// Identity over the first `len` keys only, merging rows that differ past them
#[derive(Debug, Clone, Copy)]
pub struct PrefixKeysHasher {
    pub len: usize,
}

impl PrefixKeysHasher {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl KeysHasher for PrefixKeysHasher {
    fn hash_keys(&self, keys: &[ItemKey]) -> RowId {
        let len = self.len.min(keys.len());
        DefaultKeysHasher.hash_keys(&keys[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ids: &[&str]) -> Vec<ItemKey> {
        ids.iter().map(|id| ItemKey::from_id(*id)).collect()
    }

    #[test]
    fn test_display_values_do_not_matter() {
        let a = DefaultKeysHasher.hash_keys(&[ItemKey::new("123", "Production")]);
        let b = DefaultKeysHasher.hash_keys(&[ItemKey::new("123", "prod (renamed)")]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_key_order_matters() {
        let a = DefaultKeysHasher.hash_keys(&keys(&["EC2", "us-east-1"]));
        let b = DefaultKeysHasher.hash_keys(&keys(&["us-east-1", "EC2"]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_containing_separators_stay_distinct() {
        let a = DefaultKeysHasher.hash_keys(&keys(&["a-b", "c"]));
        let b = DefaultKeysHasher.hash_keys(&keys(&["a", "b-c"]));
        let c = DefaultKeysHasher.hash_keys(&keys(&["a-b-c"]));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_prefix_hasher_ignores_trailing_keys() {
        let hasher = PrefixKeysHasher::new(1);
        assert_eq!(
            hasher.hash_keys(&keys(&["EC2", "us-east-1"])),
            hasher.hash_keys(&keys(&["EC2", "eu-west-1"]))
        );
        assert_eq!(
            hasher.hash_keys(&keys(&["EC2"])),
            DefaultKeysHasher.hash_keys(&keys(&["EC2"]))
        );
        assert_eq!(
            PrefixKeysHasher::new(5).hash_keys(&keys(&["EC2"])),
            DefaultKeysHasher.hash_keys(&keys(&["EC2"]))
        );
    }

    #[test]
    fn test_closure_hasher() {
        let by_display = |keys: &[ItemKey]| {
            RowId::new(
                keys.iter()
                    .map(|k| k.display.to_lowercase())
                    .collect::<Vec<_>>()
                    .join("/"),
            )
        };
        let a = by_display.hash_keys(&[ItemKey::new("1", "Web")]);
        let b = by_display.hash_keys(&[ItemKey::new("2", "web")]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "web");
    }
}
