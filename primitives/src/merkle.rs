//! Binary Merkle commitment over sorted key-value pairs.
//!
//! Given the same set of entries, `root()` always returns the same hash
//! regardless of insertion order. The world state uses one tree per
//! account's storage and one over all accounts to produce its state root.

use std::collections::BTreeMap;

use crate::crypto::hash_blake3;
use crate::types::{Hash, ZERO_HASH};

/// Domain separator for leaf nodes.
const LEAF_PREFIX: u8 = 0x00;
/// Domain separator for internal nodes.
const INTERNAL_PREFIX: u8 = 0x01;

/// Merkle tree over byte keys, kept sorted by a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MerkleTree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a key-value pair.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        self.entries.insert(key.to_vec(), value.to_vec());
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute the Merkle root.
    ///
    /// Empty tree returns `ZERO_HASH`; a single entry returns its leaf hash.
    pub fn root(&self) -> Hash {
        let mut level: Vec<Hash> = self
            .entries
            .iter()
            .map(|(k, v)| hash_leaf(k, v))
            .collect();
        if level.is_empty() {
            return ZERO_HASH;
        }

        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_internal(left, right),
                    // Odd element: promote to next level
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
        }
        level[0]
    }
}

impl<K: AsRef<[u8]>, V: AsRef<[u8]>> FromIterator<(K, V)> for MerkleTree {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        for (k, v) in iter {
            tree.insert(k.as_ref(), v.as_ref());
        }
        tree
    }
}

/// Hash a leaf node: H(LEAF_PREFIX || key_len_le32 || key || value)
fn hash_leaf(key: &[u8], value: &[u8]) -> Hash {
    let key_len = (key.len() as u32).to_le_bytes();
    let mut data = Vec::with_capacity(1 + 4 + key.len() + value.len());
    data.push(LEAF_PREFIX);
    data.extend_from_slice(&key_len);
    data.extend_from_slice(key);
    data.extend_from_slice(value);
    hash_blake3(&data)
}

/// Hash an internal node: H(INTERNAL_PREFIX || left || right)
fn hash_internal(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 1 + 32 + 32];
    data[0] = INTERNAL_PREFIX;
    data[1..33].copy_from_slice(left);
    data[33..65].copy_from_slice(right);
    hash_blake3(&data)
}
