//! 2048-bit log bloom filter.
//!
//! Every log contributes its emitting address and each of its topics. Each
//! item sets three bits chosen from the first six bytes of its Keccak-256
//! hash.

use crate::crypto::keccak256;
use crate::receipt::{Log, Receipt};

/// Size of a bloom in bytes.
pub const BLOOM_BYTE_LENGTH: usize = 256;

/// Probabilistic membership summary over log addresses and topics.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bloom(pub [u8; BLOOM_BYTE_LENGTH]);

impl Bloom {
    /// An empty bloom.
    pub const fn empty() -> Self {
        Self([0u8; BLOOM_BYTE_LENGTH])
    }

    /// Add an arbitrary item (address or topic bytes).
    pub fn accrue(&mut self, item: &[u8]) {
        for (index, mask) in bloom_bits(item) {
            self.0[index] |= mask;
        }
    }

    /// Add a log's address and topics.
    pub fn accrue_log(&mut self, log: &Log) {
        self.accrue(&log.address);
        for topic in &log.topics {
            self.accrue(topic);
        }
    }

    /// Merge another bloom into this one.
    pub fn accrue_bloom(&mut self, other: &Self) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a |= *b;
        }
    }

    /// Returns true if `item` may have been added. False positives are
    /// possible, false negatives are not.
    pub fn contains(&self, item: &[u8]) -> bool {
        bloom_bits(item)
            .iter()
            .all(|(index, mask)| self.0[*index] & mask == *mask)
    }

    /// Returns true if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Self::empty()
    }
}

impl core::fmt::Debug for Bloom {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Bloom({})", crate::types::to_hex(&self.0))
    }
}

/// Byte index and bit mask for the three bits selected by `item`.
fn bloom_bits(item: &[u8]) -> [(usize, u8); 3] {
    let hash = keccak256(item);
    let mut bits = [(0usize, 0u8); 3];
    for (i, slot) in bits.iter_mut().enumerate() {
        let bit = ((usize::from(hash[2 * i]) << 8) | usize::from(hash[2 * i + 1])) & 2047;
        *slot = (BLOOM_BYTE_LENGTH - 1 - bit / 8, 1u8 << (bit % 8));
    }
    bits
}

/// Fold the logs of all receipts into one bloom.
pub fn create_bloom(receipts: &[Receipt]) -> Bloom {
    let mut bloom = Bloom::empty();
    for receipt in receipts {
        for log in &receipt.logs {
            bloom.accrue_log(log);
        }
    }
    bloom
}

/// Fold a list of logs into one bloom.
pub fn logs_bloom(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::empty();
    for log in logs {
        bloom.accrue_log(log);
    }
    bloom
}
