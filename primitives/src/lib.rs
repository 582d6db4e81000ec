//! `corevm-primitives`: foundational types for the corevm execution layer.
//!
//! This crate provides the canonical types, error taxonomy, gas schedule and
//! gas pool, cryptographic operations, log bloom, undo journal, Merkle
//! commitment and wire codec shared by the dispatcher and the block
//! executor in `corevm-engine`.

pub mod types;
pub mod error;
pub mod gas;
pub mod block;
pub mod receipt;
pub mod bloom;
pub mod crypto;
pub mod journal;
pub mod merkle;
pub mod codec;

// Re-export commonly used types at the crate root for convenience.
pub use types::{Address, BlockNumber, Hash, Wei, EMPTY_CODE_HASH, ZERO_ADDRESS, ZERO_HASH};
pub use error::{BlockError, CodecError, GasPoolError, TxError, VmError};
pub use gas::GasPool;
pub use block::{Block, BlockHeader, SignedTransaction};
pub use receipt::{Log, Receipt, ReceiptStatus};
pub use bloom::Bloom;
pub use journal::{Journal, Snapshot};
pub use merkle::MerkleTree;
