//! Execution artifacts: logs and per-transaction receipts.

use crate::bloom::Bloom;
use crate::types::{Address, BlockNumber, Hash, ZERO_HASH};

/// A log entry emitted during contract execution.
///
/// `address`, `topics` and `data` come from the emitting code. The
/// remaining fields are filled in by the world state when the log is
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    /// Address of the contract that emitted the log.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<Hash>,
    /// Unindexed payload.
    pub data: Vec<u8>,
    /// Number of the block the log was emitted in.
    pub block_number: BlockNumber,
    /// Hash of the emitting transaction.
    pub tx_hash: Hash,
    /// Index of the emitting transaction in its block.
    pub tx_index: u32,
    /// Index of the log in the block.
    pub log_index: u32,
}

impl Log {
    /// Create a log that has not yet been attributed to a transaction.
    pub fn new(address: Address, topics: Vec<Hash>, data: Vec<u8>) -> Self {
        Self {
            address,
            topics,
            data,
            block_number: 0,
            tx_hash: ZERO_HASH,
            tx_index: 0,
            log_index: 0,
        }
    }
}

/// Outcome status stored in a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReceiptStatus {
    /// The top-level call or creation failed; state changes were reverted.
    Failed = 0,
    /// The top-level call or creation succeeded.
    Success = 1,
}

impl ReceiptStatus {
    /// Returns true if the transaction succeeded.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Per-transaction execution outcome.
///
/// Created once per included transaction and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Success or failure of the transaction.
    pub status: ReceiptStatus,
    /// Gas used by this and all preceding transactions of the block.
    pub cumulative_gas_used: u64,
    /// Gas used by this transaction alone.
    pub gas_used: u64,
    /// Logs emitted by this transaction.
    pub logs: Vec<Log>,
    /// Bloom over `logs`.
    pub bloom: Bloom,
    /// Hash of the transaction.
    pub tx_hash: Hash,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
}

impl Receipt {
    /// Create a receipt with no logs.
    pub fn new(failed: bool, cumulative_gas_used: u64) -> Self {
        Self {
            status: if failed {
                ReceiptStatus::Failed
            } else {
                ReceiptStatus::Success
            },
            cumulative_gas_used,
            gas_used: 0,
            logs: Vec::new(),
            bloom: Bloom::empty(),
            tx_hash: ZERO_HASH,
            contract_address: None,
        }
    }
}
