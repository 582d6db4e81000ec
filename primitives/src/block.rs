//! Block and transaction types.
//!
//! The executor receives blocks with decoded, signed transactions and
//! applies them sequentially against one world state.

use crate::bloom::Bloom;
use crate::codec;
use crate::crypto::hash_sha256;
use crate::types::{Address, BlockNumber, Hash, Wei};

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Hash of the parent block's header.
    pub parent_hash: Hash,
    /// Block number.
    pub number: BlockNumber,
    /// Beneficiary of transaction fees and block rewards.
    pub coinbase: Address,
    /// Maximum gas all transactions of this block may use.
    pub gas_limit: u64,
    /// Gas actually used, as claimed by the proposer.
    pub gas_used: u64,
    /// Logical block time from the header (never the OS clock).
    pub timestamp: u64,
    /// Proof-of-work difficulty exposed to contracts.
    pub difficulty: u128,
    /// State root after executing this block, as claimed by the proposer.
    pub state_root: Hash,
    /// Bloom over all receipts, as claimed by the proposer.
    pub bloom: Bloom,
}

impl BlockHeader {
    /// SHA-256 over the canonical header encoding.
    pub fn hash(&self) -> Hash {
        hash_sha256(&codec::encode_header(self))
    }
}

/// Full block with ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block metadata.
    pub header: BlockHeader,
    /// Ordered list of transactions in this block.
    pub transactions: Vec<SignedTransaction>,
}

impl Block {
    /// Returns the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Returns true if this block has no transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Hash of the block header.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

/// A signed value transfer, contract call or contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Sender account nonce this transaction consumes.
    pub nonce: u64,
    /// Price paid per unit of gas.
    pub gas_price: Wei,
    /// Maximum gas the transaction may use.
    pub gas_limit: u64,
    /// Recipient; `None` creates a contract.
    pub to: Option<Address>,
    /// Value transferred to the recipient or the new contract.
    pub value: Wei,
    /// Call input or contract init code.
    pub data: Vec<u8>,
    /// Ed25519 public key of the sender.
    pub public_key: [u8; 32],
    /// Ed25519 signature over the signing payload.
    pub signature: [u8; 64],
}

impl SignedTransaction {
    /// SHA-256 over the full wire encoding.
    pub fn hash(&self) -> Hash {
        hash_sha256(&codec::encode_transaction(self))
    }

    /// Returns true if the transaction creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Bytes covered by the signature, bound to `chain_id`.
    pub fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        codec::encode_signing_payload(self, chain_id)
    }
}
