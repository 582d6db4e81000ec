//! Per-block execution context shared by every frame of a transaction.
//!
//! The context is built once per transaction and never modified while the
//! dispatcher runs. Balance checks, value transfers and historical block
//! hash lookups are injected so embedders can swap the policies.

use std::collections::BTreeMap;

use corevm_primitives::{Address, BlockHeader, BlockNumber, Hash, Wei, ZERO_HASH};

use crate::state::StateDb;
use crate::transaction::Message;

/// Returns true if `from` can send `amount`.
pub type CanTransferFn = fn(&dyn StateDb, &Address, Wei) -> bool;

/// Moves `amount` from `from` to `to`.
pub type TransferFn = fn(&mut dyn StateDb, Address, Address, Wei);

/// Lookup of ancestor block hashes.
pub trait BlockHashes {
    /// Hash of the canonical block at `number`, if known.
    fn block_hash(&self, number: BlockNumber) -> Option<Hash>;
}

impl BlockHashes for BTreeMap<BlockNumber, Hash> {
    fn block_hash(&self, number: BlockNumber) -> Option<Hash> {
        self.get(&number).copied()
    }
}

/// Chain history that knows no blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl BlockHashes for NoHistory {
    fn block_hash(&self, _number: BlockNumber) -> Option<Hash> {
        None
    }
}

/// Read-only environment of one transaction.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub can_transfer: CanTransferFn,
    pub transfer: TransferFn,
    pub block_hashes: &'a dyn BlockHashes,

    /// Sender of the top-level transaction.
    pub origin: Address,
    pub gas_price: Wei,

    pub coinbase: Address,
    pub gas_limit: u64,
    pub block_number: BlockNumber,
    pub time: u64,
    pub difficulty: u128,
}

impl<'a> ExecutionContext<'a> {
    /// Hash of block `number`; zero for the current block, future blocks
    /// and unknown history.
    pub fn get_hash(&self, number: BlockNumber) -> Hash {
        if number >= self.block_number {
            return ZERO_HASH;
        }
        self.block_hashes.block_hash(number).unwrap_or(ZERO_HASH)
    }
}

impl core::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("origin", &self.origin)
            .field("gas_price", &self.gas_price)
            .field("coinbase", &self.coinbase)
            .field("gas_limit", &self.gas_limit)
            .field("block_number", &self.block_number)
            .field("time", &self.time)
            .field("difficulty", &self.difficulty)
            .finish_non_exhaustive()
    }
}

/// Build the context for `msg` executing in the block described by `header`.
///
/// Fees go to `author` when given, otherwise to the header's coinbase.
pub fn new_execution_context<'a>(
    msg: &Message,
    header: &BlockHeader,
    block_hashes: &'a dyn BlockHashes,
    author: Option<Address>,
) -> ExecutionContext<'a> {
    ExecutionContext {
        can_transfer,
        transfer,
        block_hashes,
        origin: msg.from(),
        gas_price: msg.gas_price(),
        coinbase: author.unwrap_or(header.coinbase),
        gas_limit: header.gas_limit,
        block_number: header.number,
        time: header.timestamp,
        difficulty: header.difficulty,
    }
}

/// Default balance check: the balance covers `amount`.
pub fn can_transfer(state: &dyn StateDb, from: &Address, amount: Wei) -> bool {
    state.balance(from) >= amount
}

/// Default transfer: debit `from`, credit `to`.
pub fn transfer(state: &mut dyn StateDb, from: Address, to: Address, amount: Wei) {
    state.sub_balance(from, amount);
    state.add_balance(to, amount);
}
