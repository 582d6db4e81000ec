//! Block executor: applies a block's transactions in order.
//!
//! `BlockExecutor::execute_block` implements the block lifecycle:
//!
//! 1. Validate the header
//! 2. For each transaction, in block order:
//!    a. attribute logs to it (`StateDb::prepare`)
//!    b. apply it with the shared gas pool
//!    c. collect its receipt and logs
//! 3. Run the consensus engine's finalisation (block rewards)
//! 4. Compute the state root
//!
//! **Atomicity:** a pre-flight transaction error aborts the block with
//! `BlockError::Transaction`; the caller must discard the state. A failed
//! top-level frame only produces a failed receipt and the block goes on.

use corevm_primitives::{
    Address, Block, BlockError, BlockHeader, GasPool, Hash, Log, Receipt, SignedTransaction, Wei,
};

use crate::context::BlockHashes;
use crate::evm::EvmEnv;
use crate::state::StateDb;
use crate::transaction::apply_transaction;
use crate::validation::validate_header;

/// Consensus-specific state changes applied after the last transaction.
pub trait ConsensusEngine {
    fn finalize(
        &self,
        state: &mut dyn StateDb,
        header: &BlockHeader,
        transactions: &[SignedTransaction],
        receipts: &[Receipt],
    );
}

/// Engine without block rewards.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEngine;

impl ConsensusEngine for NoopEngine {
    fn finalize(
        &self,
        _state: &mut dyn StateDb,
        _header: &BlockHeader,
        _transactions: &[SignedTransaction],
        _receipts: &[Receipt],
    ) {
    }
}

/// Engine crediting a fixed reward to the block's coinbase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRewardEngine {
    pub reward: Wei,
}

impl FixedRewardEngine {
    pub fn new(reward: Wei) -> Self {
        Self { reward }
    }
}

impl ConsensusEngine for FixedRewardEngine {
    fn finalize(
        &self,
        state: &mut dyn StateDb,
        header: &BlockHeader,
        _transactions: &[SignedTransaction],
        _receipts: &[Receipt],
    ) {
        state.add_balance(header.coinbase, self.reward);
        tracing::trace!(coinbase = ?header.coinbase, reward = %self.reward, "block reward");
    }
}

/// Everything a block produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    /// One receipt per transaction, in block order.
    pub receipts: Vec<Receipt>,
    /// All logs of the block, in emission order.
    pub logs: Vec<Log>,
    /// Gas used by all transactions.
    pub gas_used: u64,
    /// State root after finalisation.
    pub state_root: Hash,
}

/// Applies blocks against a world state.
#[derive(Debug, Clone)]
pub struct BlockExecutor<E> {
    env: EvmEnv,
    engine: E,
    author: Option<Address>,
}

impl<E: ConsensusEngine> BlockExecutor<E> {
    pub fn new(env: EvmEnv, engine: E) -> Self {
        Self {
            env,
            engine,
            author: None,
        }
    }

    /// Pay transaction fees to `author` instead of each header's coinbase.
    pub fn with_author(mut self, author: Address) -> Self {
        self.author = Some(author);
        self
    }

    pub fn env(&self) -> &EvmEnv {
        &self.env
    }

    /// Execute all transactions of `block` against `state`.
    pub fn execute_block(
        &self,
        block: &Block,
        state: &mut dyn StateDb,
        block_hashes: &dyn BlockHashes,
    ) -> Result<BlockOutcome, BlockError> {
        let header = &block.header;
        validate_header(header)?;

        let mut gas_pool = GasPool::new(header.gas_limit);
        let mut gas_used = 0u64;
        let mut receipts = Vec::with_capacity(block.tx_count());
        let mut logs = Vec::new();

        for (index, tx) in block.transactions.iter().enumerate() {
            state.prepare(tx.hash(), index);
            let receipt = apply_transaction(
                &self.env,
                block_hashes,
                self.author,
                &mut gas_pool,
                state,
                header,
                tx,
                &mut gas_used,
            )
            .map_err(|source| {
                tracing::warn!(block = header.number, index, %source, "transaction rejected");
                BlockError::Transaction { index, source }
            })?;
            logs.extend(receipt.logs.iter().cloned());
            receipts.push(receipt);
        }

        self.engine.finalize(state, header, &block.transactions, &receipts);
        state.finalise();
        let state_root = state.state_root();

        tracing::debug!(block = header.number, txs = block.tx_count(), gas_used, "executed block");
        Ok(BlockOutcome {
            receipts,
            logs,
            gas_used,
            state_root,
        })
    }
}
