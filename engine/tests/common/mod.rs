//! Shared test helpers for integration tests.
//!
//! Provides deterministic keys, block headers, funded states and a
//! dispatcher factory used across all integration test files.

#![allow(dead_code)]

use std::sync::Arc;

use corevm_engine::test_utils::{deterministic_key, key_address, ScriptInterpreter};
use corevm_engine::{
    new_execution_context, Account, ChainConfig, Evm, EvmEnv, MemoryState, Message, NoHistory,
    StateDb,
};
use corevm_primitives::{Address, BlockHeader, BlockNumber, Bloom, ZERO_HASH};

/// Chain id used by every signed transaction in the tests.
pub const CHAIN_ID: u64 = 1;

pub const COINBASE: Address = [0xC0; 20];

// ── Deterministic Keys ──

/// Alice: seed=1, stable address across all tests.
pub fn alice() -> (Address, ed25519_dalek::SigningKey) {
    let key = deterministic_key(1);
    (key_address(&key), key)
}

/// Bob: seed=2, stable address across all tests.
pub fn bob() -> (Address, ed25519_dalek::SigningKey) {
    let key = deterministic_key(2);
    (key_address(&key), key)
}

// ── Blocks and State ──

pub fn header(number: BlockNumber, gas_limit: u64) -> BlockHeader {
    BlockHeader {
        parent_hash: ZERO_HASH,
        number,
        coinbase: COINBASE,
        gas_limit,
        gas_used: 0,
        timestamp: 1_700_000_000 + number,
        difficulty: 1,
        state_root: ZERO_HASH,
        bloom: Bloom::empty(),
    }
}

/// State holding the given balances.
pub fn state_with(balances: &[(Address, u128)]) -> MemoryState {
    let mut state = MemoryState::new();
    for (address, balance) in balances {
        state.insert_account(*address, Account::with_balance(*balance));
    }
    state
}

/// Environment running `interpreter` with default limits.
pub fn env_with(interpreter: ScriptInterpreter) -> EvmEnv {
    EvmEnv::new(ChainConfig::default(), Arc::new(interpreter))
}

/// Run `f` against a dispatcher for a transaction from `origin` in block 1.
pub fn with_evm<R>(
    env: &EvmEnv,
    state: &mut dyn StateDb,
    origin: Address,
    f: impl FnOnce(&mut Evm<'_>) -> R,
) -> R {
    let header = header(1, 10_000_000);
    let msg = Message::call(origin, origin, 0, 0, 0, 0, Vec::new());
    let ctx = new_execution_context(&msg, &header, &NoHistory, None);
    let mut evm = Evm::new(ctx, state, env);
    f(&mut evm)
}
