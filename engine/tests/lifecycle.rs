//! Transaction gas accounting, creation addresses, configuration loading
//! and post-execution validation.

mod common;

use std::sync::Arc;

use common::*;
use corevm_engine::test_utils::{
    deterministic_key, key_address, slot, unsigned_tx, word, Op, ScriptInterpreter,
};
use corevm_engine::{
    apply_transaction, validation::validate_state, Account, BlockExecutor, CancelToken, ChainConfig,
    Ed25519Signer, EvmEnv, FixedRewardEngine, FrameRecorder, NoHistory, StateDb, VmConfig,
};
use corevm_primitives::{crypto::create_address, Address, Block, GasPool, ReceiptStatus, VmError};

const CONTRACT: Address = [0xCC; 20];

fn run_tx(
    state: &mut dyn StateDb,
    interpreter: ScriptInterpreter,
    gas_limit: u64,
) -> corevm_primitives::Receipt {
    run_tx_in(state, &env_with(interpreter), gas_limit)
}

fn run_tx_in(state: &mut dyn StateDb, env: &EvmEnv, gas_limit: u64) -> corevm_primitives::Receipt {
    let (_, key) = alice();
    let unsigned = unsigned_tx(0, Some(CONTRACT), 0, gas_limit, 1, Vec::new());
    let tx = Ed25519Signer::new(CHAIN_ID).sign(unsigned, &key);
    let mut pool = GasPool::new(10_000_000);
    let mut used = 0;
    apply_transaction(
        env,
        &NoHistory,
        None,
        &mut pool,
        state,
        &header(1, 10_000_000),
        &tx,
        &mut used,
    )
    .unwrap()
}

// ── Gas on failure ──

#[test]
fn test_failed_frame_consumes_all_gas() {
    let (x, _) = alice();
    let mut state = state_with(&[(x, 1_000_000)]);
    state.insert_account(CONTRACT, Account::with_code(b"bad".to_vec()));
    let interpreter = ScriptInterpreter::new().with_script(
        b"bad".to_vec(),
        vec![Op::Burn(1_000), Op::SStore(slot(0), word(1)), Op::Fail],
    );

    let receipt = run_tx(&mut state, interpreter, 100_000);

    assert_eq!(receipt.status, ReceiptStatus::Failed);
    assert_eq!(receipt.gas_used, 100_000);
    assert_eq!(state.balance(&x), 900_000);
    assert_eq!(state.balance(&COINBASE), 100_000);
    assert_eq!(state.storage(&CONTRACT, &slot(0)), corevm_primitives::ZERO_HASH);
    assert_eq!(state.nonce(&x), 1);
}

#[test]
fn test_revert_returns_unused_gas() {
    let (x, _) = alice();
    let mut state = state_with(&[(x, 1_000_000)]);
    state.insert_account(CONTRACT, Account::with_code(b"undo".to_vec()));
    let interpreter = ScriptInterpreter::new().with_script(
        b"undo".to_vec(),
        vec![Op::Burn(1_000), Op::SStore(slot(0), word(1)), Op::Revert(b"no".to_vec())],
    );

    let receipt = run_tx(&mut state, interpreter, 100_000);

    assert_eq!(receipt.status, ReceiptStatus::Failed);
    assert_eq!(receipt.gas_used, 22_000);
    assert_eq!(state.balance(&x), 1_000_000 - 22_000);
    assert_eq!(state.storage(&CONTRACT, &slot(0)), corevm_primitives::ZERO_HASH);
}

#[test]
fn test_refund_capped_at_half_of_used_gas() {
    let (x, _) = alice();
    let mut state = state_with(&[(x, 1_000_000)]);
    state.insert_account(CONTRACT, Account::with_code(b"refund".to_vec()));
    let interpreter = ScriptInterpreter::new().with_script(
        b"refund".to_vec(),
        vec![Op::Burn(9_000), Op::Refund(1_000_000)],
    );

    let receipt = run_tx(&mut state, interpreter, 100_000);

    // used 30_000, half of it refunded
    assert!(receipt.status.is_success());
    assert_eq!(receipt.gas_used, 15_000);
    assert_eq!(state.refund(), 0);
}

#[test]
fn test_cancelled_execution_fails_the_frame() {
    let (x, _) = alice();
    let env = env_with(ScriptInterpreter::new().with_script(b"spin".to_vec(), vec![Op::Burn(1)]));
    let cancel = CancelToken::new();
    let env = env.with_cancel_token(cancel.clone());
    let mut state = state_with(&[(x, 100)]);
    state.insert_account(CONTRACT, Account::with_code(b"spin".to_vec()));

    cancel.cancel();
    let outcome = with_evm(&env, &mut state, x, |evm| evm.call(x, CONTRACT, &[], 10_000, 0));

    assert_eq!(outcome.result, Err(VmError::Cancelled));
    assert_eq!(outcome.gas_left, 0);
}

#[test]
fn test_tracer_reports_transaction_frame() {
    let (x, _) = alice();
    let mut state = state_with(&[(x, 1_000_000)]);
    state.insert_account(CONTRACT, Account::with_code(b"work".to_vec()));
    let interpreter = ScriptInterpreter::new().with_script(
        b"work".to_vec(),
        vec![Op::Burn(4_000), Op::SStore(slot(3), word(3)), Op::Return(b"fine".to_vec())],
    );
    let recorder = Arc::new(FrameRecorder::new());
    let env = env_with(interpreter).with_tracer(recorder.clone());

    let receipt = run_tx_in(&mut state, &env, 100_000);

    let frames = recorder.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!((frames[0].from, frames[0].to), (x, CONTRACT));
    // The frame gets what is left after the intrinsic cost
    assert_eq!(frames[0].gas, 100_000 - 21_000);
    assert_eq!(frames[0].gas_used, 4_000);
    assert_eq!(frames[0].output, b"fine");
    assert_eq!(receipt.gas_used, 25_000);
}

// ── Creation addresses ──

#[test]
fn test_create_addresses_follow_creator_nonce() {
    let (x, _) = alice();
    let init = b"empty-init".to_vec();
    let env =
        env_with(ScriptInterpreter::new().with_script(init.clone(), vec![Op::Return(Vec::new())]));
    let mut state = state_with(&[(x, 100)]);

    let (first, second) = with_evm(&env, &mut state, x, |evm| {
        let first = evm.create(x, &init, 50_000, 0);
        let second = evm.create(x, &init, 50_000, 0);
        (first.created_address, second.created_address)
    });

    assert_eq!(first, Some(create_address(&x, 0)));
    assert_eq!(second, Some(create_address(&x, 1)));
    assert_ne!(first, second);
    assert_eq!(state.nonce(&x), 2);
}

#[test]
fn test_create_address_differs_per_creator() {
    let a = key_address(&deterministic_key(7));
    let b = key_address(&deterministic_key(8));
    assert_eq!(create_address(&a, 3), create_address(&a, 3));
    assert_ne!(create_address(&a, 3), create_address(&b, 3));
}

#[test]
fn test_collision_consumes_gas_and_bumps_nonce() {
    let (x, _) = alice();
    let env = env_with(ScriptInterpreter::new());
    let mut state = state_with(&[(x, 100)]);
    let taken = create_address(&x, 0);
    state.insert_account(taken, Account { nonce: 1, ..Account::default() });

    let outcome = with_evm(&env, &mut state, x, |evm| evm.create(x, b"whatever", 40_000, 0));

    assert_eq!(outcome.result, Err(VmError::AddressCollision));
    assert_eq!(outcome.gas_left, 0);
    assert_eq!(state.nonce(&x), 1);
}

// ── Configuration ──

#[test]
fn test_chain_config_from_json() {
    let config: ChainConfig =
        serde_json::from_str(r#"{"chain_id": 42, "homestead_block": 1150000}"#).unwrap();
    assert_eq!(config.chain_id, 42);
    assert!(!config.is_homestead(1_149_999));
    assert!(config.is_homestead(1_150_000));

    let partial: ChainConfig = serde_json::from_str(r#"{"chain_id": 5}"#).unwrap();
    assert_eq!(partial.homestead_block, ChainConfig::default().homestead_block);

    let frontier: ChainConfig = serde_json::from_str(r#"{"homestead_block": null}"#).unwrap();
    assert!(!frontier.is_homestead(u64::MAX));
}

#[test]
fn test_vm_config_from_json() {
    let config: VmConfig = serde_json::from_str(r#"{"max_call_depth": 16}"#).unwrap();
    assert_eq!(config.max_call_depth, 16);
    assert!(!config.no_recursion);
    assert_eq!(config.max_code_size, VmConfig::default().max_code_size);

    let empty: VmConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, VmConfig::default());
}

// ── Validation against execution ──

#[test]
fn test_executed_block_validates() {
    let (x, key) = alice();
    let (y, _) = bob();
    let mut block = Block {
        header: header(1, 1_000_000),
        transactions: vec![
            corevm_engine::test_utils::signed_transfer(&key, CHAIN_ID, 0, y, 5, 21_000, 2),
            corevm_engine::test_utils::signed_transfer(&key, CHAIN_ID, 1, y, 5, 21_000, 2),
        ],
    };
    let executor =
        BlockExecutor::new(env_with(ScriptInterpreter::new()), FixedRewardEngine::new(100));

    let mut state = state_with(&[(x, 1_000_000)]);
    let outcome = executor.execute_block(&block, &mut state, &NoHistory).unwrap();

    block.header.gas_used = outcome.gas_used;
    block.header.state_root = outcome.state_root;
    assert!(validate_state(&block, &outcome).is_ok());

    block.header.state_root = corevm_primitives::ZERO_HASH;
    assert!(validate_state(&block, &outcome).is_err());
    assert_eq!(state.balance(&COINBASE), 42_000 * 2 + 100);
}
