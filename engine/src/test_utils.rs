//! Test helpers: a scriptable interpreter, storage words and signing keys.
//!
//! Compiled for unit tests and behind the `test-utils` feature.

use std::collections::BTreeMap;

use corevm_primitives::{Address, Hash, Log, SignedTransaction, VmError, Wei, ZERO_HASH};

use crate::contract::Contract;
use crate::evm::{CallKind, Evm};
use crate::interpreter::Interpreter;
use crate::transaction::Ed25519Signer;

/// One step of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Charge gas; fails with `OutOfGas` when the frame cannot pay.
    Burn(u64),
    /// Write a storage slot of the running account.
    SStore(Hash, Hash),
    /// Store the dispatcher depth in a slot.
    StoreDepth(Hash),
    /// Store the frame's caller, right-aligned, in a slot.
    StoreCaller(Hash),
    /// Store the frame's value in a slot.
    StoreValue(Hash),
    /// Emit a log from the running account.
    Log(Vec<Hash>, Vec<u8>),
    /// Add to the refund counter.
    Refund(u64),
    /// Nested frame of the given kind; for `Create` the target is ignored
    /// and `Op::Create` should be used instead. The nested outcome is
    /// ignored apart from returned gas. `gas` is capped at what is left.
    Call { kind: CallKind, to: Address, gas: u64, value: Wei },
    /// Call the running account itself.
    CallSelf { gas: u64 },
    /// Nested creation running `init_code`.
    Create { init_code: Vec<u8>, gas: u64, value: Wei },
    /// Stop with output.
    Return(Vec<u8>),
    /// Stop with an explicit revert.
    Revert(Vec<u8>),
    /// Stop with a non-revert failure.
    Fail,
}

/// Interpreter that looks up a script by the frame's code.
///
/// The code bytes are only a key; any code without a registered script
/// fails the frame.
#[derive(Debug, Clone, Default)]
pub struct ScriptInterpreter {
    scripts: BTreeMap<Vec<u8>, Vec<Op>>,
}

impl ScriptInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ops` for frames running `code`.
    pub fn with_script(mut self, code: Vec<u8>, ops: Vec<Op>) -> Self {
        self.scripts.insert(code, ops);
        self
    }
}

impl Interpreter for ScriptInterpreter {
    fn run(
        &self,
        evm: &mut Evm<'_>,
        contract: &mut Contract,
        input: &[u8],
    ) -> Result<Vec<u8>, VmError> {
        let ops = self
            .scripts
            .get(&contract.code)
            .ok_or_else(|| VmError::Interpreter("unknown code".into()))?;

        for op in ops {
            if evm.is_cancelled() {
                return Err(VmError::Cancelled);
            }
            match op {
                Op::Burn(gas) => {
                    if !contract.use_gas(*gas) {
                        return Err(VmError::OutOfGas);
                    }
                }
                Op::SStore(key, value) => evm.set_storage(contract.address, *key, *value)?,
                Op::StoreDepth(key) => {
                    evm.set_storage(contract.address, *key, word(evm.depth() as u64))?;
                }
                Op::StoreCaller(key) => {
                    evm.set_storage(contract.address, *key, address_word(&contract.caller))?;
                }
                Op::StoreValue(key) => {
                    evm.set_storage(contract.address, *key, wei_word(contract.value))?;
                }
                Op::Log(topics, data) => {
                    evm.emit_log(Log::new(contract.address, topics.clone(), data.clone()))?;
                }
                Op::Refund(gas) => evm.add_refund(*gas)?,
                Op::Call { kind, to, gas, value } => {
                    let gas = (*gas).min(contract.gas);
                    contract.gas -= gas;
                    let outcome = match kind {
                        CallKind::Call => evm.call(contract.address, *to, input, gas, *value),
                        CallKind::CallCode => {
                            evm.call_code(contract.address, *to, input, gas, *value)
                        }
                        CallKind::DelegateCall => evm.delegate_call(contract, *to, input, gas),
                        CallKind::StaticCall => evm.static_call(contract.address, *to, input, gas),
                        CallKind::Create => evm.create(contract.address, input, gas, *value),
                    };
                    contract.gas += outcome.gas_left;
                }
                Op::CallSelf { gas } => {
                    let gas = (*gas).min(contract.gas);
                    contract.gas -= gas;
                    let outcome = evm.call(contract.address, contract.address, input, gas, 0);
                    contract.gas += outcome.gas_left;
                }
                Op::Create { init_code, gas, value } => {
                    let gas = (*gas).min(contract.gas);
                    contract.gas -= gas;
                    let outcome = evm.create(contract.address, init_code, gas, *value);
                    contract.gas += outcome.gas_left;
                }
                Op::Return(output) => return Ok(output.clone()),
                Op::Revert(data) => return Err(VmError::Reverted(data.clone())),
                Op::Fail => return Err(VmError::Interpreter("invalid opcode".into())),
            }
        }
        Ok(Vec::new())
    }
}

/// Storage key `n`, big-endian.
pub fn slot(n: u64) -> Hash {
    word(n)
}

/// 32-byte big-endian word holding `v`.
pub fn word(v: u64) -> Hash {
    wei_word(Wei::from(v))
}

/// 32-byte big-endian word holding `v`.
pub fn wei_word(v: Wei) -> Hash {
    let mut out = ZERO_HASH;
    out[16..].copy_from_slice(&v.to_be_bytes());
    out
}

/// Address right-aligned in a 32-byte word.
pub fn address_word(address: &Address) -> Hash {
    let mut out = ZERO_HASH;
    out[12..].copy_from_slice(address);
    out
}

/// Ed25519 key derived from a single seed byte, stable across machines.
pub fn deterministic_key(seed: u8) -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[seed; 32])
}

/// Address controlled by `key`.
pub fn key_address(key: &ed25519_dalek::SigningKey) -> Address {
    corevm_primitives::crypto::public_key_to_address(key.verifying_key().as_bytes())
}

/// Unsigned transaction template.
pub fn unsigned_tx(
    nonce: u64,
    to: Option<Address>,
    value: Wei,
    gas_limit: u64,
    gas_price: Wei,
    data: Vec<u8>,
) -> SignedTransaction {
    SignedTransaction {
        nonce,
        gas_price,
        gas_limit,
        to,
        value,
        data,
        public_key: [0u8; 32],
        signature: [0u8; 64],
    }
}

/// Sign a plain value transfer.
pub fn signed_transfer(
    key: &ed25519_dalek::SigningKey,
    chain_id: u64,
    nonce: u64,
    to: Address,
    value: Wei,
    gas_limit: u64,
    gas_price: Wei,
) -> SignedTransaction {
    let tx = unsigned_tx(nonce, Some(to), value, gas_limit, gas_price, Vec::new());
    Ed25519Signer::new(chain_id).sign(tx, key)
}
