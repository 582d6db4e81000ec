//! Transaction application pipeline.
//!
//! A signed transaction becomes a [`Message`] once its sender is recovered.
//! [`StateTransition`] then applies the message:
//!
//! 1. nonce check and gas purchase (sender balance, block gas pool)
//! 2. intrinsic gas
//! 3. top-level call or creation through the dispatcher
//! 4. refund of unused gas to the sender and the pool, fee to the coinbase
//!
//! Errors in steps 1 and 2 are pre-flight errors and reject the
//! transaction. Dispatcher failures in step 3 never propagate; the
//! transaction is included with a failed receipt and its gas is charged.

use corevm_primitives::{
    bloom::logs_bloom,
    crypto::{create_address, public_key_to_address, verify_ed25519},
    gas::intrinsic_gas,
    Address, BlockHeader, GasPool, Receipt, SignedTransaction, TxError, VmError, Wei,
};

use crate::context::{new_execution_context, BlockHashes, ExecutionContext};
use crate::evm::{Evm, EvmEnv};
use crate::state::StateDb;

// ── Sender recovery ──

/// Recovers the sender of a signed transaction.
pub trait Signer {
    /// Address that signed `tx`; `InvalidSignature` if it does not verify.
    fn sender(&self, tx: &SignedTransaction) -> Result<Address, TxError>;

    /// Chain id the signatures are bound to.
    fn chain_id(&self) -> u64;
}

/// Ed25519 signatures over the chain-bound signing payload. The sender is
/// the last 20 bytes of keccak-256 of the public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signer {
    chain_id: u64,
}

impl Ed25519Signer {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Fill in the public key and signature of `tx`.
    pub fn sign(
        &self,
        mut tx: SignedTransaction,
        key: &ed25519_dalek::SigningKey,
    ) -> SignedTransaction {
        tx.public_key = *key.verifying_key().as_bytes();
        let payload = tx.signing_payload(self.chain_id);
        tx.signature = ed25519_dalek::Signer::sign(key, &payload).to_bytes();
        tx
    }
}

impl Signer for Ed25519Signer {
    fn sender(&self, tx: &SignedTransaction) -> Result<Address, TxError> {
        let payload = tx.signing_payload(self.chain_id);
        if !verify_ed25519(&payload, &tx.signature, &tx.public_key) {
            return Err(TxError::InvalidSignature);
        }
        Ok(public_key_to_address(&tx.public_key))
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

// ── Message ──

/// A transaction with a known sender. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    from: Address,
    to: Option<Address>,
    nonce: u64,
    value: Wei,
    gas_limit: u64,
    gas_price: Wei,
    data: Vec<u8>,
    check_nonce: bool,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: Address,
        to: Option<Address>,
        nonce: u64,
        value: Wei,
        gas_limit: u64,
        gas_price: Wei,
        data: Vec<u8>,
        check_nonce: bool,
    ) -> Self {
        Self {
            from,
            to,
            nonce,
            value,
            gas_limit,
            gas_price,
            data,
            check_nonce,
        }
    }

    /// Nonce-checked call message.
    pub fn call(
        from: Address,
        to: Address,
        nonce: u64,
        value: Wei,
        gas_limit: u64,
        gas_price: Wei,
        data: Vec<u8>,
    ) -> Self {
        Self::new(from, Some(to), nonce, value, gas_limit, gas_price, data, true)
    }

    /// Nonce-checked creation message; `data` is the init code.
    pub fn create(
        from: Address,
        nonce: u64,
        value: Wei,
        gas_limit: u64,
        gas_price: Wei,
        data: Vec<u8>,
    ) -> Self {
        Self::new(from, None, nonce, value, gas_limit, gas_price, data, true)
    }

    /// Recover the sender of `tx` and build its message.
    pub fn from_transaction(tx: &SignedTransaction, signer: &dyn Signer) -> Result<Self, TxError> {
        let from = signer.sender(tx)?;
        Ok(Self::new(
            from,
            tx.to,
            tx.nonce,
            tx.value,
            tx.gas_limit,
            tx.gas_price,
            tx.data.clone(),
            true,
        ))
    }

    pub fn from(&self) -> Address {
        self.from
    }

    pub fn to(&self) -> Option<Address> {
        self.to
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn value(&self) -> Wei {
        self.value
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn gas_price(&self) -> Wei {
        self.gas_price
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn check_nonce(&self) -> bool {
        self.check_nonce
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

// ── State transition ──

/// Outcome of applying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Gas charged to the sender, after refunds.
    pub used_gas: u64,
    /// Dispatcher failure of the top-level frame, if any.
    pub error: Option<VmError>,
    /// Returned data, or revert data.
    pub output: Vec<u8>,
    /// New contract address, for creations that got past the collision check.
    pub contract_address: Option<Address>,
}

impl ExecutionResult {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Applies one message to the state.
pub struct StateTransition<'s, 'a> {
    env: &'a EvmEnv,
    context: ExecutionContext<'a>,
    state: &'s mut dyn StateDb,
    gas_pool: &'s mut GasPool,
    msg: &'s Message,
    /// Gas left to the transaction.
    gas: u64,
    initial_gas: u64,
}

impl<'s, 'a> StateTransition<'s, 'a> {
    pub fn new(
        env: &'a EvmEnv,
        context: ExecutionContext<'a>,
        state: &'s mut dyn StateDb,
        gas_pool: &'s mut GasPool,
        msg: &'s Message,
    ) -> Self {
        Self {
            env,
            context,
            state,
            gas_pool,
            msg,
            gas: 0,
            initial_gas: 0,
        }
    }

    fn gas_used(&self) -> u64 {
        self.initial_gas - self.gas
    }

    fn pre_check(&mut self) -> Result<(), TxError> {
        if self.msg.check_nonce {
            let state_nonce = self.state.nonce(&self.msg.from);
            if state_nonce < self.msg.nonce {
                return Err(TxError::NonceTooHigh { state: state_nonce, tx: self.msg.nonce });
            }
            if state_nonce > self.msg.nonce {
                return Err(TxError::NonceTooLow { state: state_nonce, tx: self.msg.nonce });
            }
            if state_nonce == u64::MAX {
                return Err(TxError::NonceMax { address: self.msg.from, nonce: state_nonce });
            }
        }
        self.buy_gas()
    }

    /// Reserve the gas limit from the pool and debit its price up front.
    fn buy_gas(&mut self) -> Result<(), TxError> {
        let gas_cost = Wei::from(self.msg.gas_limit)
            .checked_mul(self.msg.gas_price)
            .ok_or(TxError::GasOverflow)?;
        let want = gas_cost.checked_add(self.msg.value).ok_or(TxError::GasOverflow)?;
        let have = self.state.balance(&self.msg.from);
        if have < want {
            return Err(TxError::InsufficientFunds { have, want });
        }

        self.gas_pool.sub_gas(self.msg.gas_limit)?;
        self.gas = self.msg.gas_limit;
        self.initial_gas = self.msg.gas_limit;
        self.state.sub_balance(self.msg.from, gas_cost);
        Ok(())
    }

    fn use_gas(&mut self, amount: u64) -> Result<(), TxError> {
        if self.gas < amount {
            return Err(TxError::IntrinsicGas { have: self.gas, want: amount });
        }
        self.gas -= amount;
        Ok(())
    }

    /// Credit refunds and unused gas back to the sender and the pool.
    fn refund_gas(&mut self) -> Result<(), TxError> {
        let refund = (self.gas_used() / 2).min(self.state.refund());
        self.gas += refund;

        let remaining = Wei::from(self.gas).saturating_mul(self.msg.gas_price);
        self.state.add_balance(self.msg.from, remaining);
        self.gas_pool.add_gas(self.gas)?;
        Ok(())
    }

    /// Apply the message and return what happened.
    pub fn transition_db(mut self) -> Result<ExecutionResult, TxError> {
        self.pre_check()?;

        let rules = self.env.chain.rules(self.context.block_number);
        let creation = self.msg.is_contract_creation();
        let intrinsic = intrinsic_gas(&self.msg.data, creation, rules.is_homestead)
            .ok_or(TxError::GasOverflow)?;
        self.use_gas(intrinsic)?;

        let msg = self.msg;
        let outcome = match msg.to {
            None => {
                let mut evm = Evm::new(self.context, &mut *self.state, self.env);
                evm.create(msg.from, &msg.data, self.gas, msg.value)
            }
            Some(to) => {
                let nonce = self.state.nonce(&msg.from);
                let next = nonce
                    .checked_add(1)
                    .ok_or(TxError::NonceMax { address: msg.from, nonce })?;
                self.state.set_nonce(msg.from, next);
                let mut evm = Evm::new(self.context, &mut *self.state, self.env);
                evm.call(msg.from, to, &msg.data, self.gas, msg.value)
            }
        };
        self.gas = outcome.gas_left;
        if let Err(err) = &outcome.result {
            tracing::debug!(from = ?msg.from, %err, "top-level frame failed");
        }

        self.refund_gas()?;
        let fee = Wei::from(self.gas_used()).saturating_mul(msg.gas_price);
        self.state.add_balance(self.context.coinbase, fee);

        Ok(ExecutionResult {
            used_gas: self.gas_used(),
            output: outcome.output().to_vec(),
            contract_address: outcome.created_address,
            error: outcome.result.err(),
        })
    }
}

/// Apply `msg` against `state`, drawing gas from `gas_pool`.
pub fn apply_message(
    env: &EvmEnv,
    context: ExecutionContext<'_>,
    state: &mut dyn StateDb,
    gas_pool: &mut GasPool,
    msg: &Message,
) -> Result<ExecutionResult, TxError> {
    StateTransition::new(env, context, state, gas_pool, msg).transition_db()
}

/// Apply a signed transaction and build its receipt.
///
/// On a pre-flight error the state and the pool are left as they were
/// before the call. Otherwise pending mutations are finalised and
/// `used_gas` grows by the transaction's gas.
#[allow(clippy::too_many_arguments)]
pub fn apply_transaction(
    env: &EvmEnv,
    block_hashes: &dyn BlockHashes,
    author: Option<Address>,
    gas_pool: &mut GasPool,
    state: &mut dyn StateDb,
    header: &BlockHeader,
    tx: &SignedTransaction,
    used_gas: &mut u64,
) -> Result<Receipt, TxError> {
    let signer = Ed25519Signer::new(env.chain.chain_id);
    let msg = Message::from_transaction(tx, &signer)?;
    let context = new_execution_context(&msg, header, block_hashes, author);

    let snapshot = state.snapshot();
    let pool_before = *gas_pool;
    let result = match apply_message(env, context, state, gas_pool, &msg) {
        Ok(result) => result,
        Err(err) => {
            state.revert_to_snapshot(snapshot);
            *gas_pool = pool_before;
            return Err(err);
        }
    };
    state.finalise();
    *used_gas += result.used_gas;

    let tx_hash = tx.hash();
    let mut receipt = Receipt::new(result.failed(), *used_gas);
    receipt.tx_hash = tx_hash;
    receipt.gas_used = result.used_gas;
    if msg.is_contract_creation() {
        receipt.contract_address = Some(create_address(&msg.from, tx.nonce));
    }
    receipt.logs = state.logs(&tx_hash);
    for log in &mut receipt.logs {
        log.block_number = header.number;
    }
    receipt.bloom = logs_bloom(&receipt.logs);

    tracing::debug!(
        tx = %corevm_primitives::types::hash_to_hex(&tx_hash),
        gas_used = result.used_gas,
        failed = result.failed(),
        "applied transaction"
    );
    Ok(receipt)
}
