//! Call dispatcher.
//!
//! `Evm` runs one transaction's frames. The five public entry points
//! (`call`, `call_code`, `delegate_call`, `static_call`, `create`) build a
//! [`FrameRequest`] and feed it through one state machine:
//!
//! 1. entry checks: recursion switch, call depth, caller balance, write
//!    protection
//! 2. snapshot, account materialisation, value transfer
//! 3. cancellation poll, then precompile or interpreter
//! 4. settle: keep state on success; otherwise revert to the snapshot and,
//!    unless the code reverted explicitly, consume the frame's gas
//!
//! Depth counts running interpreter frames. A frame may be entered while
//! `depth <= max_call_depth`, so code runs at depths `1..=max_call_depth + 1`.

use std::sync::Arc;
use std::time::Instant;

use corevm_primitives::{
    crypto::{create_address, keccak256},
    gas::CREATE_DATA_GAS,
    Address, Hash, Log, VmError, Wei, EMPTY_CODE_HASH, ZERO_HASH,
};

use crate::config::{ChainConfig, Rules, VmConfig};
use crate::context::ExecutionContext;
use crate::contract::Contract;
use crate::interpreter::{CancelToken, Interpreter, NoopInterpreter};
use crate::precompiles::{run_precompile, PrecompileSet};
use crate::state::StateDb;
use crate::tracer::Tracer;

/// Flavour of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Run the target's code in the target's context, transferring value.
    Call,
    /// Run the target's code in the caller's context.
    CallCode,
    /// Run the target's code in the caller's context, inheriting the
    /// parent frame's caller and value.
    DelegateCall,
    /// Like `Call` without value; the frame and its children are read-only.
    StaticCall,
    /// Deploy a new contract from init code.
    Create,
}

impl CallKind {
    /// Kinds whose caller must be able to pay the frame's value.
    fn checks_balance(self) -> bool {
        matches!(self, Self::Call | Self::CallCode | Self::Create)
    }
}

/// Result of one frame as seen by its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Returned data, or the failure. Revert data travels inside
    /// [`VmError::Reverted`].
    pub result: Result<Vec<u8>, VmError>,
    /// Gas handed back to the caller.
    pub gas_left: u64,
    /// Address of the new account, for creations that got past the
    /// collision check.
    pub created_address: Option<Address>,
}

impl FrameOutcome {
    fn success(output: Vec<u8>, gas_left: u64) -> Self {
        Self {
            result: Ok(output),
            gas_left,
            created_address: None,
        }
    }

    fn failure(err: VmError, gas_left: u64) -> Self {
        Self {
            result: Err(err),
            gas_left,
            created_address: None,
        }
    }

    fn with_address(mut self, address: Address) -> Self {
        self.created_address = Some(address);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&VmError> {
        self.result.as_ref().err()
    }

    /// Returned data on success, revert data on explicit revert, empty
    /// otherwise.
    pub fn output(&self) -> &[u8] {
        result_output(&self.result)
    }
}

fn result_output(result: &Result<Vec<u8>, VmError>) -> &[u8] {
    match result {
        Ok(output) => output,
        Err(VmError::Reverted(data)) => data,
        Err(_) => &[],
    }
}

/// Everything a frame needs besides state, fixed for a whole block.
#[derive(Clone)]
pub struct EvmEnv {
    pub chain: ChainConfig,
    pub vm: VmConfig,
    pub precompiles: PrecompileSet,
    pub interpreter: Arc<dyn Interpreter>,
    pub cancel: CancelToken,
    /// Observer of each transaction's top-level frame.
    pub tracer: Option<Arc<dyn Tracer>>,
}

impl EvmEnv {
    /// Environment with default dispatcher limits and the standard
    /// precompiles.
    pub fn new(chain: ChainConfig, interpreter: Arc<dyn Interpreter>) -> Self {
        Self {
            chain,
            vm: VmConfig::default(),
            precompiles: PrecompileSet::standard(),
            interpreter,
            cancel: CancelToken::new(),
            tracer: None,
        }
    }

    pub fn with_vm_config(mut self, vm: VmConfig) -> Self {
        self.vm = vm;
        self
    }

    pub fn with_precompiles(mut self, precompiles: PrecompileSet) -> Self {
        self.precompiles = precompiles;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }
}

impl Default for EvmEnv {
    fn default() -> Self {
        Self::new(ChainConfig::default(), Arc::new(NoopInterpreter))
    }
}

impl core::fmt::Debug for EvmEnv {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EvmEnv")
            .field("chain", &self.chain)
            .field("vm", &self.vm)
            .field("precompiles", &self.precompiles)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("traced", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}

/// Input of the dispatcher state machine.
struct FrameRequest<'i> {
    kind: CallKind,
    caller: Address,
    /// Callee for calls; unused for creations.
    target: Address,
    /// Call data, or init code for creations.
    input: &'i [u8],
    gas: u64,
    value: Wei,
    /// Frame issuing a delegate call.
    parent: Option<&'i Contract>,
}

/// Dispatcher for one transaction.
pub struct Evm<'a> {
    context: ExecutionContext<'a>,
    state: &'a mut dyn StateDb,
    env: &'a EvmEnv,
    rules: Rules,
    depth: usize,
    read_only: bool,
}

impl<'a> Evm<'a> {
    pub fn new(
        context: ExecutionContext<'a>,
        state: &'a mut dyn StateDb,
        env: &'a EvmEnv,
    ) -> Self {
        let rules = env.chain.rules(context.block_number);
        Self {
            context,
            state,
            env,
            rules,
            depth: 0,
            read_only: false,
        }
    }

    pub fn context(&self) -> &ExecutionContext<'a> {
        &self.context
    }

    /// Read access to the world state. Writes go through the dispatcher.
    pub fn state(&self) -> &dyn StateDb {
        &*self.state
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    pub fn config(&self) -> &VmConfig {
        &self.env.vm
    }

    /// Number of interpreter frames currently running.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True inside a static call and all of its children.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_cancelled(&self) -> bool {
        self.env.cancel.is_cancelled()
    }

    /// Write a storage slot of `address`, unless the frame is read-only.
    pub fn set_storage(
        &mut self,
        address: Address,
        key: Hash,
        value: Hash,
    ) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::WriteProtection);
        }
        self.state.set_storage(address, key, value);
        Ok(())
    }

    /// Record a log, unless the frame is read-only.
    pub fn emit_log(&mut self, log: Log) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::WriteProtection);
        }
        self.state.add_log(log);
        Ok(())
    }

    /// Add to the transaction's gas refund counter, unless read-only.
    pub fn add_refund(&mut self, gas: u64) -> Result<(), VmError> {
        if self.read_only {
            return Err(VmError::WriteProtection);
        }
        self.state.add_refund(gas);
        Ok(())
    }

    // ── Entry points ──

    /// Run `to`'s code with `input`, moving `value` from `caller` to `to`.
    pub fn call(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Wei,
    ) -> FrameOutcome {
        self.dispatch(FrameRequest {
            kind: CallKind::Call,
            caller,
            target: to,
            input,
            gas,
            value,
            parent: None,
        })
    }

    /// Run `to`'s code in `caller`'s own context.
    pub fn call_code(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: u64,
        value: Wei,
    ) -> FrameOutcome {
        self.dispatch(FrameRequest {
            kind: CallKind::CallCode,
            caller,
            target: to,
            input,
            gas,
            value,
            parent: None,
        })
    }

    /// Run `to`'s code in the context of `parent`, keeping the parent's
    /// caller and value.
    pub fn delegate_call(
        &mut self,
        parent: &Contract,
        to: Address,
        input: &[u8],
        gas: u64,
    ) -> FrameOutcome {
        self.dispatch(FrameRequest {
            kind: CallKind::DelegateCall,
            caller: parent.address,
            target: to,
            input,
            gas,
            value: parent.value,
            parent: Some(parent),
        })
    }

    /// Run `to`'s code without value and without allowing state changes.
    pub fn static_call(
        &mut self,
        caller: Address,
        to: Address,
        input: &[u8],
        gas: u64,
    ) -> FrameOutcome {
        self.dispatch(FrameRequest {
            kind: CallKind::StaticCall,
            caller,
            target: to,
            input,
            gas,
            value: 0,
            parent: None,
        })
    }

    /// Deploy the code returned by running `init_code`, funded with `value`.
    pub fn create(
        &mut self,
        caller: Address,
        init_code: &[u8],
        gas: u64,
        value: Wei,
    ) -> FrameOutcome {
        self.dispatch(FrameRequest {
            kind: CallKind::Create,
            caller,
            target: caller,
            input: init_code,
            gas,
            value,
            parent: None,
        })
    }

    // ── State machine ──

    fn dispatch(&mut self, req: FrameRequest<'_>) -> FrameOutcome {
        let kind = req.kind;
        tracing::trace!(?kind, depth = self.depth, gas = req.gas, "enter frame");

        if let Err(outcome) = self.check_entry(&req) {
            return outcome;
        }
        let outcome = match kind {
            CallKind::Create => self.create_frame(req),
            _ => self.call_frame(req),
        };

        if let Err(err) = &outcome.result {
            tracing::debug!(
                ?kind,
                depth = self.depth,
                gas_left = outcome.gas_left,
                %err,
                "frame failed"
            );
        }
        outcome
    }

    /// Checks performed before anything is touched.
    fn check_entry(&self, req: &FrameRequest<'_>) -> Result<(), FrameOutcome> {
        // Creations are skipped after account setup instead
        if self.env.vm.no_recursion && self.depth > 0 && req.kind != CallKind::Create {
            return Err(FrameOutcome::success(Vec::new(), req.gas));
        }
        if self.depth > self.env.vm.max_call_depth {
            return Err(FrameOutcome::failure(VmError::DepthExceeded, req.gas));
        }
        if req.kind.checks_balance()
            && !(self.context.can_transfer)(&*self.state, &req.caller, req.value)
        {
            return Err(FrameOutcome::failure(VmError::InsufficientBalance, req.gas));
        }
        let writes = match req.kind {
            CallKind::Create => true,
            CallKind::Call => req.value != 0,
            _ => false,
        };
        if self.read_only && writes {
            return Err(FrameOutcome::failure(VmError::WriteProtection, 0));
        }
        Ok(())
    }

    fn call_frame(&mut self, req: FrameRequest<'_>) -> FrameOutcome {
        let FrameRequest { kind, caller, target, input, gas, value, parent } = req;
        let snapshot = self.state.snapshot();

        let mut contract = match kind {
            CallKind::Call => {
                if !self.state.exists(&target) {
                    if !self.env.precompiles.contains(&target) && value == 0 {
                        let started = self.trace_start(caller, target, false, input, gas, value);
                        self.trace_end(started, &Ok(Vec::new()), 0);
                        return FrameOutcome::success(Vec::new(), gas);
                    }
                    self.state.create_account(target);
                }
                (self.context.transfer)(&mut *self.state, caller, target, value);
                Contract::new(caller, target, value, gas)
            }
            CallKind::CallCode => Contract::new(caller, caller, value, gas),
            CallKind::DelegateCall => {
                let contract = Contract::new(caller, caller, value, gas);
                match parent {
                    Some(parent) => contract.as_delegate(parent),
                    None => contract,
                }
            }
            CallKind::StaticCall => Contract::new(caller, target, 0, gas),
            CallKind::Create => unreachable!("creations use create_frame"),
        };
        contract.set_call_code(target, self.state.code_hash(&target), self.state.code(&target));
        let started = self.trace_start(caller, target, false, input, gas, value);

        let enclosing_read_only = self.read_only;
        if kind == CallKind::StaticCall {
            self.read_only = true;
        }
        let result = self.run(&mut contract, input);
        self.read_only = enclosing_read_only;

        if let Err(err) = &result {
            self.state.revert_to_snapshot(snapshot);
            if !err.is_revert() {
                contract.gas = 0;
            }
        }
        self.trace_end(started, &result, gas.saturating_sub(contract.gas));
        FrameOutcome {
            result,
            gas_left: contract.gas,
            created_address: None,
        }
    }

    fn create_frame(&mut self, req: FrameRequest<'_>) -> FrameOutcome {
        let FrameRequest { caller, input: init_code, gas, value, .. } = req;

        // The creator's nonce moves even if the creation fails below
        let nonce = self.state.nonce(&caller);
        let Some(next_nonce) = nonce.checked_add(1) else {
            return FrameOutcome::failure(VmError::NonceOverflow, gas);
        };
        self.state.set_nonce(caller, next_nonce);

        let address = create_address(&caller, nonce);
        let existing_hash = self.state.code_hash(&address);
        let has_code = existing_hash != ZERO_HASH && existing_hash != EMPTY_CODE_HASH;
        if self.state.nonce(&address) != 0 || has_code {
            return FrameOutcome::failure(VmError::AddressCollision, 0);
        }

        let snapshot = self.state.snapshot();
        self.state.create_account(address);
        self.state.set_nonce(address, 1);
        (self.context.transfer)(&mut *self.state, caller, address, value);

        let mut contract = Contract::new(caller, address, value, gas);
        contract.set_call_code(address, keccak256(init_code), init_code.to_vec());

        if self.env.vm.no_recursion && self.depth > 0 {
            return FrameOutcome::success(Vec::new(), gas).with_address(address);
        }
        let started = self.trace_start(caller, address, true, init_code, gas, value);

        let result = self.run(&mut contract, &[]);

        let max_code_size = self.env.vm.max_code_size;
        let max_code_size_exceeded = matches!(&result, Ok(code) if code.len() > max_code_size);
        let mut result = match result {
            Ok(code) if !max_code_size_exceeded => {
                let store_gas = (code.len() as u64).saturating_mul(CREATE_DATA_GAS);
                if contract.use_gas(store_gas) {
                    self.state.set_code(address, code.clone());
                    Ok(code)
                } else {
                    Err(VmError::CodeStoreOutOfGas)
                }
            }
            other => other,
        };

        // Before Homestead a creation that cannot pay for its code keeps
        // the empty account and the unspent gas
        let keeps_codeless_account =
            !self.rules.is_homestead && matches!(result, Err(VmError::CodeStoreOutOfGas));
        if max_code_size_exceeded || (result.is_err() && !keeps_codeless_account) {
            self.state.revert_to_snapshot(snapshot);
            if !matches!(&result, Err(err) if err.is_revert()) {
                contract.gas = 0;
            }
        }
        if max_code_size_exceeded {
            result = Err(VmError::MaxCodeSizeExceeded);
        }
        self.trace_end(started, &result, gas.saturating_sub(contract.gas));

        FrameOutcome {
            result,
            gas_left: contract.gas,
            created_address: Some(address),
        }
    }

    /// Report a frame start to the tracer, for top-level frames only.
    fn trace_start(
        &self,
        from: Address,
        to: Address,
        create: bool,
        input: &[u8],
        gas: u64,
        value: Wei,
    ) -> Option<Instant> {
        if self.depth != 0 {
            return None;
        }
        let tracer = self.env.tracer.as_ref()?;
        tracer.capture_start(from, to, create, input, gas, value);
        Some(Instant::now())
    }

    fn trace_end(
        &self,
        started: Option<Instant>,
        result: &Result<Vec<u8>, VmError>,
        gas_used: u64,
    ) {
        if let (Some(started), Some(tracer)) = (started, self.env.tracer.as_ref()) {
            let error = result.as_ref().err();
            tracer.capture_end(result_output(result), gas_used, started.elapsed(), error);
        }
    }

    /// Execute the frame's code: precompile, empty code or interpreter.
    fn run(&mut self, contract: &mut Contract, input: &[u8]) -> Result<Vec<u8>, VmError> {
        if self.env.cancel.is_cancelled() {
            return Err(VmError::Cancelled);
        }
        let env = self.env;
        let precompile = contract.code_address.and_then(|addr| env.precompiles.get(&addr));
        if let Some(precompile) = precompile {
            return run_precompile(precompile.as_ref(), input, contract);
        }
        if contract.code.is_empty() {
            return Ok(Vec::new());
        }

        self.depth += 1;
        let result = env.interpreter.run(self, contract, input);
        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{new_execution_context, NoHistory};
    use crate::state::{Account, MemoryState};
    use crate::test_utils::{slot, word, Op, ScriptInterpreter};
    use crate::tracer::FrameRecorder;
    use crate::transaction::Message;
    use corevm_primitives::{types::address_from_low_u64, BlockHeader, Bloom};

    const SENDER: Address = [0x5E; 20];
    const TARGET: Address = [0x7A; 20];
    const OTHER: Address = [0x07; 20];

    fn header() -> BlockHeader {
        BlockHeader {
            parent_hash: ZERO_HASH,
            number: 1,
            coinbase: [0xC0; 20],
            gas_limit: 10_000_000,
            gas_used: 0,
            timestamp: 1_700_000_000,
            difficulty: 1,
            state_root: ZERO_HASH,
            bloom: Bloom::empty(),
        }
    }

    fn env_with(interpreter: ScriptInterpreter) -> EvmEnv {
        EvmEnv::new(ChainConfig::default(), Arc::new(interpreter))
    }

    fn funded_state() -> MemoryState {
        let mut state = MemoryState::new();
        state.insert_account(SENDER, Account::with_balance(1_000_000));
        state
    }

    /// Run `f` against a fresh dispatcher over `state`.
    fn with_evm<R>(
        env: &EvmEnv,
        state: &mut MemoryState,
        f: impl FnOnce(&mut Evm<'_>) -> R,
    ) -> R {
        let header = header();
        let msg = Message::call(SENDER, TARGET, 0, 0, 1_000_000, 0, Vec::new());
        let ctx = new_execution_context(&msg, &header, &NoHistory, None);
        let mut evm = Evm::new(ctx, state, env);
        f(&mut evm)
    }

    #[test]
    fn test_call_transfers_value_to_new_account() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 300));

        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 50_000);
        assert_eq!(state.balance(&SENDER), 1_000_000 - 300);
        assert_eq!(state.balance(&TARGET), 300);
    }

    #[test]
    fn test_zero_value_call_to_missing_account_is_noop() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let root = state.state_root();
        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 0));

        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 50_000);
        assert!(!state.exists(&TARGET));
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_insufficient_balance_returns_gas() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let root = state.state_root();
        let outcome = with_evm(&env, &mut state, |evm| {
            evm.call(SENDER, TARGET, &[], 50_000, 2_000_000)
        });

        assert_eq!(outcome.result, Err(VmError::InsufficientBalance));
        assert_eq!(outcome.gas_left, 50_000);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_call_code_insufficient_balance_returns_gas() {
        let library = b"library".to_vec();
        let interpreter = ScriptInterpreter::new()
            .with_script(library.clone(), vec![Op::SStore(slot(1), word(5))]);
        let env = env_with(interpreter);
        let mut state = funded_state();
        state.insert_account(OTHER, Account::with_code(library));
        let root = state.state_root();

        let outcome = with_evm(&env, &mut state, |evm| {
            evm.call_code(SENDER, OTHER, &[], 50_000, 2_000_000)
        });

        assert_eq!(outcome.result, Err(VmError::InsufficientBalance));
        assert_eq!(outcome.gas_left, 50_000);
        assert_eq!(state.storage(&SENDER, &slot(1)), ZERO_HASH);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_depth_exceeded_touches_nothing() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let root = state.state_root();
        let outcome = with_evm(&env, &mut state, |evm| {
            evm.depth = evm.config().max_call_depth + 1;
            evm.call(SENDER, TARGET, &[], 50_000, 10)
        });

        assert_eq!(outcome.result, Err(VmError::DepthExceeded));
        assert_eq!(outcome.gas_left, 50_000);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_failure_consumes_gas_and_reverts() {
        let code = b"store-then-fail".to_vec();
        let interpreter = ScriptInterpreter::new()
            .with_script(code.clone(), vec![Op::SStore(slot(1), word(9)), Op::Fail]);
        let env = env_with(interpreter);
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(code));
        let root = state.state_root();

        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 100));

        assert!(matches!(outcome.result, Err(VmError::Interpreter(_))));
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_revert_keeps_remaining_gas() {
        let code = b"burn-then-revert".to_vec();
        let interpreter = ScriptInterpreter::new().with_script(
            code.clone(),
            vec![Op::SStore(slot(1), word(9)), Op::Burn(1_000), Op::Revert(vec![0xEE])],
        );
        let env = env_with(interpreter);
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(code));

        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 0));

        assert_eq!(outcome.result, Err(VmError::Reverted(vec![0xEE])));
        assert_eq!(outcome.output(), &[0xEE]);
        assert_eq!(outcome.gas_left, 49_000);
        assert_eq!(state.storage(&TARGET, &slot(1)), ZERO_HASH);
    }

    #[test]
    fn test_static_call_blocks_writes() {
        let code = b"writer".to_vec();
        let interpreter =
            ScriptInterpreter::new().with_script(code.clone(), vec![Op::SStore(slot(1), word(1))]);
        let env = env_with(interpreter);
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(code));

        let outcome = with_evm(&env, &mut state, |evm| {
            let outcome = evm.static_call(SENDER, TARGET, &[], 50_000);
            assert!(!evm.is_read_only());
            outcome
        });

        assert_eq!(outcome.result, Err(VmError::WriteProtection));
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(state.storage(&TARGET, &slot(1)), ZERO_HASH);
    }

    #[test]
    fn test_value_call_inside_static_is_write_protected() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let outcome = with_evm(&env, &mut state, |evm| {
            evm.read_only = true;
            evm.call(SENDER, TARGET, &[], 50_000, 1)
        });
        assert_eq!(outcome.result, Err(VmError::WriteProtection));
        assert!(!state.exists(&TARGET));
    }

    #[test]
    fn test_call_code_runs_in_caller_context() {
        let library = b"library".to_vec();
        let interpreter = ScriptInterpreter::new()
            .with_script(library.clone(), vec![Op::SStore(slot(1), word(5))]);
        let env = env_with(interpreter);
        let mut state = funded_state();
        state.insert_account(OTHER, Account::with_code(library));

        let outcome = with_evm(&env, &mut state, |evm| {
            evm.call_code(SENDER, OTHER, &[], 50_000, 10)
        });

        assert!(outcome.is_success());
        assert_eq!(state.storage(&SENDER, &slot(1)), word(5));
        assert_eq!(state.storage(&OTHER, &slot(1)), ZERO_HASH);
        assert_eq!(state.balance(&SENDER), 1_000_000);
    }

    #[test]
    fn test_delegate_call_inherits_caller_and_value() {
        let proxy = b"proxy".to_vec();
        let library = b"library".to_vec();
        let interpreter = ScriptInterpreter::new()
            .with_script(
                proxy.clone(),
                vec![Op::Call { kind: CallKind::DelegateCall, to: OTHER, gas: 10_000, value: 0 }],
            )
            .with_script(library.clone(), vec![Op::StoreCaller(slot(1)), Op::StoreValue(slot(2))]);
        let env = env_with(interpreter);
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(proxy));
        state.insert_account(OTHER, Account::with_code(library));

        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 42));

        assert!(outcome.is_success());
        let mut caller_word = ZERO_HASH;
        caller_word[12..].copy_from_slice(&SENDER);
        assert_eq!(state.storage(&TARGET, &slot(1)), caller_word);
        assert_eq!(state.storage(&TARGET, &slot(2)), word(42));
        assert!(state.account(&OTHER).unwrap().storage.is_empty());
    }

    #[test]
    fn test_precompile_dispatch() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let identity = address_from_low_u64(4);
        let outcome = with_evm(&env, &mut state, |evm| {
            evm.call(SENDER, identity, b"echo", 1_000, 0)
        });

        assert_eq!(outcome.result, Ok(b"echo".to_vec()));
        assert_eq!(outcome.gas_left, 1_000 - 18);
        // Zero-value calls to precompiles still materialise the account
        assert!(state.exists(&identity));
    }

    #[test]
    fn test_create_installs_code() {
        let init = b"init".to_vec();
        let runtime = vec![0xAB; 10];
        let interpreter =
            ScriptInterpreter::new().with_script(init.clone(), vec![Op::Return(runtime.clone())]);
        let env = env_with(interpreter);
        let mut state = funded_state();

        let outcome = with_evm(&env, &mut state, |evm| evm.create(SENDER, &init, 100_000, 500));

        let address = create_address(&SENDER, 0);
        assert!(outcome.is_success());
        assert_eq!(outcome.created_address, Some(address));
        assert_eq!(outcome.gas_left, 100_000 - 10 * CREATE_DATA_GAS);
        assert_eq!(state.code(&address), runtime);
        assert_eq!(state.nonce(&address), 1);
        assert_eq!(state.balance(&address), 500);
        assert_eq!(state.nonce(&SENDER), 1);
    }

    #[test]
    fn test_create_collision_keeps_nonce_bump() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let address = create_address(&SENDER, 0);
        state.insert_account(address, Account { nonce: 1, ..Account::default() });

        let outcome = with_evm(&env, &mut state, |evm| evm.create(SENDER, &[], 100_000, 0));

        assert_eq!(outcome.result, Err(VmError::AddressCollision));
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(outcome.created_address, None);
        assert_eq!(state.nonce(&SENDER), 1);
    }

    #[test]
    fn test_create_inside_static_is_write_protected() {
        let env = EvmEnv::default();
        let mut state = funded_state();
        let root = state.state_root();

        let outcome = with_evm(&env, &mut state, |evm| {
            evm.read_only = true;
            evm.create(SENDER, b"init", 50_000, 0)
        });

        assert_eq!(outcome.result, Err(VmError::WriteProtection));
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(outcome.created_address, None);
        assert_eq!(state.nonce(&SENDER), 0);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_create_at_max_nonce_fails_without_side_effects() {
        let env = EvmEnv::default();
        let mut state = MemoryState::new();
        let creator = Account { nonce: u64::MAX, ..Account::with_balance(1_000_000) };
        state.insert_account(SENDER, creator);
        let root = state.state_root();

        let outcome = with_evm(&env, &mut state, |evm| evm.create(SENDER, b"init", 100_000, 5));

        assert_eq!(outcome.result, Err(VmError::NonceOverflow));
        assert_eq!(outcome.gas_left, 100_000);
        assert_eq!(outcome.created_address, None);
        assert_eq!(state.nonce(&SENDER), u64::MAX);
        assert_eq!(state.state_root(), root);
    }

    #[test]
    fn test_create_code_too_large() {
        let init = b"big".to_vec();
        let interpreter =
            ScriptInterpreter::new().with_script(init.clone(), vec![Op::Return(vec![0; 33])]);
        let env = env_with(interpreter).with_vm_config(VmConfig {
            max_code_size: 32,
            ..VmConfig::default()
        });
        let mut state = funded_state();

        let outcome = with_evm(&env, &mut state, |evm| evm.create(SENDER, &init, 1_000_000, 7));

        assert_eq!(outcome.result, Err(VmError::MaxCodeSizeExceeded));
        assert_eq!(outcome.gas_left, 0);
        assert!(!state.exists(&create_address(&SENDER, 0)));
        assert_eq!(state.balance(&SENDER), 1_000_000);
        assert_eq!(state.nonce(&SENDER), 1);
    }

    #[test]
    fn test_code_store_out_of_gas_homestead_reverts() {
        let init = b"init".to_vec();
        let interpreter =
            ScriptInterpreter::new().with_script(init.clone(), vec![Op::Return(vec![1; 10])]);
        let env = env_with(interpreter);
        let mut state = funded_state();

        let outcome = with_evm(&env, &mut state, |evm| evm.create(SENDER, &init, 1_999, 7));

        assert_eq!(outcome.result, Err(VmError::CodeStoreOutOfGas));
        assert_eq!(outcome.gas_left, 0);
        assert!(!state.exists(&create_address(&SENDER, 0)));
    }

    #[test]
    fn test_code_store_out_of_gas_frontier_keeps_account() {
        let init = b"init".to_vec();
        let interpreter =
            ScriptInterpreter::new().with_script(init.clone(), vec![Op::Return(vec![1; 10])]);
        let chain = ChainConfig {
            homestead_block: None,
            ..ChainConfig::default()
        };
        let env = EvmEnv::new(chain, Arc::new(interpreter));
        let mut state = funded_state();

        let outcome = with_evm(&env, &mut state, |evm| evm.create(SENDER, &init, 1_999, 7));

        let address = create_address(&SENDER, 0);
        assert_eq!(outcome.result, Err(VmError::CodeStoreOutOfGas));
        assert_eq!(outcome.gas_left, 1_999);
        assert!(state.exists(&address));
        assert!(state.code(&address).is_empty());
        assert_eq!(state.balance(&address), 7);
    }

    #[test]
    fn test_no_recursion_skips_nested_frames() {
        let code = b"caller".to_vec();
        let interpreter = ScriptInterpreter::new().with_script(
            code.clone(),
            vec![
                Op::Call { kind: CallKind::Call, to: OTHER, gas: 5_000, value: 1 },
                Op::StoreDepth(slot(1)),
            ],
        );
        let env = env_with(interpreter).with_vm_config(VmConfig {
            no_recursion: true,
            ..VmConfig::default()
        });
        let mut state = funded_state();
        state.insert_account(TARGET, Account { balance: 10, ..Account::with_code(code) });

        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 0));

        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 50_000);
        assert!(!state.exists(&OTHER));
        assert_eq!(state.storage(&TARGET, &slot(1)), word(1));
    }

    #[test]
    fn test_tracer_sees_only_top_level_frames() {
        let relay = b"relay".to_vec();
        let init = b"init".to_vec();
        let interpreter = ScriptInterpreter::new()
            .with_script(
                relay.clone(),
                vec![
                    Op::Call { kind: CallKind::Call, to: OTHER, gas: 10_000, value: 0 },
                    Op::Burn(100),
                    Op::Return(b"ok".to_vec()),
                ],
            )
            .with_script(init.clone(), vec![Op::Return(vec![0xAB; 10])]);
        let recorder = Arc::new(FrameRecorder::new());
        let env = env_with(interpreter).with_tracer(recorder.clone());
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(relay));

        with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, b"in", 50_000, 0));
        with_evm(&env, &mut state, |evm| evm.create(SENDER, &init, 100_000, 0));

        let frames = recorder.frames();
        assert_eq!(frames.len(), 2);

        assert_eq!((frames[0].from, frames[0].to), (SENDER, TARGET));
        assert!(!frames[0].create);
        assert_eq!(frames[0].input, b"in");
        assert_eq!(frames[0].gas, 50_000);
        assert_eq!(frames[0].output, b"ok");
        assert_eq!(frames[0].gas_used, 100);
        assert_eq!(frames[0].error, None);

        assert_eq!(frames[1].to, create_address(&SENDER, 0));
        assert!(frames[1].create);
        assert_eq!(frames[1].input, init);
        assert_eq!(frames[1].gas_used, 10 * CREATE_DATA_GAS);
    }

    #[test]
    fn test_tracer_reports_failed_frame() {
        let code = b"broken".to_vec();
        let interpreter = ScriptInterpreter::new().with_script(code.clone(), vec![Op::Fail]);
        let recorder = Arc::new(FrameRecorder::new());
        let env = env_with(interpreter).with_tracer(recorder.clone());
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(code));

        with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 30_000, 0));

        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].gas_used, 30_000);
        assert!(matches!(frames[0].error, Some(VmError::Interpreter(_))));
    }

    #[test]
    fn test_cancelled_frame_fails() {
        let code = b"writer".to_vec();
        let interpreter =
            ScriptInterpreter::new().with_script(code.clone(), vec![Op::SStore(slot(1), word(1))]);
        let env = env_with(interpreter);
        env.cancel.cancel();
        let mut state = funded_state();
        state.insert_account(TARGET, Account::with_code(code));

        let outcome = with_evm(&env, &mut state, |evm| evm.call(SENDER, TARGET, &[], 50_000, 5));

        assert_eq!(outcome.result, Err(VmError::Cancelled));
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(state.balance(&TARGET), 0);
        assert_eq!(state.storage(&TARGET, &slot(1)), ZERO_HASH);
    }
}
