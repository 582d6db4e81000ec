//! `corevm-engine`: deterministic transaction execution core.
//!
//! This crate implements the state transition of a block:
//! `f(state, block) → (state', receipts, logs, gas_used, state_root)`
//!
//! It applies signed transactions one after another through a call
//! dispatcher that runs precompiles and hands contract code to a pluggable
//! bytecode interpreter.
//!
//! ## Architecture
//!
//! - [`state::StateDb`]: journaled world state accessor; [`state::MemoryState`]
//!   is the in-memory implementation
//! - [`context`]: per-transaction execution context and transfer policies
//! - [`evm::Evm`]: call dispatcher (call, call code, delegate call, static
//!   call, create)
//! - [`interpreter::Interpreter`]: seam for bytecode execution
//! - [`tracer::Tracer`]: observer of each transaction's top-level frame
//! - [`precompiles`]: native contracts
//! - [`transaction`]: sender recovery, gas purchase, refunds, receipts
//! - [`executor::BlockExecutor`]: top-level block execution entry point
//! - [`validation`]: header checks and post-execution consistency checks

pub mod config;
pub mod state;
pub mod context;
pub mod contract;
pub mod interpreter;
pub mod precompiles;
pub mod evm;
pub mod tracer;
pub mod transaction;
pub mod executor;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export key types for convenience
pub use config::{ChainConfig, Rules, VmConfig};
pub use context::{new_execution_context, BlockHashes, ExecutionContext, NoHistory};
pub use contract::Contract;
pub use evm::{CallKind, Evm, EvmEnv, FrameOutcome};
pub use executor::{BlockExecutor, BlockOutcome, ConsensusEngine, FixedRewardEngine, NoopEngine};
pub use interpreter::{CancelToken, Interpreter, NoopInterpreter};
pub use precompiles::{Precompile, PrecompileSet};
pub use state::{Account, MemoryState, StateDb};
pub use tracer::{FrameRecorder, FrameTrace, Tracer};
pub use transaction::{
    apply_message, apply_transaction, Ed25519Signer, ExecutionResult, Message, Signer,
    StateTransition,
};
