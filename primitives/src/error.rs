//! Error types for the corevm execution layer.
//!
//! Errors are split by the layer that resolves them:
//!
//! - [`VmError`]: call-frame failures. Always resolved inside the dispatcher
//!   by reverting to the frame's snapshot; the enclosing transaction is still
//!   included with a failed receipt.
//! - [`TxError`]: pre-flight rejections detected before the dispatcher runs.
//!   These abort processing of the whole block.
//! - [`BlockError`]: block-level failures reported by the executor and the
//!   post-execution validator.

use crate::types::{Address, Hash, Wei};

/// Call-frame failure raised by the dispatcher, a precompile or the
/// bytecode interpreter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// The call stack is deeper than the configured maximum.
    #[error("max call depth exceeded")]
    DepthExceeded,

    /// The caller cannot cover the transferred value.
    #[error("insufficient balance for transfer")]
    InsufficientBalance,

    /// A contract already lives at the derived creation address.
    #[error("contract address collision")]
    AddressCollision,

    /// The frame ran out of gas.
    #[error("out of gas")]
    OutOfGas,

    /// Not enough gas left to pay for storing the created code.
    #[error("contract creation code storage out of gas")]
    CodeStoreOutOfGas,

    /// Init code returned runtime code above the size limit.
    #[error("max code size exceeded")]
    MaxCodeSizeExceeded,

    /// A state mutation was attempted inside a read-only (static) context.
    #[error("write protection")]
    WriteProtection,

    /// Execution was aborted through the cancellation token.
    #[error("execution cancelled")]
    Cancelled,

    /// Voluntary abort signalled by the code. Carries the revert data.
    #[error("execution reverted")]
    Reverted(Vec<u8>),

    /// The creator's nonce cannot be incremented.
    #[error("nonce has max value")]
    NonceOverflow,

    /// Any other failure reported by the bytecode interpreter.
    #[error("interpreter error: {0}")]
    Interpreter(String),
}

impl VmError {
    /// Returns true for the explicit revert outcome, the only failure that
    /// hands unused gas back to the caller.
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted(_))
    }
}

/// Failure of a checked gas pool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GasPoolError {
    /// The pool holds less gas than requested.
    #[error("gas limit reached: available {available}, requested {requested}")]
    Exhausted { available: u64, requested: u64 },

    /// Returning gas would overflow the pool counter.
    #[error("gas pool overflow")]
    Overflow,
}

/// Pre-flight rejection of a transaction.
///
/// Any of these aborts processing of the remaining block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    /// The signature does not verify or the sender cannot be recovered.
    #[error("invalid transaction signature")]
    InvalidSignature,

    /// Transaction nonce is below the sender's account nonce.
    #[error("nonce too low: state {state}, tx {tx}")]
    NonceTooLow { state: u64, tx: u64 },

    /// Transaction nonce is above the sender's account nonce.
    #[error("nonce too high: state {state}, tx {tx}")]
    NonceTooHigh { state: u64, tx: u64 },

    /// The sender's nonce cannot be incremented any further.
    #[error("nonce has max value: address {address:02x?}, nonce {nonce}")]
    NonceMax { address: Address, nonce: u64 },

    /// Sender balance does not cover `gas * price + value`.
    #[error("insufficient funds for gas * price + value: have {have}, want {want}")]
    InsufficientFunds { have: Wei, want: Wei },

    /// The block gas pool cannot cover the transaction's gas limit.
    #[error("block gas pool exhausted: {0}")]
    GasPoolExhausted(GasPoolError),

    /// The gas limit does not cover the intrinsic cost.
    #[error("intrinsic gas too low: have {have}, want {want}")]
    IntrinsicGas { have: u64, want: u64 },

    /// Gas or value arithmetic overflowed.
    #[error("gas arithmetic overflow")]
    GasOverflow,
}

impl From<GasPoolError> for TxError {
    fn from(err: GasPoolError) -> Self {
        Self::GasPoolExhausted(err)
    }
}

/// Block-level failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// The header is structurally invalid.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A transaction was rejected pre-flight; the block is invalid.
    #[error("could not apply tx {index}: {source}")]
    Transaction {
        index: usize,
        #[source]
        source: TxError,
    },

    /// Header gas used disagrees with execution.
    #[error("invalid gas used: header {header}, computed {computed}")]
    GasUsedMismatch { header: u64, computed: u64 },

    /// Header bloom disagrees with the receipts.
    #[error("invalid bloom")]
    BloomMismatch,

    /// Header state root disagrees with execution.
    #[error("invalid state root: header {header:02x?}, computed {computed:02x?}")]
    StateRootMismatch { header: Hash, computed: Hash },
}

/// Failure to decode a wire-encoded value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Input ended before the value was complete.
    #[error("unexpected end of data")]
    UnexpectedEnd,

    /// A tag or flag byte held an unknown value.
    #[error("invalid {field} flag: {value}")]
    InvalidFlag { field: &'static str, value: u8 },

    /// A length prefix does not fit the platform's address space.
    #[error("length prefix too large: {0}")]
    LengthOverflow(u64),

    /// Bytes were left over after decoding.
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}
