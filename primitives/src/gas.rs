//! Gas schedule constants and the block-scoped gas pool.
//!
//! The pool bounds the total gas all transactions of one block may reserve.
//! It is passed explicitly through the pipeline and only changes through
//! checked `sub_gas` / `add_gas`.

use crate::error::GasPoolError;

// ── Gas schedule ──

/// Base cost of every transaction.
pub const TX_GAS: u64 = 21_000;

/// Base cost of a contract-creating transaction from Homestead on.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;

/// Cost per zero byte of transaction data.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Cost per non-zero byte of transaction data.
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

/// Cost per byte of code stored by a successful creation.
pub const CREATE_DATA_GAS: u64 = 200;

/// Maximum depth of nested calls and creations.
pub const CALL_CREATE_DEPTH: usize = 1024;

/// Maximum size of deployed runtime code.
pub const MAX_CODE_SIZE: usize = 24_576;

/// Compute the intrinsic gas of a transaction carrying `data`.
///
/// Returns `None` on overflow.
pub fn intrinsic_gas(data: &[u8], contract_creation: bool, homestead: bool) -> Option<u64> {
    let base = if contract_creation && homestead {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    if data.is_empty() {
        return Some(base);
    }

    let non_zero = data.iter().filter(|b| **b != 0).count() as u64;
    let zero = data.len() as u64 - non_zero;

    base.checked_add(non_zero.checked_mul(TX_DATA_NON_ZERO_GAS)?)?
        .checked_add(zero.checked_mul(TX_DATA_ZERO_GAS)?)
}

/// Gas available to the transactions of one block.
///
/// Starts at the block gas limit, shrinks by each transaction's gas limit
/// before execution and grows again by the unused part afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasPool(u64);

impl GasPool {
    /// Create a pool holding `gas`.
    pub fn new(gas: u64) -> Self {
        Self(gas)
    }

    /// Make `amount` gas available again.
    pub fn add_gas(&mut self, amount: u64) -> Result<(), GasPoolError> {
        self.0 = self.0.checked_add(amount).ok_or(GasPoolError::Overflow)?;
        Ok(())
    }

    /// Reserve `amount` gas.
    ///
    /// The pool is left untouched when it cannot cover the request.
    pub fn sub_gas(&mut self, amount: u64) -> Result<(), GasPoolError> {
        if self.0 < amount {
            return Err(GasPoolError::Exhausted {
                available: self.0,
                requested: amount,
            });
        }
        self.0 -= amount;
        Ok(())
    }

    /// Gas still available in the pool.
    pub fn gas(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for GasPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
