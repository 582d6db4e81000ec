//! Native contracts at fixed addresses.
//!
//! A precompile is dispatched by the frame's code address before the
//! interpreter is consulted. It charges its gas up front from the frame;
//! a frame that cannot pay fails with `OutOfGas`.

use std::collections::BTreeMap;
use std::sync::Arc;

use corevm_primitives::{
    crypto::hash_sha256, types::address_from_low_u64, Address, VmError, ZERO_HASH,
};
use ripemd::{Digest, Ripemd160 as Ripemd160Hasher};

use crate::contract::Contract;

/// Native contract.
pub trait Precompile: Send + Sync {
    /// Gas charged for `input`.
    fn required_gas(&self, input: &[u8]) -> u64;

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, VmError>;
}

/// Gas for a base cost plus a cost per started 32-byte word.
fn word_gas(input: &[u8], base: u64, per_word: u64) -> u64 {
    let words = (input.len() as u64).div_ceil(32);
    base.saturating_add(words.saturating_mul(per_word))
}

/// SHA-256 hash of the input. Lives at address `0x02`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256;

impl Precompile for Sha256 {
    fn required_gas(&self, input: &[u8]) -> u64 {
        word_gas(input, 60, 12)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, VmError> {
        Ok(hash_sha256(input).to_vec())
    }
}

/// RIPEMD-160 hash of the input, left-padded to 32 bytes. Lives at
/// address `0x03`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ripemd160;

impl Precompile for Ripemd160 {
    fn required_gas(&self, input: &[u8]) -> u64 {
        word_gas(input, 600, 120)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, VmError> {
        let digest = Ripemd160Hasher::digest(input);
        let mut out = ZERO_HASH;
        out[12..].copy_from_slice(&digest);
        Ok(out.to_vec())
    }
}

/// Returns its input. Lives at address `0x04`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Precompile for Identity {
    fn required_gas(&self, input: &[u8]) -> u64 {
        word_gas(input, 15, 3)
    }

    fn run(&self, input: &[u8]) -> Result<Vec<u8>, VmError> {
        Ok(input.to_vec())
    }
}

/// Precompiles by address.
#[derive(Clone, Default)]
pub struct PrecompileSet {
    contracts: BTreeMap<Address, Arc<dyn Precompile>>,
}

impl PrecompileSet {
    /// Set with no precompiles.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `sha256` at `0x02`, `ripemd160` at `0x03` and `identity` at `0x04`.
    ///
    /// There is no `ecrecover` at `0x01`: senders sign with Ed25519.
    pub fn standard() -> Self {
        let mut set = Self::empty();
        set.insert(address_from_low_u64(2), Arc::new(Sha256));
        set.insert(address_from_low_u64(3), Arc::new(Ripemd160));
        set.insert(address_from_low_u64(4), Arc::new(Identity));
        set
    }

    pub fn insert(&mut self, address: Address, precompile: Arc<dyn Precompile>) {
        self.contracts.insert(address, precompile);
    }

    pub fn get(&self, address: &Address) -> Option<Arc<dyn Precompile>> {
        self.contracts.get(address).cloned()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.contracts.keys()
    }
}

impl core::fmt::Debug for PrecompileSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.contracts.keys()).finish()
    }
}

/// Charge the precompile's gas from `contract` and run it.
pub fn run_precompile(
    precompile: &dyn Precompile,
    input: &[u8],
    contract: &mut Contract,
) -> Result<Vec<u8>, VmError> {
    if !contract.use_gas(precompile.required_gas(input)) {
        return Err(VmError::OutOfGas);
    }
    precompile.run(input)
}
