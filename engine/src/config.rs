//! Chain and dispatcher configuration.
//!
//! Both structs deserialize from JSON (or any serde format) with every
//! field optional; missing fields take their `Default` values.

use corevm_primitives::{
    gas::{CALL_CREATE_DEPTH, MAX_CODE_SIZE},
    BlockNumber,
};
use serde::Deserialize;

/// Chain-wide parameters that select the consensus ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain id bound into every transaction signature.
    pub chain_id: u64,

    /// First block running Homestead rules; `None` never activates them.
    pub homestead_block: Option<BlockNumber>,
}

impl ChainConfig {
    /// Returns true if `number` is at or after the Homestead fork.
    pub fn is_homestead(&self, number: BlockNumber) -> bool {
        self.homestead_block.is_some_and(|fork| number >= fork)
    }

    /// Ruleset active at block `number`.
    pub fn rules(&self, number: BlockNumber) -> Rules {
        Rules {
            chain_id: self.chain_id,
            is_homestead: self.is_homestead(number),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            homestead_block: Some(0),
        }
    }
}

/// Ruleset flags resolved for a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    pub chain_id: u64,
    pub is_homestead: bool,
}

/// Dispatcher limits and switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Skip every nested call and creation, returning success with the gas
    /// untouched. Top-level frames still run.
    pub no_recursion: bool,

    /// Deepest nesting level a frame may be entered at.
    /// Default: 1024.
    pub max_call_depth: usize,

    /// Largest code a creation may install, in bytes.
    /// Default: 24 576.
    pub max_code_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            no_recursion: false,
            max_call_depth: CALL_CREATE_DEPTH,
            max_code_size: MAX_CODE_SIZE,
        }
    }
}
