//! Block validation before and after execution.
//!
//! `validate_header` rejects headers that cannot be executed at all.
//! `validate_state` compares what the header claims with what execution
//! actually produced.

use corevm_primitives::{bloom::create_bloom, Block, BlockError, BlockHeader};

use crate::executor::BlockOutcome;

/// Structural checks on a header.
pub fn validate_header(header: &BlockHeader) -> Result<(), BlockError> {
    if header.gas_limit == 0 {
        return Err(BlockError::InvalidHeader("gas_limit must be > 0".into()));
    }
    if header.gas_used > header.gas_limit {
        return Err(BlockError::InvalidHeader(format!(
            "gas_used {} exceeds gas_limit {}",
            header.gas_used, header.gas_limit
        )));
    }
    Ok(())
}

/// Check the header's gas used, bloom and state root against `outcome`.
pub fn validate_state(block: &Block, outcome: &BlockOutcome) -> Result<(), BlockError> {
    let header = &block.header;
    if header.gas_used != outcome.gas_used {
        return Err(BlockError::GasUsedMismatch {
            header: header.gas_used,
            computed: outcome.gas_used,
        });
    }
    if header.bloom != create_bloom(&outcome.receipts) {
        return Err(BlockError::BloomMismatch);
    }
    if header.state_root != outcome.state_root {
        return Err(BlockError::StateRootMismatch {
            header: header.state_root,
            computed: outcome.state_root,
        });
    }
    Ok(())
}
