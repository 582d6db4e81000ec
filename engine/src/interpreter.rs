//! Seam between the dispatcher and a bytecode interpreter.
//!
//! The dispatcher never decodes instructions itself. For every frame with
//! code it hands the frame to an [`Interpreter`], which may recurse into
//! the dispatcher through the `&mut Evm` it receives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use corevm_primitives::VmError;

use crate::contract::Contract;
use crate::evm::Evm;

/// Executes contract code.
///
/// Implementations charge gas through [`Contract::use_gas`], mutate state
/// through [`Evm::set_storage`] and [`Evm::emit_log`] so the read-only
/// flag is honoured, and should poll [`Evm::is_cancelled`] between
/// instructions. Returning [`VmError::Reverted`] keeps the frame's
/// remaining gas; any other error consumes it.
pub trait Interpreter: Send + Sync {
    fn run(
        &self,
        evm: &mut Evm<'_>,
        contract: &mut Contract,
        input: &[u8],
    ) -> Result<Vec<u8>, VmError>;
}

/// Interpreter for chains without contract code: any code succeeds
/// immediately with empty output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterpreter;

impl Interpreter for NoopInterpreter {
    fn run(
        &self,
        _evm: &mut Evm<'_>,
        _contract: &mut Contract,
        _input: &[u8],
    ) -> Result<Vec<u8>, VmError> {
        Ok(Vec::new())
    }
}

/// Cooperative abort flag shared between the dispatcher and other threads.
///
/// Cloning shares the flag. Setting it is idempotent and may happen from
/// any thread; the dispatcher observes it at the next frame entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that running execution stops.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_and_idempotent() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel())
            .join()
            .unwrap();
        assert!(token.is_cancelled());
    }
}
