//! Observers of a transaction's outermost frame.
//!
//! A [`Tracer`] installed on the environment sees the start and the end of
//! every frame entered at depth 0: the top-level call or creation of each
//! transaction. Nested frames are not reported.

use std::sync::Mutex;
use std::time::Duration;

use corevm_primitives::{Address, VmError, Wei};

/// Hooks around the top-level frame.
///
/// The dispatcher holds a shared reference, so implementations that record
/// need interior mutability.
pub trait Tracer: Send + Sync {
    /// The frame is about to run. For creations `to` is the new address
    /// and `input` the init code.
    fn capture_start(
        &self,
        from: Address,
        to: Address,
        create: bool,
        input: &[u8],
        gas: u64,
        value: Wei,
    );

    /// The frame has settled. `gas_used` includes gas consumed by a
    /// failure.
    fn capture_end(
        &self,
        output: &[u8],
        gas_used: u64,
        elapsed: Duration,
        error: Option<&VmError>,
    );
}

/// One reported frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameTrace {
    pub from: Address,
    pub to: Address,
    pub create: bool,
    pub input: Vec<u8>,
    pub gas: u64,
    pub value: Wei,
    /// Filled in by `capture_end`.
    pub output: Vec<u8>,
    pub gas_used: u64,
    pub error: Option<VmError>,
}

/// Tracer keeping every top-level frame in memory.
#[derive(Debug, Default)]
pub struct FrameRecorder {
    frames: Mutex<Vec<FrameTrace>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames reported so far, oldest first.
    pub fn frames(&self) -> Vec<FrameTrace> {
        self.frames.lock().map(|frames| frames.clone()).unwrap_or_default()
    }
}

impl Tracer for FrameRecorder {
    fn capture_start(
        &self,
        from: Address,
        to: Address,
        create: bool,
        input: &[u8],
        gas: u64,
        value: Wei,
    ) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(FrameTrace {
                from,
                to,
                create,
                input: input.to_vec(),
                gas,
                value,
                output: Vec::new(),
                gas_used: 0,
                error: None,
            });
        }
    }

    fn capture_end(
        &self,
        output: &[u8],
        gas_used: u64,
        elapsed: Duration,
        error: Option<&VmError>,
    ) {
        let Ok(mut frames) = self.frames.lock() else {
            return;
        };
        if let Some(frame) = frames.last_mut() {
            frame.output = output.to_vec();
            frame.gas_used = gas_used;
            frame.error = error.cloned();
        }
        tracing::trace!(gas_used, ?elapsed, "top-level frame recorded");
    }
}
