//! Processing Adapter
//!
//! [`Processor`] is the single entry point sessions use to turn
//! `(buffer, chain)` into a new buffer. It validates the chain against the
//! parameter contract, hands it to a [`ProcessingEngine`], and checks what
//! comes back. It never touches session state.

mod builtin;
pub(crate) mod ffmpeg;

pub use builtin::BuiltinEngine;
pub use ffmpeg::{filter_graph, FfmpegEngine, ENGINE_EXIT, TOOL_UNAVAILABLE};

use tracing::{debug, warn};

use crate::dsp::{validate_chain, OperationChain};
use crate::engine::{AudioBuffer, CancelFlag};
use crate::error::{MixError, Result};

/// Error code for engine output containing NaN or infinite samples
pub const NON_FINITE_OUTPUT: &str = "NON_FINITE_OUTPUT";

/// An audio processing engine: applies a validated chain to a buffer.
///
/// Engines must be deterministic (same buffer and chain, same output) and
/// should return [`MixError::Cancelled`] promptly once the flag is raised.
pub trait ProcessingEngine: Send + Sync {
    /// Engine identifier
    fn name(&self) -> &str;

    /// Process `buffer` through `chain`, returning a new buffer
    fn process(&self, buffer: &AudioBuffer, chain: &OperationChain, cancel: &CancelFlag) -> Result<AudioBuffer>;
}

/// Validating wrapper around a processing engine
pub struct Processor {
    engine: Box<dyn ProcessingEngine>,
}

impl Processor {
    pub fn new(engine: Box<dyn ProcessingEngine>) -> Self {
        Self { engine }
    }

    /// Processor backed by the in-process engine
    pub fn builtin() -> Self {
        Self::new(Box::new(BuiltinEngine::new()))
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Run `chain` over `buffer`.
    ///
    /// An empty chain returns a copy of the input. Contract violations are
    /// reported before the engine is called.
    pub fn process(&self, buffer: &AudioBuffer, chain: &OperationChain, cancel: &CancelFlag) -> Result<AudioBuffer> {
        validate_chain(chain)?;
        cancel.check()?;

        if chain.is_empty() {
            return Ok(buffer.clone());
        }

        debug!(
            engine = self.engine.name(),
            ops = chain.len(),
            samples = buffer.num_samples(),
            "Dispatching chain"
        );

        let output = self
            .engine
            .process(buffer, chain, cancel)
            .map_err(|e| match e {
                MixError::Cancelled | MixError::EngineFailure { .. } | MixError::InvalidParameter { .. } => e,
                other => MixError::EngineFailure {
                    code: other.error_code().to_string(),
                    reason: other.to_string(),
                },
            })
            .inspect_err(|e| warn!(engine = self.engine.name(), error = %e, "Engine call failed"))?;

        if output.has_non_finite() {
            warn!(engine = self.engine.name(), "Engine produced non-finite samples");
            return Err(MixError::EngineFailure {
                code: NON_FINITE_OUTPUT.to_string(),
                reason: "output contains NaN or infinite samples".to_string(),
            });
        }

        Ok(output)
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::builtin()
    }
}
