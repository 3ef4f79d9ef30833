//! Effect trait for the builtin engine
//!
//! Each operation kind is rendered by one effect. Effects are built fresh
//! from an [`OperationSpec`](crate::dsp::OperationSpec) for every engine call
//! and carry no state between calls, which keeps processing deterministic.

use crate::engine::AudioBuffer;

/// A DSP effect that processes a buffer in place
pub trait Effect: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Effect type identifier (matches the operation kind id)
    fn effect_type(&self) -> &'static str;
}
