//! In-process reference engine

use tracing::trace;

use super::ProcessingEngine;
use crate::dsp::{build_effect, OperationChain};
use crate::engine::{AudioBuffer, CancelFlag};
use crate::error::Result;

/// Renders chains with the builtin DSP effects, one operation after another.
///
/// Deterministic: effects are rebuilt from their specs on every call, so no
/// filter state leaks between calls.
#[derive(Debug, Default, Clone)]
pub struct BuiltinEngine;

impl BuiltinEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessingEngine for BuiltinEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    fn process(&self, buffer: &AudioBuffer, chain: &OperationChain, cancel: &CancelFlag) -> Result<AudioBuffer> {
        let mut output = buffer.clone();
        for spec in chain {
            cancel.check()?;
            let mut effect = build_effect(spec, output.sample_rate)?;
            trace!(effect = effect.effect_type(), "Applying");
            effect.process(&mut output);
        }
        cancel.check()?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{OperationKind, OperationSpec, Stage};
    use crate::engine::{calculate_rms, generate_stereo_test_tone};
    use crate::error::MixError;
    use approx::assert_abs_diff_eq;

    fn master_chain() -> OperationChain {
        OperationChain::canonical(vec![
            OperationSpec::new(OperationKind::HighPass, Stage::CorrectiveEq).with_number("frequency", 30.0),
            OperationSpec::new(OperationKind::Compression, Stage::Dynamics)
                .with_number("threshold_db", -18.0)
                .with_number("ratio", 3.0)
                .with_number("attack_ms", 10.0)
                .with_number("release_ms", 100.0),
            OperationSpec::new(OperationKind::Reverb, Stage::TimeBased)
                .with_number("room_size", 0.5)
                .with_number("damping", 0.5)
                .with_number("wet", 0.3)
                .with_number("decay_s", 1.5),
            OperationSpec::new(OperationKind::LoudnessTarget, Stage::Loudness)
                .with_number("lufs", -14.0)
                .with_number("true_peak_db", -1.5),
        ])
    }

    #[test]
    fn test_deterministic_output() {
        let engine = BuiltinEngine::new();
        let input = generate_stereo_test_tone(220.0, 330.0, 0.3, 44100);
        let a = engine.process(&input, &master_chain(), &CancelFlag::new()).unwrap();
        let b = engine.process(&input, &master_chain(), &CancelFlag::new()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, input);
    }

    #[test]
    fn test_input_not_modified() {
        let engine = BuiltinEngine::new();
        let input = generate_stereo_test_tone(220.0, 330.0, 0.3, 44100);
        let copy = input.clone();
        let out = engine.process(&input, &master_chain(), &CancelFlag::new()).unwrap();
        assert_eq!(input, copy);
        assert_abs_diff_eq!(calculate_rms(&out), -14.0, epsilon = 0.5);
    }

    #[test]
    fn test_cancelled_between_operations() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let input = generate_stereo_test_tone(220.0, 330.0, 0.1, 44100);
        let err = BuiltinEngine::new().process(&input, &master_chain(), &cancel).unwrap_err();
        assert!(matches!(err, MixError::Cancelled));
    }
}
