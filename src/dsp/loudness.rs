//! Level and loudness
//!
//! `Gain` is a plain dB trim. `LoudnessNormalizer` approximates integrated
//! loudness with the ungated RMS level of the whole buffer, moves it onto the
//! target, then runs the limiter at the true-peak ceiling.

use super::dynamics::Limiter;
use super::effect::Effect;
use super::operation::OperationSpec;
use crate::engine::{calculate_rms, db_to_linear, AudioBuffer};
use crate::error::Result;

/// Largest correction the normalizer will apply, either direction
const MAX_CORRECTION_DB: f32 = 24.0;

/// Static gain in dB
#[derive(Debug, Clone)]
pub struct Gain {
    gain_db: f32,
}

impl Gain {
    pub fn new(gain_db: f32) -> Self {
        Self { gain_db }
    }

    pub fn from_spec(spec: &OperationSpec) -> Result<Self> {
        Ok(Self::new(spec.require_number("gain_db")? as f32))
    }
}

impl Effect for Gain {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        buffer.apply_gain(db_to_linear(self.gain_db));
    }

    fn effect_type(&self) -> &'static str {
        "gain"
    }
}

/// Normalise to a loudness target with a peak ceiling
#[derive(Debug, Clone)]
pub struct LoudnessNormalizer {
    target_lufs: f32,
    limiter: Limiter,
}

impl LoudnessNormalizer {
    pub fn new(target_lufs: f32, true_peak_db: f32, sample_rate: u32) -> Self {
        Self {
            target_lufs,
            limiter: Limiter::new(true_peak_db, sample_rate),
        }
    }

    pub fn from_spec(spec: &OperationSpec, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(
            spec.require_number("lufs")? as f32,
            spec.require_number("true_peak_db")? as f32,
            sample_rate,
        ))
    }
}

impl Effect for LoudnessNormalizer {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let measured = calculate_rms(buffer);
        // Silence stays silent
        if !measured.is_finite() {
            return;
        }
        let correction = (self.target_lufs - measured).clamp(-MAX_CORRECTION_DB, MAX_CORRECTION_DB);
        buffer.apply_gain(db_to_linear(correction));
        self.limiter.process(buffer);
    }

    fn effect_type(&self) -> &'static str {
        "loudness_target"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{calculate_peak, generate_test_tone, ChannelLayout};
    use approx::assert_relative_eq;

    #[test]
    fn test_gain_shifts_level() {
        let mut buffer = generate_test_tone(440.0, 0.2, 48000);
        let before = calculate_rms(&buffer);
        Gain::new(-6.0).process(&mut buffer);
        assert_relative_eq!(calculate_rms(&buffer), before - 6.0, epsilon = 0.01);
    }

    #[test]
    fn test_normalizer_hits_target_when_unclipped() {
        let mut buffer = generate_test_tone(440.0, 0.5, 48000);
        buffer.apply_gain(0.05);
        LoudnessNormalizer::new(-20.0, -1.0, 48000).process(&mut buffer);
        assert_relative_eq!(calculate_rms(&buffer), -20.0, epsilon = 0.05);
    }

    #[test]
    fn test_normalizer_respects_peak_ceiling() {
        let mut buffer = generate_test_tone(440.0, 0.5, 48000);
        LoudnessNormalizer::new(-5.0, -1.5, 48000).process(&mut buffer);
        assert!(calculate_peak(&buffer) <= -1.5 + 1e-3);
    }

    #[test]
    fn test_normalizer_leaves_silence() {
        let mut buffer = AudioBuffer::new(1024, ChannelLayout::Stereo, 48000);
        LoudnessNormalizer::new(-14.0, -1.0, 48000).process(&mut buffer);
        assert!(buffer.samples.iter().flatten().all(|&s| s == 0.0));
    }
}
