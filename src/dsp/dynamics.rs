//! Dynamics processors
//!
//! Feed-forward compressor with linked peak detection, and a look-ahead-free
//! brickwall limiter.

use super::effect::Effect;
use super::operation::OperationSpec;
use crate::engine::{db_to_linear, linear_to_db, AudioBuffer};
use crate::error::Result;

/// Floor used when converting silence to dB
const SILENCE_DB: f32 = -96.0;

/// Limiter attack in milliseconds (near-instant)
const LIMITER_ATTACK_MS: f32 = 0.1;

/// Limiter release in milliseconds
const LIMITER_RELEASE_MS: f32 = 50.0;

/// One-pole smoothing coefficient for a time constant
fn time_coeff(ms: f32, sample_rate: u32) -> f32 {
    let samples = ms / 1000.0 * sample_rate as f32;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

fn level_db(linear: f32) -> f32 {
    if linear > 0.0 {
        linear_to_db(linear)
    } else {
        SILENCE_DB
    }
}

// ============================================================================
// Compressor
// ============================================================================

/// Hard-knee feed-forward compressor
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl Compressor {
    pub fn new(threshold_db: f32, ratio: f32, attack_ms: f32, release_ms: f32, sample_rate: u32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack_coeff: time_coeff(attack_ms, sample_rate),
            release_coeff: time_coeff(release_ms, sample_rate),
        }
    }

    pub fn from_spec(spec: &OperationSpec, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(
            spec.require_number("threshold_db")? as f32,
            spec.require_number("ratio")? as f32,
            spec.require_number("attack_ms")? as f32,
            spec.require_number("release_ms")? as f32,
            sample_rate,
        ))
    }

    /// Static curve: gain change in dB (zero or negative) for an input level
    pub fn gain_reduction_db(&self, input_db: f32) -> f32 {
        if input_db <= self.threshold_db {
            0.0
        } else {
            (self.threshold_db + (input_db - self.threshold_db) / self.ratio) - input_db
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let num_channels = buffer.num_channels();
        let mut gain = 1.0_f32;

        for frame in 0..buffer.num_samples() {
            let peak = (0..num_channels)
                .map(|ch| buffer.samples[ch][frame].abs())
                .fold(0.0_f32, f32::max);

            let target = db_to_linear(self.gain_reduction_db(level_db(peak)));
            let coeff = if target < gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            gain = coeff * gain + (1.0 - coeff) * target;

            for ch in 0..num_channels {
                buffer.samples[ch][frame] *= gain;
            }
        }
    }

    fn effect_type(&self) -> &'static str {
        "compression"
    }
}

// ============================================================================
// Limiter
// ============================================================================

/// Brickwall peak limiter
#[derive(Debug, Clone)]
pub struct Limiter {
    ceiling_db: f32,
    ceiling_linear: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl Limiter {
    pub fn new(ceiling_db: f32, sample_rate: u32) -> Self {
        Self {
            ceiling_db,
            ceiling_linear: db_to_linear(ceiling_db),
            attack_coeff: time_coeff(LIMITER_ATTACK_MS, sample_rate),
            release_coeff: time_coeff(LIMITER_RELEASE_MS, sample_rate),
        }
    }

    pub fn from_spec(spec: &OperationSpec, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(spec.require_number("ceiling_db")? as f32, sample_rate))
    }
}

impl Effect for Limiter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let num_channels = buffer.num_channels();
        // Gain reduction in dB, positive
        let mut envelope = 0.0_f32;

        for frame in 0..buffer.num_samples() {
            let peak = (0..num_channels)
                .map(|ch| buffer.samples[ch][frame].abs())
                .fold(0.0_f32, f32::max);

            let target = if peak > self.ceiling_linear {
                (linear_to_db(peak) - self.ceiling_db).max(0.0)
            } else {
                0.0
            };
            let coeff = if target > envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            envelope = coeff * envelope + (1.0 - coeff) * target;

            let gain = db_to_linear(-envelope);
            for ch in 0..num_channels {
                let sample = &mut buffer.samples[ch][frame];
                *sample *= gain;
                // The envelope lags by the attack time; clip what gets through
                if sample.abs() > self.ceiling_linear {
                    *sample = sample.signum() * self.ceiling_linear;
                }
            }
        }
    }

    fn effect_type(&self) -> &'static str {
        "limiter"
    }
}
