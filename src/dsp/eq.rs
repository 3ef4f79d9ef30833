//! Biquad EQ and pass filters
//!
//! Coefficients follow the Audio EQ Cookbook
//! (https://www.w3.org/2011/audio/audio-eq-cookbook.html).

use std::f64::consts::PI;

use super::effect::Effect;
use super::operation::{OperationKind, OperationSpec};
use crate::engine::AudioBuffer;
use crate::error::{MixError, Result};

/// Q used for the Butterworth-style pass filters
const PASS_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Filter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    /// Bell curve boost/cut
    #[default]
    Peak,
    /// Boost/cut below frequency
    LowShelf,
    /// Boost/cut above frequency
    HighShelf,
    /// Remove above frequency
    LowPass,
    /// Remove below frequency
    HighPass,
}

impl FilterType {
    /// Parse the `filter` choice of an EQ spec
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice {
            "peak" => Some(FilterType::Peak),
            "low_shelf" => Some(FilterType::LowShelf),
            "high_shelf" => Some(FilterType::HighShelf),
            _ => None,
        }
    }
}

/// Normalized biquad coefficients (divided by a0)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Keep below Nyquist for low sample rates
        let freq = frequency.clamp(20.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peak => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Filter history for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// A single biquad band applied to every channel
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    coeffs: BiquadCoeffs,
}

impl Biquad {
    pub fn new(filter_type: FilterType, sample_rate: u32, frequency: f64, gain_db: f64, q: f64) -> Self {
        Self {
            filter_type,
            coeffs: BiquadCoeffs::calculate(filter_type, sample_rate as f64, frequency, gain_db, q),
        }
    }

    /// Build from an `eq`, `high_pass` or `low_pass` spec
    pub fn from_spec(spec: &OperationSpec, sample_rate: u32) -> Result<Self> {
        match spec.kind() {
            OperationKind::Eq => {
                let choice = spec.require_choice("filter")?;
                let filter_type =
                    FilterType::from_choice(choice).ok_or_else(|| MixError::InvalidParameter {
                        operation: spec.kind().id().to_string(),
                        param: "filter".to_string(),
                        value: choice.to_string(),
                        expected: "peak, low_shelf or high_shelf".to_string(),
                    })?;
                Ok(Self::new(
                    filter_type,
                    sample_rate,
                    spec.require_number("frequency")?,
                    spec.require_number("gain_db")?,
                    spec.require_number("q")?,
                ))
            }
            OperationKind::HighPass => Ok(Self::new(
                FilterType::HighPass,
                sample_rate,
                spec.require_number("frequency")?,
                0.0,
                PASS_Q,
            )),
            OperationKind::LowPass => Ok(Self::new(
                FilterType::LowPass,
                sample_rate,
                spec.require_number("frequency")?,
                0.0,
                PASS_Q,
            )),
            other => Err(MixError::EngineFailure {
                code: "UNSUPPORTED_OPERATION".to_string(),
                reason: format!("{} is not a filter", other),
            }),
        }
    }
}

impl Effect for Biquad {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        for channel in &mut buffer.samples {
            let mut state = BiquadState::default();
            for sample in channel.iter_mut() {
                *sample = state.process(*sample as f64, &self.coeffs) as f32;
            }
        }
    }

    fn effect_type(&self) -> &'static str {
        match self.filter_type {
            FilterType::HighPass => "high_pass",
            FilterType::LowPass => "low_pass",
            _ => "eq",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::operation::Stage;
    use crate::engine::{calculate_rms, generate_test_tone};
    use approx::assert_abs_diff_eq;

    fn rms_after(filter: FilterType, freq: f64, gain: f64, tone_hz: f32) -> f32 {
        let mut buffer = generate_test_tone(tone_hz, 0.5, 48000);
        let before = calculate_rms(&buffer);
        Biquad::new(filter, 48000, freq, gain, 0.707).process(&mut buffer);
        calculate_rms(&buffer) - before
    }

    #[test]
    fn test_high_shelf_boosts_highs_only() {
        let high = rms_after(FilterType::HighShelf, 10000.0, 6.0, 15000.0);
        let low = rms_after(FilterType::HighShelf, 10000.0, 6.0, 100.0);
        assert!(high > 4.0, "high tone gained {high} dB");
        assert_abs_diff_eq!(low, 0.0, epsilon = 0.5);
    }

    #[test]
    fn test_high_pass_removes_rumble() {
        let rumble = rms_after(FilterType::HighPass, 200.0, 0.0, 30.0);
        assert!(rumble < -10.0, "rumble only dropped {rumble} dB");
    }

    #[test]
    fn test_zero_gain_peak_is_transparent() {
        let delta = rms_after(FilterType::Peak, 1000.0, 0.0, 1000.0);
        assert_abs_diff_eq!(delta, 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_from_spec_rejects_unknown_shape() {
        let spec = OperationSpec::new(OperationKind::Eq, Stage::CreativeEq)
            .with_choice("filter", "notch")
            .with_number("frequency", 1000.0)
            .with_number("gain_db", 3.0)
            .with_number("q", 1.0);
        assert!(Biquad::from_spec(&spec, 48000).is_err());
    }
}
