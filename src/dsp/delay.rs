//! Delay Effect
//!
//! Feedback delay per channel with a dry/wet mix.

use super::effect::Effect;
use super::operation::OperationSpec;
use crate::engine::AudioBuffer;
use crate::error::Result;

/// Feedback delay line
#[derive(Debug, Clone)]
pub struct Delay {
    /// Delay time in samples (at least one)
    delay_samples: usize,
    /// Feedback amount (0-0.95)
    feedback: f32,
    /// Wet proportion (0-1)
    mix: f32,
}

impl Delay {
    pub fn new(time_ms: f32, feedback: f32, mix: f32, sample_rate: u32) -> Self {
        let delay_samples = ((time_ms / 1000.0) * sample_rate as f32).round().max(1.0) as usize;
        Self {
            delay_samples,
            feedback: feedback.clamp(0.0, 0.95),
            mix: mix.clamp(0.0, 1.0),
        }
    }

    pub fn from_spec(spec: &OperationSpec, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(
            spec.require_number("time_ms")? as f32,
            spec.require_number("feedback")? as f32,
            spec.require_number("mix")? as f32,
            sample_rate,
        ))
    }
}

impl Effect for Delay {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        let dry = 1.0 - self.mix;
        for channel in &mut buffer.samples {
            let mut line = vec![0.0_f32; self.delay_samples];
            let mut pos = 0;
            for sample in channel.iter_mut() {
                let input = *sample;
                let delayed = line[pos];
                line[pos] = input + delayed * self.feedback;
                pos = (pos + 1) % self.delay_samples;
                *sample = input * dry + delayed * self.mix;
            }
        }
    }

    fn effect_type(&self) -> &'static str {
        "delay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;
    use approx::assert_relative_eq;

    #[test]
    fn test_echo_lands_at_delay_time() {
        let mut buffer = AudioBuffer::new(1000, ChannelLayout::Mono, 1000);
        buffer.samples[0][0] = 1.0;
        Delay::new(250.0, 0.5, 0.5, 1000).process(&mut buffer);

        let out = &buffer.samples[0];
        assert_relative_eq!(out[0], 0.5);
        assert_relative_eq!(out[250], 0.5);
        assert_relative_eq!(out[500], 0.25);
        assert_eq!(out[100], 0.0);
    }

    #[test]
    fn test_zero_feedback_single_echo() {
        let mut buffer = AudioBuffer::new(1000, ChannelLayout::Mono, 1000);
        buffer.samples[0][0] = 1.0;
        Delay::new(100.0, 0.0, 1.0, 1000).process(&mut buffer);
        assert_eq!(buffer.samples[0][0], 0.0);
        assert_eq!(buffer.samples[0][100], 1.0);
        assert_eq!(buffer.samples[0][200], 0.0);
    }
}
