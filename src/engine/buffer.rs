//! Audio Buffer
//!
//! Non-interleaved 32-bit float audio, the unit every version of a session
//! holds and every processing engine consumes and produces.

use crate::error::{MixError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `f32::NEG_INFINITY` for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// RMS level of a buffer in dB, across all channels
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Peak level of a buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    Mono,
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Audio stored as one `Vec<f32>` per channel.
///
/// # Example
/// ```
/// use mix_engineer::engine::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(48000, ChannelLayout::Stereo, 48000);
/// assert_eq!(buffer.num_channels(), 2);
/// assert_eq!(buffer.num_samples(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(MixError::InvalidAudio {
                reason: format!(
                    "{} interleaved samples do not divide into {} channels",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let frames = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Interleave channels (L, R, L, R, ...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.num_samples();
        let channels = self.num_channels();
        let mut out = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            for ch in 0..channels {
                out.push(self.samples[ch][i]);
            }
        }
        out
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples per channel
    pub fn num_samples(&self) -> usize {
        self.samples.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    pub fn layout(&self) -> ChannelLayout {
        ChannelLayout::from_count(self.num_channels()).unwrap_or_default()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.samples[ch]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.samples[ch]
    }

    /// Absolute peak across all channels (linear)
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Multiply every sample by a linear gain
    pub fn apply_gain(&mut self, gain: f32) {
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// True if any sample is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .any(|s| !s.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_conversions() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        assert_relative_eq!(db_to_linear(-6.0), 0.501187, epsilon = 1e-5);
        assert_relative_eq!(linear_to_db(1.0), 0.0);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_interleave_round_trip() {
        let interleaved = vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buffer = AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, 44100)
            .unwrap();
        assert_eq!(buffer.num_samples(), 3);
        assert_eq!(buffer.channel(1), &[-0.1, -0.2, -0.3]);
        assert_eq!(buffer.to_interleaved(), interleaved);
    }

    #[test]
    fn test_from_interleaved_rejects_ragged_data() {
        let result = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], ChannelLayout::Stereo, 44100);
        assert!(matches!(result, Err(MixError::InvalidAudio { .. })));
    }

    #[test]
    fn test_peak_and_rms() {
        let mut buffer = AudioBuffer::new(4, ChannelLayout::Mono, 48000);
        buffer.channel_mut(0).copy_from_slice(&[0.5, -0.5, 0.5, -0.5]);
        assert_relative_eq!(buffer.peak(), 0.5);
        assert_relative_eq!(calculate_rms(&buffer), linear_to_db(0.5), epsilon = 1e-4);
        assert_relative_eq!(calculate_peak(&buffer), linear_to_db(0.5), epsilon = 1e-4);
    }

    #[test]
    fn test_non_finite_detection() {
        let mut buffer = AudioBuffer::new(4, ChannelLayout::Stereo, 48000);
        assert!(!buffer.has_non_finite());
        buffer.channel_mut(1)[2] = f32::NAN;
        assert!(buffer.has_non_finite());
    }
}
