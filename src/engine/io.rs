//! Audio file I/O
//!
//! Reads source WAV files into [`AudioBuffer`]s and writes buffers back out.
//! Sources keep their native sample rate; nothing is resampled on import so
//! version 0 is bit-for-bit the decoded source.

use std::fs;
use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sha2::{Digest, Sha256};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{MixError, Result};

/// Import a WAV file as 32-bit float
///
/// # Errors
/// * `SourceNotFound` - the path does not exist
/// * `InvalidAudio` - not a readable WAV file, more than two channels, or no samples
pub fn import_audio(path: &Path) -> Result<AudioBuffer> {
    if !path.is_file() {
        return Err(MixError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| MixError::InvalidAudio {
        reason: format!("Failed to open WAV file {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
        MixError::InvalidAudio {
            reason: format!("{}-channel audio (only mono/stereo supported)", spec.channels),
            source: None,
        }
    })?;

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let buffer = AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)?;

    if buffer.is_empty() {
        return Err(MixError::InvalidAudio {
            reason: format!("{} contains no samples", path.display()),
            source: None,
        });
    }

    Ok(buffer)
}

/// Write a buffer as a WAV file with the given bit depth (16, 24 or 32 float)
pub fn write_wav(buffer: &AudioBuffer, path: &Path, bit_depth: u16) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.num_channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    let write_err = |e: hound::Error| MixError::WriteFailure {
        path: path.to_path_buf(),
        source: hound_to_io(e),
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    let interleaved = buffer.to_interleaved();

    match bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(write_err)?;
            }
        }
        32 => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(write_err)?;
            }
        }
        _ => {
            return Err(MixError::UnsupportedFormat {
                format: format!("{}-bit WAV (only 16, 24, 32 supported)", bit_depth),
            });
        }
    }

    writer.finalize().map_err(write_err)?;
    Ok(())
}

/// SHA-256 of a file's bytes, hex encoded
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|_| MixError::SourceNotFound {
        path: path.to_path_buf(),
    })?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Generate a mono sine wave
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = 0.5 * (angular_freq * i as f32).sin();
    }

    buffer
}

/// Generate a stereo test tone with a different frequency per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Stereo, sample_rate);

    for (ch, freq) in [freq_left, freq_right].into_iter().enumerate() {
        let angular_freq = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        for (i, sample) in buffer.samples[ch].iter_mut().enumerate() {
            *sample = 0.5 * (angular_freq * i as f32).sin();
        }
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn hound_to_io(e: hound::Error) -> std::io::Error {
    match e {
        hound::Error::IoError(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |bits: u16| {
        move |e: hound::Error| MixError::InvalidAudio {
            reason: format!("Failed to read {}-bit samples: {}", bits, e),
            source: Some(Box::new(e)),
        }
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(bits_per_sample)),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(MixError::InvalidAudio {
                        reason: format!("{}-bit integer audio", bits_per_sample),
                        source: None,
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(invalid(bits_per_sample))
        }
    }
}
