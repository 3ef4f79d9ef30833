//! Transcoders: encode a buffer into a file of a given format

use std::path::{Path, PathBuf};

use super::ExportFormat;
use crate::engine::{write_wav, AudioBuffer};
use crate::error::{MixError, Result};
use crate::processing::ffmpeg::{run_ffmpeg, ScratchDir};

/// Bit depth of exported WAV files
pub const WAV_EXPORT_BIT_DEPTH: u16 = 24;

/// Encodes audio into a target format
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this transcoder can produce `format`
    fn supports(&self, format: ExportFormat) -> bool;

    /// Write `buffer` to `path`. `bitrate_kbps` is ignored by lossless formats.
    fn transcode(&self, buffer: &AudioBuffer, path: &Path, format: ExportFormat, bitrate_kbps: u32) -> Result<()>;
}

/// In-process 24-bit WAV writer
#[derive(Debug, Default, Clone)]
pub struct WavTranscoder;

impl Transcoder for WavTranscoder {
    fn name(&self) -> &str {
        "wav"
    }

    fn supports(&self, format: ExportFormat) -> bool {
        format == ExportFormat::Wav
    }

    fn transcode(&self, buffer: &AudioBuffer, path: &Path, format: ExportFormat, _bitrate_kbps: u32) -> Result<()> {
        if !self.supports(format) {
            return Err(MixError::UnsupportedFormat {
                format: format.extension().to_string(),
            });
        }
        write_wav(buffer, path, WAV_EXPORT_BIT_DEPTH)
    }
}

/// Encoder backed by the ffmpeg binary
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn args(input: &Path, output: &Path, format: ExportFormat, bitrate_kbps: u32) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-c:a".to_string(),
            format.codec().to_string(),
        ];
        if format.is_lossy() {
            args.push("-b:a".to_string());
            args.push(format!("{}k", bitrate_kbps));
        }
        args.push("-f".to_string());
        args.push(format.muxer().to_string());
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, format: ExportFormat) -> bool {
        format != ExportFormat::Wav
    }

    fn transcode(&self, buffer: &AudioBuffer, path: &Path, format: ExportFormat, bitrate_kbps: u32) -> Result<()> {
        let scratch = ScratchDir::create()?;
        let input = scratch.path().join("export.wav");
        write_wav(buffer, &input, 32)?;

        let args = Self::args(&input, path, format, bitrate_kbps);
        run_ffmpeg(&self.ffmpeg_path, &args, scratch.path(), None).map_err(|e| match e {
            MixError::EngineFailure { reason, .. } => MixError::TranscodeFailed { reason },
            other => other,
        })
    }
}
