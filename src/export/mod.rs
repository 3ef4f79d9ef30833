//! Export Adapter
//!
//! Writes a version's buffer to a user-facing file. The format comes from the
//! output extension; WAV is written in-process, everything else goes through
//! an external transcoder. Output appears atomically: the encoder writes a
//! hidden sibling file that is renamed into place only on success.

mod transcode;

pub use transcode::{FfmpegTranscoder, Transcoder, WavTranscoder, WAV_EXPORT_BIT_DEPTH};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::AudioBuffer;
use crate::error::{MixError, Result};

/// Bitrate used for lossy formats when none is given
pub const DEFAULT_BITRATE_KBPS: u32 = 320;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    M4a,
}

impl ExportFormat {
    /// Format for a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext {
            "wav" => Ok(ExportFormat::Wav),
            "mp3" => Ok(ExportFormat::Mp3),
            "flac" => Ok(ExportFormat::Flac),
            "ogg" => Ok(ExportFormat::Ogg),
            "m4a" => Ok(ExportFormat::M4a),
            other => Err(MixError::UnsupportedFormat {
                format: if other.is_empty() {
                    "(no extension)".to_string()
                } else {
                    other.to_string()
                },
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Flac => "flac",
            ExportFormat::Ogg => "ogg",
            ExportFormat::M4a => "m4a",
        }
    }

    /// ffmpeg audio codec
    pub fn codec(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "pcm_s24le",
            ExportFormat::Mp3 => "libmp3lame",
            ExportFormat::Flac => "flac",
            ExportFormat::Ogg => "libvorbis",
            ExportFormat::M4a => "aac",
        }
    }

    /// ffmpeg container name
    pub fn muxer(&self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Flac => "flac",
            ExportFormat::Ogg => "ogg",
            ExportFormat::M4a => "ipod",
        }
    }

    pub fn is_lossy(&self) -> bool {
        matches!(self, ExportFormat::Mp3 | ExportFormat::Ogg | ExportFormat::M4a)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension().to_uppercase())
    }
}

/// What an export produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub path: PathBuf,
    pub version: usize,
    pub format: ExportFormat,
    /// Only set for lossy formats
    pub bitrate_kbps: Option<u32>,
}

/// Routes exports to the right transcoder and makes them atomic
pub struct Exporter {
    wav: Box<dyn Transcoder>,
    external: Box<dyn Transcoder>,
}

impl Exporter {
    pub fn new(wav: Box<dyn Transcoder>, external: Box<dyn Transcoder>) -> Self {
        Self { wav, external }
    }

    /// WAV in-process, other formats through ffmpeg at `ffmpeg_path`
    pub fn with_ffmpeg(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(WavTranscoder), Box::new(FfmpegTranscoder::new(ffmpeg_path)))
    }

    fn transcoder_for(&self, format: ExportFormat) -> Result<&dyn Transcoder> {
        [self.wav.as_ref(), self.external.as_ref()]
            .into_iter()
            .find(|t| t.supports(format))
            .ok_or_else(|| MixError::UnsupportedFormat {
                format: format.extension().to_string(),
            })
    }

    /// Export `buffer` (the content of `version`) to `output`.
    ///
    /// On any failure no file is left at `output` or beside it.
    pub fn export(
        &self,
        buffer: &AudioBuffer,
        version: usize,
        output: &Path,
        bitrate_kbps: Option<u32>,
    ) -> Result<ExportRecord> {
        let format = ExportFormat::from_path(output)?;
        let transcoder = self.transcoder_for(format)?;
        let bitrate = bitrate_kbps.unwrap_or(DEFAULT_BITRATE_KBPS);

        let temp = temp_sibling(output, format);
        let written = transcoder
            .transcode(buffer, &temp, format, bitrate)
            .and_then(|()| {
                fs::rename(&temp, output).map_err(|source| MixError::WriteFailure {
                    path: output.to_path_buf(),
                    source,
                })
            });

        if let Err(e) = written {
            if temp.exists() {
                if let Err(cleanup) = fs::remove_file(&temp) {
                    warn!(path = %temp.display(), error = %cleanup, "Could not remove partial export");
                }
            }
            return Err(e);
        }

        info!(
            path = %output.display(),
            version,
            format = %format,
            transcoder = transcoder.name(),
            "Exported"
        );

        Ok(ExportRecord {
            path: output.to_path_buf(),
            version,
            format,
            bitrate_kbps: format.is_lossy().then_some(bitrate),
        })
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::with_ffmpeg("ffmpeg")
    }
}

/// Hidden file next to `output`, keeping the real extension last so encoders
/// that sniff it still see the right format
fn temp_sibling(output: &Path, format: ExportFormat) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!(".{}.{}.partial.{}", stem, uuid::Uuid::new_v4().simple(), format.extension());
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{generate_test_tone, import_audio};
    use tempfile::TempDir;
    use test_case::test_case;

    /// Transcoder that always fails after creating its output
    struct FailingTranscoder;

    impl Transcoder for FailingTranscoder {
        fn name(&self) -> &str {
            "failing"
        }

        fn supports(&self, format: ExportFormat) -> bool {
            format != ExportFormat::Wav
        }

        fn transcode(&self, _buffer: &AudioBuffer, path: &Path, _format: ExportFormat, _bitrate: u32) -> Result<()> {
            fs::write(path, b"half an mp3")?;
            Err(MixError::TranscodeFailed {
                reason: "encoder crashed".to_string(),
            })
        }
    }

    #[test_case("out.wav", ExportFormat::Wav ; "wav")]
    #[test_case("OUT.MP3", ExportFormat::Mp3 ; "upper case")]
    #[test_case("mix.final.flac", ExportFormat::Flac ; "dotted stem")]
    #[test_case("a.ogg", ExportFormat::Ogg ; "ogg")]
    #[test_case("a.m4a", ExportFormat::M4a ; "m4a")]
    fn test_format_from_path(name: &str, expected: ExportFormat) {
        assert_eq!(ExportFormat::from_path(Path::new(name)).unwrap(), expected);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = ExportFormat::from_path(Path::new("out.xyz")).unwrap_err();
        assert!(matches!(err, MixError::UnsupportedFormat { ref format } if format == "xyz"));
    }

    #[test]
    fn test_wav_export_is_atomic_and_readable() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("mix.wav");
        let buffer = generate_test_tone(440.0, 0.05, 48000);

        let record = Exporter::default().export(&buffer, 3, &out, None).unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.format, ExportFormat::Wav);
        assert_eq!(record.bitrate_kbps, None);
        assert_eq!(import_audio(&out).unwrap().num_samples(), buffer.num_samples());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_export_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("mix.mp3");
        let exporter = Exporter::new(Box::new(WavTranscoder), Box::new(FailingTranscoder));

        let err = exporter
            .export(&generate_test_tone(440.0, 0.05, 48000), 1, &out, Some(192))
            .unwrap_err();
        assert!(matches!(err, MixError::TranscodeFailed { .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_directory_is_write_failure() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nope").join("mix.wav");
        let err = Exporter::default()
            .export(&generate_test_tone(440.0, 0.05, 48000), 0, &out, None)
            .unwrap_err();
        assert!(matches!(err, MixError::WriteFailure { .. }));
        assert!(!out.exists());
    }
}
