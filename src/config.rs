//! Runtime configuration
//!
//! Defaults, overridden by `MIX_*` environment variables, overridden in turn
//! by command-line flags.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{MixError, Result};
use crate::export::{Exporter, DEFAULT_BITRATE_KBPS};
use crate::processing::{FfmpegEngine, Processor};

pub const ENV_SESSIONS_DIR: &str = "MIX_SESSIONS_DIR";
pub const ENV_EXPORTS_DIR: &str = "MIX_EXPORTS_DIR";
pub const ENV_ENGINE: &str = "MIX_ENGINE";
pub const ENV_FFMPEG_PATH: &str = "MIX_FFMPEG_PATH";
pub const ENV_EXPORT_BITRATE: &str = "MIX_EXPORT_BITRATE";

/// Lossy bitrates ffmpeg encoders accept across all formats
const BITRATE_RANGE_KBPS: (u32, u32) = (32, 512);

/// Which processing engine to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    #[default]
    Builtin,
    Ffmpeg,
}

impl FromStr for EngineKind {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" | "internal" => Ok(EngineKind::Builtin),
            "ffmpeg" => Ok(EngineKind::Ffmpeg),
            _ => Err(MixError::MalformedCommand {
                input: s.to_string(),
                reason: "engine must be 'builtin' or 'ffmpeg'".to_string(),
            }),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Builtin => write!(f, "builtin"),
            EngineKind::Ffmpeg => write!(f, "ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sessions_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub engine: EngineKind,
    pub ffmpeg_path: PathBuf,
    pub export_bitrate_kbps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("sessions"),
            exports_dir: PathBuf::from("exports"),
            engine: EngineKind::Builtin,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            export_bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `MIX_*` key
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_SESSIONS_DIR) {
            config.sessions_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_EXPORTS_DIR) {
            config.exports_dir = PathBuf::from(dir);
        }
        if let Some(engine) = lookup(ENV_ENGINE) {
            config.engine = engine.parse()?;
        }
        if let Some(path) = lookup(ENV_FFMPEG_PATH) {
            config.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(bitrate) = lookup(ENV_EXPORT_BITRATE) {
            config.export_bitrate_kbps = parse_bitrate(&bitrate)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = BITRATE_RANGE_KBPS;
        if !(min..=max).contains(&self.export_bitrate_kbps) {
            return Err(MixError::MalformedCommand {
                input: self.export_bitrate_kbps.to_string(),
                reason: format!("export bitrate must be {}-{} kbps", min, max),
            });
        }
        Ok(())
    }

    /// Processor for the configured engine
    pub fn processor(&self) -> Processor {
        match self.engine {
            EngineKind::Builtin => Processor::builtin(),
            EngineKind::Ffmpeg => Processor::new(Box::new(FfmpegEngine::new(&self.ffmpeg_path))),
        }
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::with_ffmpeg(&self.ffmpeg_path)
    }
}

/// Parse a bitrate such as `320` or `320k`
pub fn parse_bitrate(s: &str) -> Result<u32> {
    let trimmed = s.trim().trim_end_matches(['k', 'K']);
    trimmed.parse().map_err(|_| MixError::MalformedCommand {
        input: s.to_string(),
        reason: "bitrate must be a whole number of kbps".to_string(),
    })
}
