//! CLI Module
//!
//! Command-line flags and the interactive command loop.

pub mod command;
pub mod repl;

pub use command::Command;
pub use repl::{format_error, MixEngineer, Reply};

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, EngineKind};
use crate::error::Result;

/// Mix Engineer - describe a mix change in plain words, get a new version
#[derive(Parser, Debug)]
#[command(name = "mix-engineer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory holding sessions [env: MIX_SESSIONS_DIR]
    #[arg(long, value_name = "DIR")]
    pub sessions_dir: Option<PathBuf>,

    /// Directory for exports given as bare names [env: MIX_EXPORTS_DIR]
    #[arg(long, value_name = "DIR")]
    pub exports_dir: Option<PathBuf>,

    /// Processing engine: builtin or ffmpeg [env: MIX_ENGINE]
    #[arg(long)]
    pub engine: Option<EngineKind>,

    /// ffmpeg binary [env: MIX_FFMPEG_PATH]
    #[arg(long, value_name = "PATH")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Bitrate for lossy exports in kbps [env: MIX_EXPORT_BITRATE]
    #[arg(long, value_name = "KBPS")]
    pub bitrate: Option<u32>,

    /// Session to open on start
    #[arg(short, long)]
    pub session: Option<String>,

    /// Read commands from a file instead of standard input
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,
}

impl Cli {
    /// Environment configuration with this command line's flags applied
    pub fn config(&self) -> Result<Config> {
        self.apply(Config::from_env()?)
    }

    /// Override `config` with any flags given
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(dir) = &self.sessions_dir {
            config.sessions_dir = dir.clone();
        }
        if let Some(dir) = &self.exports_dir {
            config.exports_dir = dir.clone();
        }
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(path) = &self.ffmpeg_path {
            config.ffmpeg_path = path.clone();
        }
        if let Some(bitrate) = self.bitrate {
            config.export_bitrate_kbps = bitrate;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "mix-engineer",
            "--sessions-dir",
            "/tmp/sessions",
            "--engine",
            "ffmpeg",
            "--bitrate",
            "256",
        ]);
        let config = cli.apply(Config::default()).unwrap();
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/sessions"));
        assert_eq!(config.engine, EngineKind::Ffmpeg);
        assert_eq!(config.export_bitrate_kbps, 256);
        assert_eq!(config.exports_dir, PathBuf::from("exports"));
    }

    #[test]
    fn test_invalid_flag_value() {
        assert!(Cli::try_parse_from(["mix-engineer", "--engine", "sox"]).is_err());
        let cli = Cli::parse_from(["mix-engineer", "--bitrate", "9000"]);
        assert!(cli.apply(Config::default()).is_err());
    }
}
