//! Error handling for the mix engineer
//!
//! Every error carries a stable code and, where it helps, a recovery
//! suggestion. None of them is fatal to the command loop.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for mix engineer operations
pub type Result<T> = std::result::Result<T, MixError>;

/// Coarse grouping used by the command loop to decide how to report an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad path, unreadable file, malformed command
    Input,
    /// Prompt understood zero terms
    Interpretation,
    /// Local to one `apply_chain` or cursor move; session unchanged
    Processing,
    /// Session locked by another interpreter
    Busy,
    /// Export failed; no output file left behind
    Export,
    /// Stored manifest unreadable or invalid
    Store,
    /// Anything else
    Internal,
}

/// Main error type
#[derive(Error, Debug)]
pub enum MixError {
    // Input Errors
    #[error("Source not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed command '{input}': {reason}")]
    MalformedCommand { input: String, reason: String },

    #[error("No active session")]
    NoActiveSession,

    #[error("No source loaded in session '{session}'")]
    NoSource { session: String },

    #[error("Invalid session name '{name}': use 1-64 letters, digits, '-' or '_'")]
    InvalidSessionName { name: String },

    #[error("Version {index} does not exist")]
    VersionNotFound { index: usize },

    #[error("Session '{session}' already has {versions} version(s); replacing the source discards them")]
    HistoryExists { session: String, versions: usize },

    // Interpretation
    #[error("Nothing understood in prompt (unrecognized: {})", unrecognized.join(", "))]
    NothingUnderstood { unrecognized: Vec<String> },

    // Processing Errors
    #[error("Invalid parameter {operation}.{param} = {value} (expected {expected})")]
    InvalidParameter {
        operation: String,
        param: String,
        value: String,
        expected: String,
    },

    #[error("Engine failure [{code}]: {reason}")]
    EngineFailure { code: String, reason: String },

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Already at the oldest version")]
    AtOldestVersion,

    // Concurrency
    #[error("Session '{name}' is busy (locked by {holder})")]
    SessionBusy { name: String, holder: String },

    // Export Errors
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoding failed: {reason}")]
    TranscodeFailed { reason: String },

    // Store Errors
    #[error("Session manifest {path} is corrupt: {reason}")]
    ManifestCorrupt { path: PathBuf, reason: String },

    // Internal
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MixError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            MixError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            MixError::InvalidAudio { .. } => "INVALID_AUDIO",
            MixError::MalformedCommand { .. } => "MALFORMED_COMMAND",
            MixError::NoActiveSession => "NO_ACTIVE_SESSION",
            MixError::NoSource { .. } => "NO_SOURCE",
            MixError::InvalidSessionName { .. } => "INVALID_SESSION_NAME",
            MixError::VersionNotFound { .. } => "VERSION_NOT_FOUND",
            MixError::HistoryExists { .. } => "HISTORY_EXISTS",
            MixError::NothingUnderstood { .. } => "NOTHING_UNDERSTOOD",
            MixError::InvalidParameter { .. } => "INVALID_PARAMETER",
            MixError::EngineFailure { .. } => "ENGINE_FAILURE",
            MixError::Cancelled => "CANCELLED",
            MixError::AtOldestVersion => "AT_OLDEST_VERSION",
            MixError::SessionBusy { .. } => "SESSION_BUSY",
            MixError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            MixError::WriteFailure { .. } => "WRITE_FAILURE",
            MixError::TranscodeFailed { .. } => "TRANSCODE_FAILED",
            MixError::ManifestCorrupt { .. } => "MANIFEST_CORRUPT",
            MixError::Io(_) => "IO_ERROR",
            MixError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Which reporting bucket this error falls into
    pub fn category(&self) -> ErrorCategory {
        match self {
            MixError::SourceNotFound { .. }
            | MixError::InvalidAudio { .. }
            | MixError::MalformedCommand { .. }
            | MixError::NoActiveSession
            | MixError::NoSource { .. }
            | MixError::InvalidSessionName { .. }
            | MixError::VersionNotFound { .. }
            | MixError::HistoryExists { .. } => ErrorCategory::Input,
            MixError::NothingUnderstood { .. } => ErrorCategory::Interpretation,
            MixError::InvalidParameter { .. }
            | MixError::EngineFailure { .. }
            | MixError::Cancelled
            | MixError::AtOldestVersion => ErrorCategory::Processing,
            MixError::SessionBusy { .. } => ErrorCategory::Busy,
            MixError::UnsupportedFormat { .. }
            | MixError::WriteFailure { .. }
            | MixError::TranscodeFailed { .. } => ErrorCategory::Export,
            MixError::ManifestCorrupt { .. } => ErrorCategory::Store,
            MixError::Io(_) | MixError::Serialization(_) => ErrorCategory::Internal,
        }
    }

    /// Returns true if the user can simply try the same thing again later.
    ///
    /// Nothing is retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MixError::SessionBusy { .. } | MixError::Cancelled | MixError::WriteFailure { .. }
        )
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            MixError::SourceNotFound { .. } => Some("Check the file path and try again."),
            MixError::InvalidAudio { .. } => Some("Convert the file to WAV first."),
            MixError::NoActiveSession => Some("Start a session first: session <name>"),
            MixError::NoSource { .. } => Some("Set a source file first: source <file>"),
            MixError::HistoryExists { .. } => {
                Some("Use 'source! <file>' to replace the source and discard the history.")
            }
            MixError::NothingUnderstood { .. } => {
                Some("Type 'help' for example prompts such as 'make it brighter'.")
            }
            MixError::AtOldestVersion => Some("Version 0 is the unprocessed source."),
            MixError::SessionBusy { .. } => Some(
                "Another interpreter has this session open. Close it and retry, \
                 or remove the stale .lock file if that process is gone.",
            ),
            MixError::UnsupportedFormat { .. } => Some("Supported formats: wav, mp3, flac, ogg, m4a."),
            MixError::ManifestCorrupt { .. } => {
                Some("Restore session.json from a backup or start a session under a new name.")
            }
            MixError::EngineFailure { .. } => {
                Some("Check that the processing engine is installed (ffmpeg) or switch to the builtin engine.")
            }
            _ => None,
        }
    }
}
