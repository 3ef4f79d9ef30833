//! Session Store
//!
//! Sessions live under one root directory:
//!
//! ```text
//! <root>/<name>/session.json      pretty JSON manifest
//! <root>/<name>/buffers/vNNN.wav  32-bit float buffer per version
//! <root>/<name>/.lock             advisory lock while open
//! ```
//!
//! Manifests are written to a temp file and renamed into place, and every map
//! in them is ordered, so loading and re-saving an untouched session produces
//! the same bytes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::lock::SessionLock;
use super::session::Session;
use crate::error::{MixError, Result};

/// Manifest file name
pub const MANIFEST_FILE: &str = "session.json";

/// Directory of version buffers
pub const BUFFERS_DIR: &str = "buffers";

/// Manifest schema written by this build
pub const SCHEMA_VERSION: u32 = 1;

const MAX_NAME_LEN: usize = 64;

/// Listing entry for a stored session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub name: String,
    pub versions: usize,
    pub cursor: usize,
    pub source: Option<PathBuf>,
}

/// Only the fields `list` needs
#[derive(Deserialize)]
struct ManifestHeader {
    name: String,
    #[serde(default)]
    cursor: usize,
    #[serde(default)]
    source: Option<SourceHeader>,
    #[serde(default)]
    versions: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct SourceHeader {
    path: PathBuf,
}

/// Root of all stored sessions
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        manifest_path(&self.session_dir(name)).is_file()
    }

    /// Open session `name`, creating it if it does not exist.
    ///
    /// The session holds the per-name lock until dropped.
    ///
    /// # Errors
    /// * `InvalidSessionName` - name outside `[A-Za-z0-9_-]{1,64}`
    /// * `SessionBusy` - already open elsewhere
    /// * `ManifestCorrupt` - manifest exists but cannot be used
    pub fn open(&self, name: &str) -> Result<Session> {
        validate_name(name)?;
        let dir = self.session_dir(name);
        fs::create_dir_all(&dir)?;
        let lock = SessionLock::acquire(&dir, name)?;

        if manifest_path(&dir).exists() {
            let session = read_manifest(&dir, name)?.attach(dir, Some(lock));
            info!(
                session = name,
                versions = session.version_count(),
                cursor = session.cursor(),
                "Opened session"
            );
            Ok(session)
        } else {
            let session = Session::new(name, dir, Some(lock));
            session.save()?;
            info!(session = name, "Created session");
            Ok(session)
        }
    }

    /// Stored sessions, sorted by name. Unreadable manifests are skipped.
    pub fn list(&self) -> Result<Vec<SessionInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| MixError::Io(e.into()))?;
            if entry.file_name() != MANIFEST_FILE {
                continue;
            }
            let header = fs::read_to_string(entry.path())
                .map_err(MixError::from)
                .and_then(|s| serde_json::from_str::<ManifestHeader>(&s).map_err(MixError::from));
            match header {
                Ok(h) => sessions.push(SessionInfo {
                    name: h.name,
                    versions: h.versions.len(),
                    cursor: h.cursor,
                    source: h.source.map(|s| s.path),
                }),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable manifest"),
            }
        }
        Ok(sessions)
    }
}

/// Session names: 1-64 of `[A-Za-z0-9_-]`
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(MixError::InvalidSessionName {
            name: name.to_string(),
        })
    }
}

pub(crate) fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Atomically replace the manifest in `dir`
pub(crate) fn write_manifest(dir: &Path, session: &Session) -> Result<()> {
    let path = manifest_path(dir);
    let mut content = serde_json::to_string_pretty(session)?;
    content.push('\n');

    let temp = dir.join(format!(".{}.tmp", MANIFEST_FILE));
    let written = fs::write(&temp, content).and_then(|()| fs::rename(&temp, &path));
    if let Err(source) = written {
        let _ = fs::remove_file(&temp);
        return Err(MixError::WriteFailure { path, source });
    }
    Ok(())
}

/// Read and check the manifest in `dir`
pub(crate) fn read_manifest(dir: &Path, expected_name: &str) -> Result<Session> {
    let path = manifest_path(dir);
    let corrupt = |reason: String| MixError::ManifestCorrupt {
        path: path.clone(),
        reason,
    };

    let content = fs::read_to_string(&path)?;
    let session: Session = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;

    if session.schema_version() != SCHEMA_VERSION {
        return Err(corrupt(format!(
            "unsupported schema version {} (expected {})",
            session.schema_version(),
            SCHEMA_VERSION
        )));
    }
    if session.name() != expected_name {
        return Err(corrupt(format!(
            "manifest names session '{}', directory is '{}'",
            session.name(),
            expected_name
        )));
    }
    session.check_invariants().map_err(corrupt)?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{OperationChain, OperationKind, OperationSpec, Stage};
    use crate::engine::{generate_test_tone, write_wav, CancelFlag};
    use crate::processing::Processor;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("demo" ; "plain")]
    #[test_case("mix_v2-final" ; "punctuation")]
    #[test_case("A1" ; "mixed case")]
    fn test_valid_names(name: &str) {
        assert!(validate_name(name).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("../etc" ; "traversal")]
    #[test_case("has space" ; "space")]
    #[test_case("é" ; "non ascii")]
    fn test_invalid_names(name: &str) {
        assert!(matches!(validate_name(name), Err(MixError::InvalidSessionName { .. })));
    }

    #[test]
    fn test_name_length_limit() {
        assert!(validate_name(&"a".repeat(64)).is_ok());
        assert!(validate_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_open_creates_and_locks() {
        let root = TempDir::new().unwrap();
        let store = SessionStore::new(root.path());
        let session = store.open("demo").unwrap();
        assert!(store.exists("demo"));
        assert!(!session.has_source());
        assert!(matches!(store.open("demo"), Err(MixError::SessionBusy { .. })));
        drop(session);
        store.open("demo").unwrap();
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let root = TempDir::new().unwrap();
        let source = root.path().join("a.wav");
        write_wav(&generate_test_tone(220.0, 0.1, 44100), &source, 24).unwrap();
        let store = SessionStore::new(root.path().join("sessions"));

        let chain = OperationChain::from_ordered(vec![OperationSpec::new(OperationKind::Eq, Stage::CreativeEq)
            .with_choice("filter", "high_shelf")
            .with_number("frequency", 10000.0)
            .with_number("gain_db", 1.5)
            .with_number("q", 0.7)]);
        {
            let mut session = store.open("demo").unwrap();
            session.load_source(&source, false).unwrap();
            session
                .apply_chain(&chain, Some("brighter"), &Processor::builtin(), &CancelFlag::new())
                .unwrap();
        }

        let manifest = manifest_path(&store.session_dir("demo"));
        let before = fs::read(&manifest).unwrap();
        let session = store.open("demo").unwrap();
        assert_eq!(session.version_count(), 2);
        assert_eq!(session.cursor(), 1);
        assert_eq!(session.versions()[1].chain, chain);
        session.save().unwrap();
        assert_eq!(fs::read(&manifest).unwrap(), before);
    }

    #[test]
    fn test_corrupt_manifest() {
        let root = TempDir::new().unwrap();
        let store = SessionStore::new(root.path());
        fs::create_dir_all(store.session_dir("demo")).unwrap();
        fs::write(manifest_path(&store.session_dir("demo")), "{ not json").unwrap();

        let err = store.open("demo").unwrap_err();
        assert!(matches!(err, MixError::ManifestCorrupt { .. }));
        // The lock taken during the failed open is released
        assert!(!store.session_dir("demo").join(crate::session::LOCK_FILE).exists());
    }

    #[test]
    fn test_invalid_cursor_is_corrupt() {
        let root = TempDir::new().unwrap();
        let store = SessionStore::new(root.path());
        fs::create_dir_all(store.session_dir("demo")).unwrap();
        fs::write(
            manifest_path(&store.session_dir("demo")),
            r#"{"schema_version": 1, "name": "demo", "cursor": 3, "versions": []}"#,
        )
        .unwrap();
        let err = store.open("demo").unwrap_err();
        assert!(matches!(err, MixError::ManifestCorrupt { ref reason, .. } if reason.contains("cursor")));
    }

    #[test]
    fn test_list_sessions() {
        let root = TempDir::new().unwrap();
        let store = SessionStore::new(root.path());
        assert!(store.list().unwrap().is_empty());
        drop(store.open("beta").unwrap());
        drop(store.open("alpha").unwrap());

        let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
