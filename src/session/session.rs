//! Session: one source file and its append-only version log
//!
//! Every mutation writes audio before the manifest. If the manifest write
//! fails, the in-memory state and the buffer files are put back. Processing
//! errors leave the session untouched.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::lock::SessionLock;
use super::store::{self, BUFFERS_DIR, SCHEMA_VERSION};
use super::version::{Version, VersionSummary};
use crate::dsp::OperationChain;
use crate::engine::{hash_file, import_audio, write_wav, AudioBuffer, CancelFlag};
use crate::error::{MixError, Result};
use crate::processing::Processor;

/// Bit depth of stored version buffers
const BUFFER_BIT_DEPTH: u16 = 32;

/// Where version 0 came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub sha256: String,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_secs: f64,
}

/// A mixing session
#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    schema_version: u32,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<SourceInfo>,
    #[serde(default)]
    cursor: usize,
    #[serde(default)]
    versions: Vec<Version>,

    /// Session directory (not serialized)
    #[serde(skip)]
    dir: PathBuf,

    /// Decoded buffers by version index
    #[serde(skip)]
    cache: HashMap<usize, Arc<AudioBuffer>>,

    /// Held for the session's lifetime
    #[serde(skip)]
    lock: Option<SessionLock>,
}

impl Session {
    /// Empty session with no source
    pub(crate) fn new(name: &str, dir: PathBuf, lock: Option<SessionLock>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: name.to_string(),
            source: None,
            cursor: 0,
            versions: Vec::new(),
            dir,
            cache: HashMap::new(),
            lock,
        }
    }

    /// Attach runtime state to a session read from a manifest
    pub(crate) fn attach(mut self, dir: PathBuf, lock: Option<SessionLock>) -> Self {
        self.dir = dir;
        self.lock = lock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn has_source(&self) -> bool {
        !self.versions.is_empty()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Cursor index; meaningless until a source is loaded
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    fn no_source(&self) -> MixError {
        MixError::NoSource {
            session: self.name.clone(),
        }
    }

    pub fn current_version(&self) -> Result<&Version> {
        self.versions.get(self.cursor).ok_or_else(|| self.no_source())
    }

    pub fn version(&self, index: usize) -> Result<&Version> {
        if self.versions.is_empty() {
            return Err(self.no_source());
        }
        self.versions
            .get(index)
            .ok_or(MixError::VersionNotFound { index })
    }

    /// Indices from version 0 to the cursor, following parents
    pub fn active_path(&self) -> Vec<usize> {
        let mut path = Vec::new();
        let mut next = self.versions.get(self.cursor).map(|v| v.index);
        while let Some(index) = next {
            path.push(index);
            next = self.versions.get(index).and_then(|v| v.parent);
        }
        path.reverse();
        path
    }

    /// Lazy summaries of every version, oldest first
    pub fn history(&self) -> History<'_> {
        let mut active = vec![false; self.versions.len()];
        for index in self.active_path() {
            active[index] = true;
        }
        History {
            session: self,
            active,
            next: 0,
        }
    }

    /// Buffer of a version, decoded from disk on first use
    pub fn buffer(&mut self, index: usize) -> Result<Arc<AudioBuffer>> {
        if let Some(buffer) = self.cache.get(&index) {
            return Ok(Arc::clone(buffer));
        }
        let path = self.dir.join(&self.version(index)?.buffer);
        let buffer = import_audio(&path).map_err(|e| match e {
            MixError::SourceNotFound { .. } => MixError::ManifestCorrupt {
                path: store::manifest_path(&self.dir),
                reason: format!("buffer of version {} is missing ({})", index, path.display()),
            },
            other => other,
        })?;
        debug!(session = %self.name, version = index, "Loaded version buffer");
        let buffer = Arc::new(buffer);
        self.cache.insert(index, Arc::clone(&buffer));
        Ok(buffer)
    }

    pub fn current_buffer(&mut self) -> Result<Arc<AudioBuffer>> {
        let cursor = self.current_version()?.index;
        self.buffer(cursor)
    }

    /// Persist the manifest
    pub fn save(&self) -> Result<()> {
        store::write_manifest(&self.dir, self)
    }

    /// Load `path` as the session source, creating version 0.
    ///
    /// A session that already has versions is only replaced when `replace`
    /// is set; the whole history is then discarded.
    ///
    /// # Errors
    /// * `HistoryExists` - versions exist and `replace` is false
    /// * `SourceNotFound`, `InvalidAudio` - the file cannot be used
    pub fn load_source(&mut self, path: &Path, replace: bool) -> Result<&Version> {
        if !self.versions.is_empty() && !replace {
            return Err(MixError::HistoryExists {
                session: self.name.clone(),
                versions: self.versions.len(),
            });
        }

        let buffer = import_audio(path)?;
        let sha256 = hash_file(path)?;
        let source = SourceInfo {
            path: fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
            sha256,
            sample_rate: buffer.sample_rate,
            channels: buffer.num_channels(),
            duration_secs: buffer.duration_secs(),
        };

        // Stage the new buffer directory, then swap it in
        let staging = self.dir.join(format!("{}.new", BUFFERS_DIR));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        let root = Version::root(buffer_path(0));
        if let Err(e) = write_wav(&buffer, &staging.join(buffer_file(0)), BUFFER_BIT_DEPTH) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        // Park the old buffers until the new manifest is on disk
        let buffers = self.dir.join(BUFFERS_DIR);
        let parked = self.dir.join(format!("{}.old", BUFFERS_DIR));
        if parked.exists() {
            fs::remove_dir_all(&parked)?;
        }
        let had_buffers = buffers.exists();
        if had_buffers {
            fs::rename(&buffers, &parked)?;
        }
        if let Err(e) = fs::rename(&staging, &buffers) {
            let _ = fs::remove_dir_all(&staging);
            if had_buffers {
                let _ = fs::rename(&parked, &buffers);
            }
            return Err(e.into());
        }

        let discarded = self.versions.len();
        let previous_source = self.source.replace(source);
        let previous_versions = std::mem::replace(&mut self.versions, vec![root]);
        let previous_cursor = std::mem::replace(&mut self.cursor, 0);
        if let Err(e) = self.save() {
            self.source = previous_source;
            self.versions = previous_versions;
            self.cursor = previous_cursor;
            let _ = fs::remove_dir_all(&buffers);
            if had_buffers {
                if let Err(restore) = fs::rename(&parked, &buffers) {
                    warn!(session = %self.name, error = %restore, "Could not restore previous buffers");
                }
            }
            return Err(e);
        }
        if had_buffers {
            if let Err(e) = fs::remove_dir_all(&parked) {
                warn!(session = %self.name, error = %e, "Could not remove replaced buffers");
            }
        }
        self.cache.clear();
        self.cache.insert(0, Arc::new(buffer));

        info!(
            session = %self.name,
            source = %path.display(),
            discarded,
            "Loaded source as version 0"
        );
        Ok(&self.versions[0])
    }

    /// Apply `chain` to the cursor's buffer and append the result.
    ///
    /// The cursor moves to the new version. A version with the same parent,
    /// chain fingerprint and engine already holds the answer, so its buffer
    /// is reused instead of processing again.
    pub fn apply_chain(
        &mut self,
        chain: &OperationChain,
        prompt: Option<&str>,
        processor: &Processor,
        cancel: &CancelFlag,
    ) -> Result<&Version> {
        let parent = self.current_version()?.index;
        let fingerprint = chain.fingerprint();
        let index = self.versions.len();

        let engine = processor.engine_name();
        let reusable = self
            .versions
            .iter()
            .find(|v| {
                v.parent == Some(parent) && v.fingerprint == fingerprint && v.engine.as_deref() == Some(engine)
            })
            .map(|v| (v.index, v.buffer.clone()));

        let (buffer_rel, output, written) = match reusable {
            Some((twin, rel)) => {
                debug!(session = %self.name, twin, "Reusing buffer of identical version");
                (rel, self.cache.get(&twin).cloned(), false)
            }
            None => {
                let input = self.buffer(parent)?;
                let output = processor.process(&input, chain, cancel).inspect_err(|e| {
                    warn!(session = %self.name, parent, error = %e, "Chain not applied")
                })?;
                let rel = buffer_path(index);
                write_wav(&output, &self.dir.join(&rel), BUFFER_BIT_DEPTH)?;
                (rel, Some(Arc::new(output)), true)
            }
        };

        let version = Version {
            index,
            parent: Some(parent),
            chain: chain.clone(),
            buffer: buffer_rel,
            fingerprint,
            engine: Some(engine.to_string()),
            timestamp: chrono::Utc::now(),
            prompt: prompt.map(str::to_string),
        };

        self.versions.push(version);
        self.cursor = index;
        if let Err(e) = self.save() {
            self.versions.pop();
            self.cursor = parent;
            if written {
                let _ = fs::remove_file(self.dir.join(buffer_path(index)));
            }
            return Err(e);
        }
        if let Some(output) = output {
            self.cache.insert(index, output);
        }

        info!(
            session = %self.name,
            version = index,
            parent,
            ops = chain.len(),
            reused = !written,
            "Appended version"
        );
        Ok(&self.versions[index])
    }

    /// Move the cursor to the parent of the current version
    ///
    /// # Errors
    /// * `AtOldestVersion` - the cursor is on version 0
    pub fn undo(&mut self) -> Result<&Version> {
        let parent = self.current_version()?.parent.ok_or(MixError::AtOldestVersion)?;
        self.move_cursor(parent)
    }

    /// Move the cursor to any existing version
    pub fn checkout(&mut self, index: usize) -> Result<&Version> {
        self.version(index)?;
        self.move_cursor(index)
    }

    fn move_cursor(&mut self, index: usize) -> Result<&Version> {
        let previous = self.cursor;
        self.cursor = index;
        if let Err(e) = self.save() {
            self.cursor = previous;
            return Err(e);
        }
        info!(session = %self.name, from = previous, to = index, "Moved cursor");
        Ok(&self.versions[index])
    }

    /// Structural checks for a manifest read from disk
    pub(crate) fn check_invariants(&self) -> std::result::Result<(), String> {
        if self.versions.is_empty() {
            if self.source.is_some() {
                return Err("source recorded but no versions".to_string());
            }
            return if self.cursor == 0 {
                Ok(())
            } else {
                Err(format!("cursor {} with no versions", self.cursor))
            };
        }
        if self.source.is_none() {
            return Err("versions recorded without a source".to_string());
        }
        if self.cursor >= self.versions.len() {
            return Err(format!(
                "cursor {} out of range (0..{})",
                self.cursor,
                self.versions.len()
            ));
        }
        for (i, v) in self.versions.iter().enumerate() {
            if v.index != i {
                return Err(format!("version at position {} has index {}", i, v.index));
            }
            match v.parent {
                None if i != 0 => return Err(format!("version {} has no parent", i)),
                Some(p) if p >= i => return Err(format!("version {} has parent {}", i, p)),
                _ => {}
            }
            if i == 0 && !v.chain.is_empty() {
                return Err("version 0 has a non-empty chain".to_string());
            }
            if !v.buffer.components().all(|c| matches!(c, Component::Normal(_))) {
                return Err(format!("version {} buffer path {} escapes the session", i, v.buffer.display()));
            }
        }
        Ok(())
    }
}

/// Iterator over version summaries; clone it to restart
#[derive(Debug, Clone)]
pub struct History<'a> {
    session: &'a Session,
    active: Vec<bool>,
    next: usize,
}

impl Iterator for History<'_> {
    type Item = VersionSummary;

    fn next(&mut self) -> Option<Self::Item> {
        let version = self.session.versions.get(self.next)?;
        let summary = VersionSummary::new(version, self.active[self.next], self.next == self.session.cursor);
        self.next += 1;
        Some(summary)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.session.versions.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for History<'_> {}

fn buffer_file(index: usize) -> String {
    format!("v{:03}.wav", index)
}

fn buffer_path(index: usize) -> PathBuf {
    Path::new(BUFFERS_DIR).join(buffer_file(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{OperationKind, OperationSpec, Stage};
    use crate::engine::generate_test_tone;
    use crate::processing::{BuiltinEngine, ProcessingEngine};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Session, PathBuf) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.wav");
        write_wav(&generate_test_tone(440.0, 0.1, 48000), &source, 16).unwrap();
        let session_dir = dir.path().join("demo");
        fs::create_dir_all(&session_dir).unwrap();
        let session = Session::new("demo", session_dir, None);
        (dir, session, source)
    }

    fn gain(db: f64) -> OperationChain {
        OperationChain::from_ordered(vec![
            OperationSpec::new(OperationKind::Gain, Stage::Loudness).with_number("gain_db", db)
        ])
    }

    #[test]
    fn test_no_source_errors() {
        let (_dir, mut session, _) = fixture();
        assert!(matches!(session.current_version(), Err(MixError::NoSource { .. })));
        assert!(matches!(session.undo(), Err(MixError::NoSource { .. })));
        assert!(matches!(
            session.apply_chain(&gain(1.0), None, &Processor::builtin(), &CancelFlag::new()),
            Err(MixError::NoSource { .. })
        ));
    }

    #[test]
    fn test_load_source_creates_root() {
        let (_dir, mut session, source) = fixture();
        let v0 = session.load_source(&source, false).unwrap().clone();
        assert_eq!(v0.index, 0);
        assert!(v0.is_root());
        assert!(v0.chain.is_empty());
        assert!(session.dir().join(&v0.buffer).exists());
        assert_eq!(session.source().unwrap().sample_rate, 48000);
    }

    #[test]
    fn test_missing_source() {
        let (dir, mut session, _) = fixture();
        let err = session.load_source(&dir.path().join("nope.wav"), false).unwrap_err();
        assert!(matches!(err, MixError::SourceNotFound { .. }));
        assert!(!session.has_source());
    }

    #[test]
    fn test_replace_requires_flag() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let processor = Processor::builtin();
        session.apply_chain(&gain(2.0), Some("louder"), &processor, &CancelFlag::new()).unwrap();

        let err = session.load_source(&source, false).unwrap_err();
        assert!(matches!(err, MixError::HistoryExists { versions: 2, .. }));

        session.load_source(&source, true).unwrap();
        assert_eq!(session.version_count(), 1);
        assert_eq!(session.cursor(), 0);
        assert!(!session.dir().join(buffer_path(1)).exists());
    }

    #[test]
    fn test_failed_replace_keeps_history() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        session
            .apply_chain(&gain(2.0), Some("louder"), &Processor::builtin(), &CancelFlag::new())
            .unwrap();

        // A directory where the temp manifest goes makes the save fail
        let blocker = session.dir().join(".session.json.tmp");
        fs::create_dir_all(&blocker).unwrap();
        assert!(session.load_source(&source, true).is_err());

        assert_eq!(session.version_count(), 2);
        assert_eq!(session.cursor(), 1);
        assert!(session.dir().join(buffer_path(1)).exists());
        assert!(!session.dir().join("buffers.old").exists());
        assert!(!session.dir().join("buffers.new").exists());

        fs::remove_dir(&blocker).unwrap();
        let on_disk = store::read_manifest(session.dir(), "demo").unwrap();
        assert_eq!(on_disk.version_count(), 2);
        assert!(session.dir().join(&on_disk.version(1).unwrap().buffer).exists());
    }

    #[test]
    fn test_apply_and_undo() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let processor = Processor::builtin();

        let v1 = session
            .apply_chain(&gain(-6.0), Some("quieter"), &processor, &CancelFlag::new())
            .unwrap()
            .clone();
        assert_eq!(v1.parent, Some(0));
        assert_eq!(session.cursor(), 1);

        let undone = session.undo().unwrap().index;
        assert_eq!(undone, 0);
        assert_eq!(session.version_count(), 2);
        assert!(matches!(session.undo(), Err(MixError::AtOldestVersion)));
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_apply_after_undo_builds_on_cursor() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let processor = Processor::builtin();
        let cancel = CancelFlag::new();

        session.apply_chain(&gain(-6.0), None, &processor, &cancel).unwrap();
        session.undo().unwrap();
        let v2 = session.apply_chain(&gain(3.0), None, &processor, &cancel).unwrap().clone();
        assert_eq!(v2.index, 2);
        assert_eq!(v2.parent, Some(0));
        assert_eq!(session.active_path(), vec![0, 2]);

        let flags: Vec<(bool, bool)> = session.history().map(|s| (s.active, s.current)).collect();
        assert_eq!(flags, vec![(true, false), (false, false), (true, true)]);
    }

    #[test]
    fn test_identical_chain_reuses_buffer() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let processor = Processor::builtin();
        let cancel = CancelFlag::new();

        let first = session.apply_chain(&gain(-6.0), None, &processor, &cancel).unwrap().buffer.clone();
        session.undo().unwrap();
        let second = session.apply_chain(&gain(-6.0), None, &processor, &cancel).unwrap().clone();
        assert_eq!(second.index, 2);
        assert_eq!(second.buffer, first);
        assert_eq!(session.buffer(2).unwrap(), session.buffer(1).unwrap());
    }

    /// Builtin output under another engine name
    struct OtherEngine;

    impl ProcessingEngine for OtherEngine {
        fn name(&self) -> &str {
            "other"
        }

        fn process(&self, buffer: &AudioBuffer, chain: &OperationChain, cancel: &CancelFlag) -> Result<AudioBuffer> {
            BuiltinEngine::new().process(buffer, chain, cancel)
        }
    }

    #[test]
    fn test_reuse_requires_same_engine() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let cancel = CancelFlag::new();

        let first = session
            .apply_chain(&gain(-6.0), None, &Processor::builtin(), &cancel)
            .unwrap()
            .clone();
        assert_eq!(first.engine.as_deref(), Some("builtin"));
        session.undo().unwrap();

        let other = Processor::new(Box::new(OtherEngine));
        let second = session.apply_chain(&gain(-6.0), None, &other, &cancel).unwrap().clone();
        assert_eq!(second.engine.as_deref(), Some("other"));
        assert_ne!(second.buffer, first.buffer);
        assert!(session.dir().join(&second.buffer).exists());
    }

    #[test]
    fn test_failed_apply_leaves_session_unchanged() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let err = session
            .apply_chain(&gain(99.0), None, &Processor::builtin(), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, MixError::InvalidParameter { .. }));
        assert_eq!(session.version_count(), 1);
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_cancelled_apply_appends_nothing() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = session
            .apply_chain(&gain(1.0), None, &Processor::builtin(), &cancel)
            .unwrap_err();
        assert!(matches!(err, MixError::Cancelled));
        assert_eq!(session.version_count(), 1);
        assert!(!session.dir().join(buffer_path(1)).exists());
    }

    #[test]
    fn test_checkout() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        session
            .apply_chain(&gain(1.0), None, &Processor::builtin(), &CancelFlag::new())
            .unwrap();
        session.checkout(0).unwrap();
        assert_eq!(session.cursor(), 0);
        assert!(matches!(session.checkout(7), Err(MixError::VersionNotFound { index: 7 })));
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_history_is_restartable() {
        let (_dir, mut session, source) = fixture();
        session.load_source(&source, false).unwrap();
        let history = session.history();
        assert_eq!(history.len(), 1);
        let again = history.clone();
        assert_eq!(history.count(), again.count());
    }
}
