//! Advisory per-session lock
//!
//! One interpreter per session directory. The lock file is created with
//! `create_new`, so a second opener sees it and fails fast instead of
//! interleaving writes. A lock left by a process that has exited is removed
//! and taken over.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MixError, Result};

/// Lock file name inside a session directory
pub const LOCK_FILE: &str = ".lock";

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: String,
}

/// Held lock; removed when dropped
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl SessionLock {
    /// Take the lock for session `name` stored in `dir`
    ///
    /// # Errors
    /// * `SessionBusy` - another process (or session object) holds it
    pub fn acquire(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let busy = |path: &Path| MixError::SessionBusy {
            name: name.to_string(),
            holder: describe_holder(path),
        };
        let mut file = match create(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !reclaim_stale(&path) {
                    return Err(busy(&path));
                }
                match create(&path) {
                    Ok(file) => file,
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(busy(&path)),
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        let content = LockContent {
            pid: std::process::id(),
            started_at: Utc::now().to_rfc3339(),
        };
        let written = serde_json::to_vec(&content)
            .map_err(MixError::from)
            .and_then(|bytes| file.write_all(&bytes).map_err(MixError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Could not release session lock");
            }
        }
    }
}

fn create(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Remove a lock whose holder has exited. Returns whether it was removed.
///
/// Locks that cannot be read, or that name this process, are left alone.
fn reclaim_stale(path: &Path) -> bool {
    let Some(content) = read_content(path) else {
        return false;
    };
    if content.pid == std::process::id() || process_alive(content.pid) {
        return false;
    }
    warn!(
        path = %path.display(),
        pid = content.pid,
        since = %content.started_at,
        "Removing stale session lock"
    );
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => e.kind() == ErrorKind::NotFound,
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without /proc there is no cheap liveness check; assume the holder is alive
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

fn read_content(path: &Path) -> Option<LockContent> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
}

/// "pid 123 since <time>", or a generic description if the file is unreadable
fn describe_holder(path: &Path) -> String {
    read_content(path).map_or_else(
            || "another process".to_string(),
            |c| format!("pid {} since {}", c.pid, c.started_at),
        )
}
