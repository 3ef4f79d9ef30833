//! Sessions and their version history
//!
//! - [`Session`]: source file, append-only version log, cursor
//! - [`SessionStore`]: on-disk manifests, listing, per-name locking

mod lock;
#[allow(clippy::module_inception)]
mod session;
mod store;
mod version;

pub use lock::{SessionLock, LOCK_FILE};
pub use session::{History, Session, SourceInfo};
pub use store::{validate_name, SessionInfo, SessionStore, BUFFERS_DIR, MANIFEST_FILE, SCHEMA_VERSION};
pub use version::{Version, VersionSummary};
