//! Versions and their read-only summaries

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dsp::OperationChain;

/// One entry of the session log.
///
/// Immutable once appended. The buffer is the chain applied to the parent's
/// buffer; version 0 holds the unprocessed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub index: usize,
    pub parent: Option<usize>,
    pub chain: OperationChain,
    /// WAV file holding the result, relative to the session directory
    pub buffer: PathBuf,
    /// Fingerprint of `chain`
    pub fingerprint: String,
    /// Engine that rendered the buffer; none for the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Version {
    /// Version 0 for a freshly loaded source
    pub(crate) fn root(buffer: PathBuf) -> Self {
        let chain = OperationChain::empty();
        Self {
            index: 0,
            parent: None,
            fingerprint: chain.fingerprint(),
            chain,
            buffer,
            engine: None,
            timestamp: Utc::now(),
            prompt: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// One-line description of what this version did
    pub fn describe(&self) -> String {
        if self.chain.is_empty() {
            "source".to_string()
        } else {
            self.chain.describe().join(" -> ")
        }
    }
}

/// Read-only view of a version for `history`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionSummary {
    pub index: usize,
    pub parent: Option<usize>,
    pub prompt: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// On the path from version 0 to the cursor
    pub active: bool,
    /// The cursor itself
    pub current: bool,
}

impl VersionSummary {
    pub(crate) fn new(version: &Version, active: bool, current: bool) -> Self {
        Self {
            index: version.index,
            parent: version.parent,
            prompt: version.prompt.clone(),
            timestamp: version.timestamp,
            description: version.describe(),
            active,
            current,
        }
    }
}
