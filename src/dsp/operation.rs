//! Operation specs and chains
//!
//! An [`OperationSpec`] is one processing step with concrete parameters; an
//! [`OperationChain`] is the ordered list produced from one prompt. Both are
//! immutable once built: the only "mutators" consume `self` and return a new
//! value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MixError, Result};

/// Processing stage, in canonical order (earlier variants run first)
///
/// Corrective EQ → Dynamics → Creative EQ → Time-based → Stereo → Loudness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CorrectiveEq,
    Dynamics,
    CreativeEq,
    TimeBased,
    Stereo,
    Loudness,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::CorrectiveEq => write!(f, "Corrective EQ"),
            Stage::Dynamics => write!(f, "Dynamics"),
            Stage::CreativeEq => write!(f, "Creative EQ"),
            Stage::TimeBased => write!(f, "Time-based"),
            Stage::Stereo => write!(f, "Stereo"),
            Stage::Loudness => write!(f, "Loudness"),
        }
    }
}

/// Kind of processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Eq,
    HighPass,
    LowPass,
    Compression,
    Reverb,
    Delay,
    StereoWidth,
    Gain,
    Limiter,
    LoudnessTarget,
}

impl OperationKind {
    /// Fixed order of kinds sharing a stage
    pub fn rank(&self) -> u8 {
        match self {
            OperationKind::HighPass => 0,
            OperationKind::LowPass => 1,
            OperationKind::Eq => 2,
            OperationKind::Compression => 3,
            OperationKind::Delay => 4,
            OperationKind::Reverb => 5,
            OperationKind::StereoWidth => 6,
            OperationKind::Gain => 7,
            OperationKind::Limiter => 8,
            OperationKind::LoudnessTarget => 9,
        }
    }

    /// Stable identifier used in manifests and engine requests
    pub fn id(&self) -> &'static str {
        match self {
            OperationKind::Eq => "eq",
            OperationKind::HighPass => "high_pass",
            OperationKind::LowPass => "low_pass",
            OperationKind::Compression => "compression",
            OperationKind::Reverb => "reverb",
            OperationKind::Delay => "delay",
            OperationKind::StereoWidth => "stereo_width",
            OperationKind::Gain => "gain",
            OperationKind::Limiter => "limiter",
            OperationKind::LoudnessTarget => "loudness_target",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Eq => "EQ",
            OperationKind::HighPass => "High-pass",
            OperationKind::LowPass => "Low-pass",
            OperationKind::Compression => "Compression",
            OperationKind::Reverb => "Reverb",
            OperationKind::Delay => "Delay",
            OperationKind::StereoWidth => "Stereo Width",
            OperationKind::Gain => "Gain",
            OperationKind::Limiter => "Limiter",
            OperationKind::LoudnessTarget => "Loudness",
        };
        write!(f, "{}", name)
    }
}

/// A parameter value: numeric or one of a closed set of choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Choice(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::Choice(c) => write!(f, "{}", c),
        }
    }
}

/// One processing step with concrete parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    kind: OperationKind,
    stage: Stage,
    params: BTreeMap<String, ParamValue>,
}

impl OperationSpec {
    pub fn new(kind: OperationKind, stage: Stage) -> Self {
        Self {
            kind,
            stage,
            params: BTreeMap::new(),
        }
    }

    /// Return a copy with a numeric parameter set
    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), ParamValue::Number(value));
        self
    }

    /// Return a copy with a choice parameter set
    pub fn with_choice(mut self, name: &str, value: &str) -> Self {
        self.params
            .insert(name.to_string(), ParamValue::Choice(value.to_string()));
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.params.get(name) {
            Some(ParamValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn choice(&self, name: &str) -> Option<&str> {
        match self.params.get(name) {
            Some(ParamValue::Choice(c)) => Some(c.as_str()),
            _ => None,
        }
    }

    /// Numeric parameter or `InvalidParameter`
    pub fn require_number(&self, name: &str) -> Result<f64> {
        self.number(name).ok_or_else(|| MixError::InvalidParameter {
            operation: self.kind.id().to_string(),
            param: name.to_string(),
            value: self
                .params
                .get(name)
                .map_or_else(|| "missing".to_string(), |v| v.to_string()),
            expected: "a number".to_string(),
        })
    }

    /// Choice parameter or `InvalidParameter`
    pub fn require_choice(&self, name: &str) -> Result<&str> {
        self.choice(name).ok_or_else(|| MixError::InvalidParameter {
            operation: self.kind.id().to_string(),
            param: name.to_string(),
            value: self
                .params
                .get(name)
                .map_or_else(|| "missing".to_string(), |v| v.to_string()),
            expected: "a named choice".to_string(),
        })
    }

    /// Key that orders specs canonically: stage, kind rank, then parameters
    fn sort_key(&self) -> (Stage, u8, String) {
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        (self.stage, self.kind.rank(), params)
    }

    /// Short human-readable description, e.g. `EQ high_shelf 10000Hz +3.0dB`
    pub fn describe(&self) -> String {
        let n = |name: &str| self.number(name).unwrap_or_default();
        match self.kind {
            OperationKind::Eq => format!(
                "EQ {} {}Hz {:+.1}dB q={}",
                self.choice("filter").unwrap_or("peak"),
                n("frequency"),
                n("gain_db"),
                n("q")
            ),
            OperationKind::HighPass => format!("High-pass {}Hz", n("frequency")),
            OperationKind::LowPass => format!("Low-pass {}Hz", n("frequency")),
            OperationKind::Compression => format!(
                "Compression {:.1}:1 @ {}dB (attack {}ms, release {}ms)",
                n("ratio"),
                n("threshold_db"),
                n("attack_ms"),
                n("release_ms")
            ),
            OperationKind::Reverb => format!(
                "Reverb room={:.2} damping={:.2} wet={:.2} decay={:.1}s",
                n("room_size"),
                n("damping"),
                n("wet"),
                n("decay_s")
            ),
            OperationKind::Delay => format!(
                "Delay {}ms feedback={:.2} mix={:.2}",
                n("time_ms"),
                n("feedback"),
                n("mix")
            ),
            OperationKind::StereoWidth => format!("Stereo Width {:.2}x", n("width")),
            OperationKind::Gain => format!("Gain {:+.1}dB", n("gain_db")),
            OperationKind::Limiter => format!("Limiter ceiling {}dB", n("ceiling_db")),
            OperationKind::LoudnessTarget => format!(
                "Loudness {} LUFS (true peak {}dB)",
                n("lufs"),
                n("true_peak_db")
            ),
        }
    }
}

/// Ordered, immutable sequence of operation specs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationChain {
    ops: Vec<OperationSpec>,
}

impl OperationChain {
    /// Chain with no operations (version 0)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Chain that keeps the given order as-is
    pub fn from_ordered(ops: Vec<OperationSpec>) -> Self {
        Self { ops }
    }

    /// Chain in canonical stage order with exact repeats removed.
    ///
    /// The result does not depend on the order of `ops`.
    pub fn canonical(mut ops: Vec<OperationSpec>) -> Self {
        ops.sort_by_cached_key(|op| op.sort_key());
        ops.dedup();
        Self { ops }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationSpec> {
        self.ops.iter()
    }

    pub fn ops(&self) -> &[OperationSpec] {
        &self.ops
    }

    /// True if stages never decrease along the chain
    pub fn is_canonically_ordered(&self) -> bool {
        self.ops.windows(2).all(|w| w[0].stage <= w[1].stage)
    }

    /// SHA-256 of the chain's JSON form, hex encoded
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.ops).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    /// One line per operation
    pub fn describe(&self) -> Vec<String> {
        self.ops.iter().map(OperationSpec::describe).collect()
    }
}

impl<'a> IntoIterator for &'a OperationChain {
    type Item = &'a OperationSpec;
    type IntoIter = std::slice::Iter<'a, OperationSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
