//! Operation vocabulary
//!
//! A closed table mapping trigger phrases to mixing concepts, and each
//! concept to template operations with default parameters. Resolution is
//! pure: the same words always produce the same specs.

use std::fmt;

use serde::Serialize;

use crate::dsp::{clamp_to_contract, OperationKind, OperationSpec, Stage};
use crate::error::{MixError, Result};

/// Suffixes accepted on a trigger word (`bright` matches `brighter`, `brightness`)
const SUFFIXES: &[&str] = &[
    "s", "es", "er", "r", "est", "ness", "en", "th", "y", "ed", "ing", "ion", "or",
];

/// Q of the vocabulary's shelving filters
const SHELF_Q: f64 = 0.7;

// ============================================================================
// Concepts and slots
// ============================================================================

/// What a trigger phrase means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Brighten,
    Darken,
    Warm,
    MoreBass,
    LessBass,
    MoreMids,
    LessMids,
    ClearMud,
    TameHarshness,
    Rumble,
    Hiss,
    Compress,
    Punch,
    Glue,
    Reverb,
    HallReverb,
    RoomReverb,
    PlateReverb,
    DryReverb,
    Echo,
    Wider,
    Narrower,
    Mono,
    Louder,
    Quieter,
    Limit,
    MasterStreaming,
    MasterClub,
    MasterPodcast,
}

impl Concept {
    /// What "less"/"not"/"no" before this concept asks for.
    ///
    /// Opposites swap; concepts that already remove a problem ("less mud")
    /// stay as they are. `None` when a new operation cannot express it,
    /// e.g. "less compression" on audio that is already compressed.
    pub fn negated(self) -> Option<Concept> {
        use Concept::*;
        match self {
            Brighten => Some(Darken),
            Darken => Some(Brighten),
            MoreBass => Some(LessBass),
            LessBass => Some(MoreBass),
            MoreMids => Some(LessMids),
            LessMids => Some(MoreMids),
            Wider => Some(Narrower),
            Narrower => Some(Wider),
            Louder => Some(Quieter),
            Quieter => Some(Louder),
            Reverb | HallReverb | RoomReverb | PlateReverb => Some(DryReverb),
            DryReverb => Some(Reverb),
            ClearMud | TameHarshness | Rumble | Hiss => Some(self),
            Warm | Compress | Punch | Glue | Echo | Mono | Limit | MasterStreaming | MasterClub
            | MasterPodcast => None,
        }
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Concept::Brighten => "brighten",
            Concept::Darken => "darken",
            Concept::Warm => "warm",
            Concept::MoreBass => "more bass",
            Concept::LessBass => "less bass",
            Concept::MoreMids => "more mids",
            Concept::LessMids => "less mids",
            Concept::ClearMud => "clear mud",
            Concept::TameHarshness => "tame harshness",
            Concept::Rumble => "remove rumble",
            Concept::Hiss => "remove hiss",
            Concept::Compress => "compress",
            Concept::Punch => "punch",
            Concept::Glue => "glue",
            Concept::Reverb => "reverb",
            Concept::HallReverb => "hall reverb",
            Concept::RoomReverb => "room reverb",
            Concept::PlateReverb => "plate reverb",
            Concept::DryReverb => "dry reverb",
            Concept::Echo => "echo",
            Concept::Wider => "wider",
            Concept::Narrower => "narrower",
            Concept::Mono => "mono",
            Concept::Louder => "louder",
            Concept::Quieter => "quieter",
            Concept::Limit => "limit",
            Concept::MasterStreaming => "master for streaming",
            Concept::MasterClub => "master for club",
            Concept::MasterPodcast => "master for podcast",
        };
        write!(f, "{}", name)
    }
}

/// Conflict group: two concepts in one slot cannot both apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Treble,
    Bass,
    Mids,
    Mud,
    Harshness,
    LowCut,
    HighCut,
    Dynamics,
    Reverb,
    Delay,
    Width,
    Level,
    Limiter,
    Master,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Treble => "treble",
            Slot::Bass => "bass",
            Slot::Mids => "mids",
            Slot::Mud => "mud",
            Slot::Harshness => "harshness",
            Slot::LowCut => "low cut",
            Slot::HighCut => "high cut",
            Slot::Dynamics => "dynamics",
            Slot::Reverb => "reverb",
            Slot::Delay => "delay",
            Slot::Width => "width",
            Slot::Level => "level",
            Slot::Limiter => "limiter",
            Slot::Master => "master",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Modifiers and scaling
// ============================================================================

/// Magnitude words that scale the next trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Slight,
    More,
    Heavy,
}

impl Modifier {
    pub fn multiplier(&self) -> f64 {
        match self {
            Modifier::Slight => 0.5,
            Modifier::More => 1.5,
            Modifier::Heavy => 1.8,
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "little" | "bit" | "slightly" | "touch" | "subtle" | "subtly" | "gentle" | "gently" | "light"
            | "lightly" | "tad" => Some(Modifier::Slight),
            "more" | "much" | "lot" | "really" | "extra" => Some(Modifier::More),
            "heavy" | "heavily" | "very" | "extremely" | "lots" | "tons" | "way" | "massive" | "huge" => {
                Some(Modifier::Heavy)
            }
            _ => None,
        }
    }
}

/// How a modifier changes a numeric default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// value × m
    Linear,
    /// (value − 1) × m + 1
    AroundUnity,
    /// Never scaled
    Fixed,
}

impl Scale {
    pub fn apply(&self, value: f64, multiplier: f64) -> f64 {
        match self {
            Scale::Linear => value * multiplier,
            Scale::AroundUnity => (value - 1.0) * multiplier + 1.0,
            Scale::Fixed => value,
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

/// One numeric template parameter
#[derive(Debug, Clone, Copy)]
pub struct ParamDefault {
    pub name: &'static str,
    pub value: f64,
    pub scale: Scale,
}

const fn p(name: &'static str, value: f64, scale: Scale) -> ParamDefault {
    ParamDefault { name, value, scale }
}

/// One template operation of a concept
#[derive(Debug, Clone, Copy)]
pub struct OpTemplate {
    pub kind: OperationKind,
    pub stage: Stage,
    /// EQ filter shape, if any
    pub filter: Option<&'static str>,
    pub params: &'static [ParamDefault],
}

impl OpTemplate {
    /// Concrete spec with every numeric default scaled by `multiplier` and
    /// clamped into the contract
    pub fn instantiate(&self, multiplier: f64) -> OperationSpec {
        let mut spec = OperationSpec::new(self.kind, self.stage);
        if let Some(filter) = self.filter {
            spec = spec.with_choice("filter", filter);
        }
        for param in self.params {
            let scaled = param.scale.apply(param.value, multiplier);
            spec = spec.with_number(param.name, clamp_to_contract(self.kind, param.name, scaled));
        }
        spec
    }
}

const fn eq(stage: Stage, filter: &'static str, params: &'static [ParamDefault]) -> OpTemplate {
    OpTemplate {
        kind: OperationKind::Eq,
        stage,
        filter: Some(filter),
        params,
    }
}

const fn op(kind: OperationKind, stage: Stage, params: &'static [ParamDefault]) -> OpTemplate {
    OpTemplate {
        kind,
        stage,
        filter: None,
        params,
    }
}

/// A vocabulary entry
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub concept: Concept,
    /// Trigger phrases, one to three words each
    pub triggers: &'static [&'static str],
    pub slot: Slot,
    pub ops: &'static [OpTemplate],
    /// Whether explicit numbers in the prompt may override defaults
    pub accepts_values: bool,
}

impl Entry {
    /// Specs for this entry, scaled by an optional modifier
    pub fn specs(&self, modifier: Option<Modifier>) -> Vec<OperationSpec> {
        let multiplier = modifier.map_or(1.0, |m| m.multiplier());
        self.ops.iter().map(|t| t.instantiate(multiplier)).collect()
    }
}

use self::Scale::{AroundUnity, Fixed, Linear};
use crate::dsp::OperationKind as K;
use crate::dsp::Stage as S;

const fn shelf(filter: &'static str, params: &'static [ParamDefault]) -> OpTemplate {
    eq(S::CreativeEq, filter, params)
}

const BRIGHT: [ParamDefault; 3] = [p("frequency", 10000.0, Fixed), p("gain_db", 3.0, Linear), p("q", SHELF_Q, Fixed)];
const DARK: [ParamDefault; 3] = [p("frequency", 10000.0, Fixed), p("gain_db", -3.0, Linear), p("q", SHELF_Q, Fixed)];
const WARM_LOW: [ParamDefault; 3] = [p("frequency", 100.0, Fixed), p("gain_db", 2.0, Linear), p("q", SHELF_Q, Fixed)];
const WARM_HIGH: [ParamDefault; 3] = [p("frequency", 10000.0, Fixed), p("gain_db", -1.0, Linear), p("q", SHELF_Q, Fixed)];
const BASS_UP: [ParamDefault; 3] = [p("frequency", 100.0, Fixed), p("gain_db", 4.0, Linear), p("q", SHELF_Q, Fixed)];
const BASS_DOWN: [ParamDefault; 3] = [p("frequency", 100.0, Fixed), p("gain_db", -4.0, Linear), p("q", SHELF_Q, Fixed)];
const MIDS_UP: [ParamDefault; 3] = [p("frequency", 1000.0, Fixed), p("gain_db", 3.0, Linear), p("q", 1.0, Fixed)];
const MIDS_DOWN: [ParamDefault; 3] = [p("frequency", 1000.0, Fixed), p("gain_db", -4.0, Linear), p("q", 1.0, Fixed)];
const MUD: [ParamDefault; 3] = [p("frequency", 300.0, Fixed), p("gain_db", -3.0, Linear), p("q", 1.2, Fixed)];
const HARSH: [ParamDefault; 3] = [p("frequency", 3500.0, Fixed), p("gain_db", -3.0, Linear), p("q", 1.5, Fixed)];
const RUMBLE: [ParamDefault; 1] = [p("frequency", 80.0, Fixed)];
const HISS: [ParamDefault; 1] = [p("frequency", 18000.0, Fixed)];

const fn compression(threshold_db: f64, ratio: f64, attack_ms: f64, release_ms: f64) -> [ParamDefault; 4] {
    [
        p("threshold_db", threshold_db, Fixed),
        p("ratio", ratio, Linear),
        p("attack_ms", attack_ms, Fixed),
        p("release_ms", release_ms, Fixed),
    ]
}

const COMPRESS: [ParamDefault; 4] = compression(-20.0, 4.0, 5.0, 50.0);
const PUNCH: [ParamDefault; 4] = compression(-20.0, 4.0, 20.0, 50.0);
const GLUE: [ParamDefault; 4] = compression(-10.0, 2.0, 10.0, 100.0);

const fn reverb(room: f64, damping: f64, wet: f64, decay_s: f64) -> [ParamDefault; 4] {
    [
        p("room_size", room, Linear),
        p("damping", damping, Fixed),
        p("wet", wet, Linear),
        p("decay_s", decay_s, Linear),
    ]
}

const REVERB: [ParamDefault; 4] = reverb(0.5, 0.5, 0.3, 1.5);
const HALL: [ParamDefault; 4] = reverb(0.9, 0.5, 0.4, 3.0);
const ROOM: [ParamDefault; 4] = reverb(0.3, 0.5, 0.2, 0.8);
const PLATE: [ParamDefault; 4] = reverb(0.6, 0.3, 0.3, 1.8);
const DRY: [ParamDefault; 4] = reverb(0.3, 0.7, 0.1, 0.5);

const ECHO: [ParamDefault; 3] = [p("time_ms", 250.0, Fixed), p("feedback", 0.3, Linear), p("mix", 0.25, Linear)];
const WIDER: [ParamDefault; 1] = [p("width", 1.5, AroundUnity)];
const NARROWER: [ParamDefault; 1] = [p("width", 0.5, AroundUnity)];
const MONO: [ParamDefault; 1] = [p("width", 0.0, Fixed)];
const LOUDER: [ParamDefault; 1] = [p("gain_db", 3.0, Linear)];
const QUIETER: [ParamDefault; 1] = [p("gain_db", -3.0, Linear)];
const CEILING: [ParamDefault; 1] = [p("ceiling_db", -1.0, Fixed)];

// Mastering chain: HP 30 Hz, gentle compression, shelves, limiter, loudness
const MASTER_HP: [ParamDefault; 1] = [p("frequency", 30.0, Fixed)];
const MASTER_COMP: [ParamDefault; 4] = [
    p("threshold_db", -18.0, Fixed),
    p("ratio", 3.0, Fixed),
    p("attack_ms", 10.0, Fixed),
    p("release_ms", 100.0, Fixed),
];
const MASTER_LOW: [ParamDefault; 3] = [p("frequency", 100.0, Fixed), p("gain_db", 1.0, Fixed), p("q", SHELF_Q, Fixed)];
const MASTER_HIGH: [ParamDefault; 3] = [p("frequency", 10000.0, Fixed), p("gain_db", 1.5, Fixed), p("q", SHELF_Q, Fixed)];
const STREAMING_TARGET: [ParamDefault; 2] = [p("lufs", -14.0, Fixed), p("true_peak_db", -1.5, Fixed)];
const CLUB_TARGET: [ParamDefault; 2] = [p("lufs", -9.0, Fixed), p("true_peak_db", -0.3, Fixed)];
const PODCAST_TARGET: [ParamDefault; 2] = [p("lufs", -16.0, Fixed), p("true_peak_db", -1.5, Fixed)];

const fn master(target: &'static [ParamDefault]) -> [OpTemplate; 6] {
    [
        op(K::HighPass, S::CorrectiveEq, &MASTER_HP),
        op(K::Compression, S::Dynamics, &MASTER_COMP),
        shelf("low_shelf", &MASTER_LOW),
        shelf("high_shelf", &MASTER_HIGH),
        op(K::Limiter, S::Loudness, &CEILING),
        op(K::LoudnessTarget, S::Loudness, target),
    ]
}

const MASTER_STREAMING: [OpTemplate; 6] = master(&STREAMING_TARGET);
const MASTER_CLUB: [OpTemplate; 6] = master(&CLUB_TARGET);
const MASTER_PODCAST: [OpTemplate; 6] = master(&PODCAST_TARGET);

/// The vocabulary. Trigger phrases are unique across entries.
pub static VOCABULARY: &[Entry] = &[
    Entry {
        concept: Concept::Brighten,
        triggers: &["bright", "crisp", "treble", "sparkle", "air", "brilliance", "less dark"],
        slot: Slot::Treble,
        ops: &[shelf("high_shelf", &BRIGHT)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Darken,
        triggers: &["dark", "dull", "mellow", "less treble", "cut treble", "less bright"],
        slot: Slot::Treble,
        ops: &[shelf("high_shelf", &DARK)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Warm,
        triggers: &["warm"],
        slot: Slot::Treble,
        ops: &[shelf("low_shelf", &WARM_LOW), shelf("high_shelf", &WARM_HIGH)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::MoreBass,
        triggers: &["bass", "low end", "bottom", "boost bass"],
        slot: Slot::Bass,
        ops: &[shelf("low_shelf", &BASS_UP)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::LessBass,
        triggers: &["less bass", "cut bass", "reduce bass", "thin"],
        slot: Slot::Bass,
        ops: &[shelf("low_shelf", &BASS_DOWN)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::MoreMids,
        triggers: &["mids", "mid", "presence", "boost mids"],
        slot: Slot::Mids,
        ops: &[eq(S::CreativeEq, "peak", &MIDS_UP)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::LessMids,
        triggers: &["scoop", "scooped", "less mids", "cut mids", "boxy"],
        slot: Slot::Mids,
        ops: &[eq(S::CreativeEq, "peak", &MIDS_DOWN)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::ClearMud,
        triggers: &["muddy", "mud", "clear", "clarity", "less muddy"],
        slot: Slot::Mud,
        ops: &[eq(S::CorrectiveEq, "peak", &MUD)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::TameHarshness,
        triggers: &["harsh", "sibilant", "smooth", "less harsh"],
        slot: Slot::Harshness,
        ops: &[eq(S::CorrectiveEq, "peak", &HARSH)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Rumble,
        triggers: &["rumble", "high pass", "low cut"],
        slot: Slot::LowCut,
        ops: &[op(K::HighPass, S::CorrectiveEq, &RUMBLE)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Hiss,
        triggers: &["hiss", "low pass", "high cut"],
        slot: Slot::HighCut,
        ops: &[op(K::LowPass, S::CorrectiveEq, &HISS)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Compress,
        triggers: &["compress", "compression", "compressor", "dynamics", "squash", "thick"],
        slot: Slot::Dynamics,
        ops: &[op(K::Compression, S::Dynamics, &COMPRESS)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Punch,
        triggers: &["punch", "punchy", "snappy"],
        slot: Slot::Dynamics,
        ops: &[op(K::Compression, S::Dynamics, &PUNCH)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Glue,
        triggers: &["glue", "cohesive"],
        slot: Slot::Dynamics,
        ops: &[op(K::Compression, S::Dynamics, &GLUE)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Reverb,
        triggers: &["reverb", "space", "ambient", "ambience", "atmosphere", "depth", "wet"],
        slot: Slot::Reverb,
        ops: &[op(K::Reverb, S::TimeBased, &REVERB)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::HallReverb,
        triggers: &["hall", "hall reverb", "big", "bigger", "large"],
        slot: Slot::Reverb,
        ops: &[op(K::Reverb, S::TimeBased, &HALL)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::RoomReverb,
        triggers: &["room", "room reverb"],
        slot: Slot::Reverb,
        ops: &[op(K::Reverb, S::TimeBased, &ROOM)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::PlateReverb,
        triggers: &["plate", "plate reverb"],
        slot: Slot::Reverb,
        ops: &[op(K::Reverb, S::TimeBased, &PLATE)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::DryReverb,
        triggers: &["dry", "less reverb"],
        slot: Slot::Reverb,
        ops: &[op(K::Reverb, S::TimeBased, &DRY)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Echo,
        triggers: &["delay", "echo", "slapback"],
        slot: Slot::Delay,
        ops: &[op(K::Delay, S::TimeBased, &ECHO)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Wider,
        triggers: &["wide", "width", "spread", "stereo", "widen"],
        slot: Slot::Width,
        ops: &[op(K::StereoWidth, S::Stereo, &WIDER)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Narrower,
        triggers: &["narrow", "centered", "focused"],
        slot: Slot::Width,
        ops: &[op(K::StereoWidth, S::Stereo, &NARROWER)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Mono,
        triggers: &["mono"],
        slot: Slot::Width,
        ops: &[op(K::StereoWidth, S::Stereo, &MONO)],
        accepts_values: false,
    },
    Entry {
        concept: Concept::Louder,
        triggers: &["loud", "turn up", "boost", "volume up"],
        slot: Slot::Level,
        ops: &[op(K::Gain, S::Loudness, &LOUDER)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Quieter,
        triggers: &["quiet", "soft", "turn down", "volume down"],
        slot: Slot::Level,
        ops: &[op(K::Gain, S::Loudness, &QUIETER)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::Limit,
        triggers: &["limit", "limiter", "brickwall"],
        slot: Slot::Limiter,
        ops: &[op(K::Limiter, S::Loudness, &CEILING)],
        accepts_values: true,
    },
    Entry {
        concept: Concept::MasterStreaming,
        triggers: &["master", "mastering", "streaming", "spotify", "finalize", "polish", "release"],
        slot: Slot::Master,
        ops: &MASTER_STREAMING,
        accepts_values: false,
    },
    Entry {
        concept: Concept::MasterClub,
        triggers: &["club", "cd", "loud master"],
        slot: Slot::Master,
        ops: &MASTER_CLUB,
        accepts_values: false,
    },
    Entry {
        concept: Concept::MasterPodcast,
        triggers: &["podcast", "broadcast", "speech"],
        slot: Slot::Master,
        ops: &MASTER_PODCAST,
        accepts_values: false,
    },
];

// ============================================================================
// Lookup
// ============================================================================

/// True if `token` is `trigger` or an inflection of it
pub fn word_matches(token: &str, trigger: &str) -> bool {
    if token == trigger {
        return true;
    }
    let Some(rest) = token.strip_prefix(trigger) else {
        return false;
    };
    if SUFFIXES.contains(&rest) {
        return true;
    }
    // Doubled final consonant: big -> bigger, thin -> thinner
    match (trigger.chars().last(), rest.chars().next()) {
        (Some(last), Some(first)) if last == first => SUFFIXES.contains(&&rest[first.len_utf8()..]),
        _ => false,
    }
}

/// Words that turn the next trigger into its negation
pub fn is_negation(word: &str) -> bool {
    matches!(word, "less" | "not" | "no" | "without" | "fewer" | "reduce")
}

/// The vocabulary entry for `concept`
pub fn entry(concept: Concept) -> Option<&'static Entry> {
    VOCABULARY.iter().find(|e| e.concept == concept)
}

/// Entry whose trigger equals `words` exactly, or failing that, whose
/// trigger words each match the corresponding token up to inflection
pub fn lookup(words: &[&str]) -> Option<&'static Entry> {
    let exact = VOCABULARY.iter().find(|entry| {
        entry.triggers.iter().any(|t| {
            let parts: Vec<&str> = t.split_whitespace().collect();
            parts == words
        })
    });
    exact.or_else(|| {
        VOCABULARY.iter().find(|entry| {
            entry.triggers.iter().any(|t| {
                let parts: Vec<&str> = t.split_whitespace().collect();
                parts.len() == words.len() && parts.iter().zip(words).all(|(p, w)| word_matches(w, p))
            })
        })
    })
}

/// Resolve a single term to its default operations
pub fn resolve(term: &str) -> Result<Vec<OperationSpec>> {
    let lower = term.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    lookup(&words)
        .map(|entry| entry.specs(None))
        .ok_or_else(|| MixError::NothingUnderstood {
            unrecognized: vec![term.to_string()],
        })
}
