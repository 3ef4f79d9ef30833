//! Agent Tests
//!
//! Prompt interpretation through the public API.

use pretty_assertions::assert_eq;
use test_case::test_case;

use mix_engineer::agent::{interpret, resolve, Concept, Modifier};
use mix_engineer::dsp::{validate_chain, OperationKind, Stage};
use mix_engineer::MixError;

#[test_case("make it brighter" ; "brighter")]
#[test_case("add some hall reverb and compress" ; "reverb and compression")]
#[test_case("wider, punchy, less muddy, master for streaming" ; "full chain")]
#[test_case("echo 300ms, cut bass by 4db then limit" ; "explicit values")]
fn test_chain_is_canonical_and_valid(prompt: &str) {
    let interp = interpret(prompt).unwrap();
    assert!(interp.chain.is_canonically_ordered(), "{:?}", interp.chain.describe());
    validate_chain(&interp.chain).unwrap();
}

#[test]
fn test_phrase_order_does_not_matter() {
    let forward = interpret("less muddy, glue, plate reverb, wider, louder").unwrap();
    let backward = interpret("louder and wider then plate reverb. glue; less muddy").unwrap();
    assert_eq!(forward.chain, backward.chain);
    assert_eq!(forward.chain.fingerprint(), backward.chain.fingerprint());

    let stages: Vec<Stage> = forward.chain.iter().map(|s| s.stage()).collect();
    assert_eq!(
        stages,
        vec![
            Stage::CorrectiveEq,
            Stage::Dynamics,
            Stage::TimeBased,
            Stage::Stereo,
            Stage::Loudness
        ]
    );
}

#[test]
fn test_master_for_streaming() {
    let interp = interpret("master it for streaming").unwrap();
    let kinds: Vec<OperationKind> = interp.chain.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::HighPass,
            OperationKind::Compression,
            OperationKind::Eq,
            OperationKind::Eq,
            OperationKind::Limiter,
            OperationKind::LoudnessTarget,
        ]
    );
    let loudness = interp.chain.ops().last().unwrap();
    assert_eq!(loudness.number("lufs"), Some(-14.0));
    assert_eq!(loudness.number("true_peak_db"), Some(-1.5));
}

#[test]
fn test_podcast_master_target() {
    let interp = interpret("master for podcast").unwrap();
    let loudness = interp.chain.ops().last().unwrap();
    assert_eq!(loudness.number("lufs"), Some(-16.0));
}

#[test]
fn test_nonsense_is_nothing_understood() {
    match interpret("xyzzy nonsense") {
        Err(MixError::NothingUnderstood { unrecognized }) => {
            assert_eq!(unrecognized, vec!["xyzzy".to_string(), "nonsense".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_modifiers_scale_magnitude() {
    let slight = interpret("slightly brighter").unwrap();
    let plain = interpret("brighter").unwrap();
    let more = interpret("much brighter").unwrap();
    let gain = |i: &mix_engineer::Interpretation| i.chain.ops()[0].number("gain_db").unwrap();
    assert!(gain(&slight) < gain(&plain));
    assert!(gain(&plain) < gain(&more));
    assert_eq!(slight.matched[0].modifier, Some(Modifier::Slight));
}

#[test]
fn test_conflicting_requests_keep_last() {
    let interp = interpret("add a room reverb, actually a hall").unwrap();
    assert_eq!(interp.matched.len(), 1);
    assert_eq!(interp.matched[0].concept, Concept::HallReverb);
    assert_eq!(interp.conflicts.len(), 1);
    assert_eq!(interp.conflicts[0].overridden, Concept::RoomReverb);
    assert_eq!(interp.unrecognized, vec!["actually".to_string()]);
}

#[test]
fn test_resolve_single_terms() {
    assert_eq!(resolve("punch").unwrap()[0].kind(), OperationKind::Compression);
    assert_eq!(resolve("Mono").unwrap()[0].number("width"), Some(0.0));
    assert!(resolve("flanger").is_err());
}
