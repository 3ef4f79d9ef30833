//! Prompt interpretation
//!
//! Turns free text into an [`OperationChain`]. Matching is greedy per phrase
//! (longest trigger first), one concept wins per slot (the one mentioned
//! last), and the result is put in canonical stage order so it does not
//! depend on how the prompt was phrased.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::intent::{split_phrases, tokenize, ExplicitValue, Token};
use super::vocabulary::{self, is_negation, lookup, Concept, Entry, Modifier, Slot};
use crate::dsp::{clamp_to_contract, OperationChain, OperationKind, OperationSpec};
use crate::error::{MixError, Result};

/// Longest trigger phrase, in words
const MAX_TRIGGER_WORDS: usize = 3;

/// A vocabulary match in the prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTerm {
    /// The words as written
    pub term: String,
    pub concept: Concept,
    pub slot: Slot,
    pub modifier: Option<Modifier>,
}

/// Two concepts competed for one slot; the later mention won
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub slot: Slot,
    pub overridden: Concept,
    pub winner: Concept,
}

/// Result of interpreting one prompt
#[derive(Debug, Clone, Serialize)]
pub struct Interpretation {
    pub prompt: String,
    pub chain: OperationChain,
    /// Winning matches in mention order
    pub matched: Vec<MatchedTerm>,
    pub unrecognized: Vec<String>,
    pub conflicts: Vec<Conflict>,
}

impl Interpretation {
    /// One-line summary of what was understood
    pub fn summary(&self) -> String {
        self.matched
            .iter()
            .map(|m| match m.modifier {
                Some(modifier) => format!("{} ({:?})", m.concept, modifier).to_lowercase(),
                None => m.concept.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A match with its concrete specs
struct Resolved {
    term: MatchedTerm,
    specs: Vec<OperationSpec>,
    accepts_values: bool,
}

/// Interpret a prompt.
///
/// Returns `NothingUnderstood` instead of an empty chain.
pub fn interpret(text: &str) -> Result<Interpretation> {
    let mut resolved = Vec::new();
    let mut unrecognized = Vec::new();

    for phrase in split_phrases(text) {
        interpret_phrase(&phrase, &mut resolved, &mut unrecognized);
    }

    // Last mention wins per slot
    let mut winners: BTreeMap<Slot, usize> = BTreeMap::new();
    let mut conflicts = Vec::new();
    for (i, r) in resolved.iter().enumerate() {
        if let Some(previous) = winners.insert(r.term.slot, i) {
            let overridden = resolved[previous].term.concept;
            if overridden != r.term.concept {
                conflicts.push(Conflict {
                    slot: r.term.slot,
                    overridden,
                    winner: r.term.concept,
                });
            }
        }
    }

    if winners.is_empty() {
        if unrecognized.is_empty() {
            unrecognized.push(text.trim().to_string());
        }
        debug!(prompt = text, ?unrecognized, "Nothing understood");
        return Err(MixError::NothingUnderstood { unrecognized });
    }

    let mut keep: Vec<usize> = winners.into_values().collect();
    keep.sort_unstable();

    let mut matched = Vec::with_capacity(keep.len());
    let mut specs = Vec::new();
    for i in keep {
        let r = &resolved[i];
        matched.push(r.term.clone());
        specs.extend(r.specs.iter().cloned());
    }
    let chain = OperationChain::canonical(specs);

    debug!(
        prompt = text,
        matched = matched.len(),
        ops = chain.len(),
        conflicts = conflicts.len(),
        ?unrecognized,
        "Interpreted prompt"
    );

    Ok(Interpretation {
        prompt: text.to_string(),
        chain,
        matched,
        unrecognized,
        conflicts,
    })
}

fn interpret_phrase(phrase: &str, resolved: &mut Vec<Resolved>, unrecognized: &mut Vec<String>) {
    let tokens = tokenize(phrase);
    let first_match = resolved.len();

    let mut values = Vec::new();
    let mut pending: Option<Modifier> = None;
    // "less", "not": flips the next trigger
    let mut negation: Option<String> = None;
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Modifier(modifier) => {
                // "a little more": the first word of the run sets the size
                pending = pending.or(Some(*modifier));
                i += 1;
            }
            Token::Value { value, text } => {
                values.push((*value, text.clone()));
                i += 1;
            }
            Token::Word(word) => match longest_match(&tokens[i..]) {
                Some((matched, len)) => {
                    let mut term = words_of(&tokens[i..i + len]).join(" ");
                    i += len;
                    let entry = match negation.take() {
                        Some(neg) => {
                            term = format!("{} {}", neg, term);
                            match matched.concept.negated().and_then(vocabulary::entry) {
                                Some(entry) => entry,
                                None => {
                                    debug!(term = %term, "No operation expresses this negation");
                                    unrecognized.push(term);
                                    pending = None;
                                    continue;
                                }
                            }
                        }
                        None => matched,
                    };
                    resolved.push(Resolved {
                        term: MatchedTerm {
                            term,
                            concept: entry.concept,
                            slot: entry.slot,
                            modifier: pending,
                        },
                        specs: entry.specs(pending),
                        accepts_values: entry.accepts_values,
                    });
                    pending = None;
                }
                None if is_negation(word) && negation.is_none() => {
                    negation = Some(word.clone());
                    i += 1;
                }
                None => {
                    unrecognized.push(word.clone());
                    i += 1;
                }
            },
        }
    }
    if let Some(neg) = negation {
        unrecognized.push(neg);
    }

    for (value, text) in values {
        let applied = resolved[first_match..]
            .iter_mut()
            .filter(|r| r.accepts_values)
            .any(|r| apply_value(&mut r.specs, value));
        if !applied {
            unrecognized.push(text);
        }
    }
}

/// Longest run of leading words (up to three) naming a vocabulary entry
fn longest_match(tokens: &[Token]) -> Option<(&'static Entry, usize)> {
    let words = words_of(tokens);
    (1..=words.len().min(MAX_TRIGGER_WORDS))
        .rev()
        .find_map(|n| lookup(&words[..n]).map(|entry| (entry, n)))
}

/// Leading `Word` tokens
fn words_of(tokens: &[Token]) -> Vec<&str> {
    tokens
        .iter()
        .map_while(|t| match t {
            Token::Word(w) => Some(w.as_str()),
            _ => None,
        })
        .collect()
}

/// Override defaults of `specs` with an explicit value. Returns whether any
/// spec took it.
fn apply_value(specs: &mut [OperationSpec], value: ExplicitValue) -> bool {
    let mut applied = false;
    for spec in specs.iter_mut() {
        let update = match (value, spec.kind()) {
            (ExplicitValue::Decibels(db), OperationKind::Eq | OperationKind::Gain) => {
                let sign = spec.number("gain_db").map_or(1.0, f64::signum);
                Some(("gain_db", sign * db.abs()))
            }
            (ExplicitValue::Decibels(db), OperationKind::Limiter) => Some(("ceiling_db", -db.abs())),
            (ExplicitValue::Ratio(ratio), OperationKind::Compression) => Some(("ratio", ratio)),
            (ExplicitValue::Hertz(hz), OperationKind::HighPass | OperationKind::LowPass) => Some(("frequency", hz)),
            (ExplicitValue::Millis(ms), OperationKind::Delay) => Some(("time_ms", ms)),
            _ => None,
        };
        if let Some((param, v)) = update {
            let clamped = clamp_to_contract(spec.kind(), param, v);
            *spec = spec.clone().with_number(param, clamped);
            applied = true;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Stage;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn kinds(interp: &Interpretation) -> Vec<OperationKind> {
        interp.chain.iter().map(|s| s.kind()).collect()
    }

    #[test]
    fn test_brighter() {
        let interp = interpret("make it brighter").unwrap();
        assert_eq!(interp.chain.len(), 1);
        let spec = &interp.chain.ops()[0];
        assert_eq!(spec.kind(), OperationKind::Eq);
        assert_eq!(spec.choice("filter"), Some("high_shelf"));
        assert_relative_eq!(spec.number("gain_db").unwrap(), 3.0);
        assert!(interp.unrecognized.is_empty());
    }

    #[test]
    fn test_order_independent() {
        let a = interpret("add reverb, compress it and make it brighter").unwrap();
        let b = interpret("brighter. compress. reverb").unwrap();
        assert_eq!(a.chain, b.chain);
        assert_eq!(
            kinds(&a),
            vec![OperationKind::Compression, OperationKind::Eq, OperationKind::Reverb]
        );
        assert!(a.chain.is_canonically_ordered());
    }

    #[test]
    fn test_unrecognized_only() {
        let err = interpret("xyzzy nonsense").unwrap_err();
        match err {
            MixError::NothingUnderstood { unrecognized } => {
                assert_eq!(unrecognized, vec!["xyzzy", "nonsense"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fillers_only_is_nothing_understood() {
        assert!(matches!(
            interpret("make it please"),
            Err(MixError::NothingUnderstood { .. })
        ));
    }

    #[test]
    fn test_unrecognized_words_are_reported() {
        let interp = interpret("brighter with flux capacitor").unwrap();
        assert_eq!(interp.unrecognized, vec!["flux", "capacitor"]);
    }

    #[test]
    fn test_heavy_compression() {
        let interp = interpret("heavy compression").unwrap();
        let spec = &interp.chain.ops()[0];
        assert_relative_eq!(spec.number("ratio").unwrap(), 7.2);
        assert_eq!(interp.matched[0].modifier, Some(Modifier::Heavy));
    }

    #[test]
    fn test_modifier_run_uses_first_word() {
        let interp = interpret("a little more bass").unwrap();
        assert_eq!(interp.matched[0].modifier, Some(Modifier::Slight));
        assert_relative_eq!(interp.chain.ops()[0].number("gain_db").unwrap(), 2.0);
    }

    #[test]
    fn test_modifier_does_not_cross_phrases() {
        let interp = interpret("a little, brighter").unwrap();
        assert_eq!(interp.matched[0].modifier, None);
    }

    #[test]
    fn test_last_mention_wins_slot() {
        let interp = interpret("brighter then darker").unwrap();
        assert_eq!(interp.chain.len(), 1);
        assert_relative_eq!(interp.chain.ops()[0].number("gain_db").unwrap(), -3.0);
        assert_eq!(
            interp.conflicts,
            vec![Conflict {
                slot: Slot::Treble,
                overridden: Concept::Brighten,
                winner: Concept::Darken,
            }]
        );
    }

    #[test]
    fn test_longer_trigger_consumes_words() {
        let interp = interpret("hall reverb").unwrap();
        assert_eq!(interp.matched.len(), 1);
        assert_eq!(interp.matched[0].concept, Concept::HallReverb);
        assert!(interp.conflicts.is_empty());
        assert_relative_eq!(interp.chain.ops()[0].number("decay_s").unwrap(), 3.0);
    }

    #[test]
    fn test_repeats_are_deduplicated() {
        let interp = interpret("brighter, brighter").unwrap();
        assert_eq!(interp.chain.len(), 1);
        assert!(interp.conflicts.is_empty());
    }

    #[test]
    fn test_explicit_db_follows_direction() {
        let cut = interpret("cut bass by 6 db").unwrap();
        assert_relative_eq!(cut.chain.ops()[0].number("gain_db").unwrap(), -6.0);

        let boost = interpret("brighter 2db").unwrap();
        assert_relative_eq!(boost.chain.ops()[0].number("gain_db").unwrap(), 2.0);
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let comp = interpret("compress 6:1").unwrap();
        assert_relative_eq!(comp.chain.ops()[0].number("ratio").unwrap(), 6.0);

        let hp = interpret("high pass at 120hz").unwrap();
        assert_relative_eq!(hp.chain.ops()[0].number("frequency").unwrap(), 120.0);

        let echo = interpret("echo 400ms").unwrap();
        assert_relative_eq!(echo.chain.ops()[0].number("time_ms").unwrap(), 400.0);
    }

    #[test]
    fn test_explicit_value_is_clamped() {
        let interp = interpret("louder by 60db").unwrap();
        assert_relative_eq!(interp.chain.ops()[0].number("gain_db").unwrap(), 24.0);
    }

    #[test]
    fn test_value_without_recipient_is_unrecognized() {
        let interp = interpret("add reverb 4:1").unwrap();
        assert_eq!(interp.unrecognized, vec!["4:1"]);
    }

    #[test]
    fn test_master_ignores_values() {
        let interp = interpret("master for streaming -3db").unwrap();
        assert_eq!(interp.chain.len(), 6);
        assert_eq!(interp.unrecognized, vec!["-3db"]);
        let stages: Vec<Stage> = interp.chain.iter().map(|s| s.stage()).collect();
        assert_eq!(stages.first(), Some(&Stage::CorrectiveEq));
        assert_eq!(stages.last(), Some(&Stage::Loudness));
    }

    #[test]
    fn test_negation_flips_to_opposite() {
        let interp = interpret("less wide").unwrap();
        assert_eq!(interp.matched[0].concept, Concept::Narrower);
        assert_eq!(interp.matched[0].term, "less wide");
        assert_relative_eq!(interp.chain.ops()[0].number("width").unwrap(), 0.5);

        let interp = interpret("not so loud").unwrap();
        assert_eq!(kinds(&interp), vec![OperationKind::Gain]);
        assert_relative_eq!(interp.chain.ops()[0].number("gain_db").unwrap(), -3.0);
        assert!(interp.unrecognized.is_empty());
    }

    #[test]
    fn test_negation_keeps_modifier() {
        let interp = interpret("a little less loud").unwrap();
        assert_eq!(interp.matched[0].concept, Concept::Quieter);
        assert_relative_eq!(interp.chain.ops()[0].number("gain_db").unwrap(), -1.5);
    }

    #[test]
    fn test_negated_corrective_concept_is_unchanged() {
        let interp = interpret("less mud").unwrap();
        assert_eq!(interp.matched[0].concept, Concept::ClearMud);
        assert_relative_eq!(interp.chain.ops()[0].number("gain_db").unwrap(), -3.0);
    }

    #[test]
    fn test_negation_without_inverse_is_ignored() {
        match interpret("less compression") {
            Err(MixError::NothingUnderstood { unrecognized }) => {
                assert_eq!(unrecognized, vec!["less compression"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let interp = interpret("brighter, less punchy").unwrap();
        assert_eq!(kinds(&interp), vec![OperationKind::Eq]);
        assert_eq!(interp.unrecognized, vec!["less punchy"]);
    }

    #[test]
    fn test_trailing_negation_is_reported() {
        let interp = interpret("brighter, not").unwrap();
        assert_eq!(interp.unrecognized, vec!["not"]);
    }
}
