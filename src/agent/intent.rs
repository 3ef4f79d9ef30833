//! Prompt tokenization
//!
//! Splits a prompt into phrases and each phrase into tokens: content words,
//! magnitude modifiers and explicit values ("3dB", "4:1", "1khz", "250ms").
//! Filler words are dropped here so the matcher never sees them.

use serde::Serialize;

use super::vocabulary::Modifier;

/// Words that carry no mixing meaning
const FILLERS: &[&str] = &[
    "a", "about", "add", "an", "around", "at", "be", "by", "can", "could", "do", "for", "get", "give",
    "i", "in", "is", "it", "it's", "its", "just", "like", "make", "me", "mix", "my", "of", "on",
    "please", "ratio", "should", "so", "some", "song", "sound", "sounds", "that", "the", "this", "to",
    "track", "want", "with", "would", "you",
];

/// Words that end a phrase
const CONJUNCTIONS: &[&str] = &["and", "then", "but", "plus"];

/// A number with a unit, taken literally from the prompt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum ExplicitValue {
    Decibels(f64),
    Ratio(f64),
    Hertz(f64),
    Millis(f64),
}

/// One token of a phrase
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(String),
    Modifier(Modifier),
    Value { value: ExplicitValue, text: String },
}

pub fn is_filler(word: &str) -> bool {
    FILLERS.contains(&word)
}

/// Lowercase and split on `, . ; ! ?` and on conjunctions.
///
/// A period between two digits is a decimal point, not a boundary.
pub fn split_phrases(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();

    let mut pieces = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let decimal_point = c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if matches!(c, ',' | ';' | '!' | '?') || (c == '.' && !decimal_point) {
            pieces.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    pieces.push(current);

    let mut phrases = Vec::new();
    for piece in pieces {
        let mut words: Vec<&str> = Vec::new();
        for word in piece.split_whitespace() {
            if CONJUNCTIONS.contains(&word) {
                if !words.is_empty() {
                    phrases.push(words.join(" "));
                }
                words.clear();
            } else {
                words.push(word);
            }
        }
        if !words.is_empty() {
            phrases.push(words.join(" "));
        }
    }
    phrases
}

/// Tokenize one (lowercase) phrase
pub fn tokenize(phrase: &str) -> Vec<Token> {
    let words: Vec<&str> = phrase
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, '"' | '\'' | '(' | ')' | '[' | ']')))
        .filter(|w| !w.is_empty())
        .collect();

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let word = words[i];

        if let Some(value) = parse_value(word) {
            tokens.push(Token::Value {
                value,
                text: word.to_string(),
            });
            i += 1;
            continue;
        }

        // "3 db", "1 khz", "250 ms"
        if let (Ok(number), Some(unit)) = (word.parse::<f64>(), words.get(i + 1)) {
            if let Some(value) = with_unit(number, unit) {
                tokens.push(Token::Value {
                    value,
                    text: format!("{} {}", word, unit),
                });
                i += 2;
                continue;
            }
        }

        if let Some(modifier) = Modifier::from_word(word) {
            tokens.push(Token::Modifier(modifier));
        } else if !is_filler(word) {
            tokens.push(Token::Word(word.to_string()));
        }
        i += 1;
    }
    tokens
}

/// Parse a single-word value such as `-6db`, `4:1`, `1.5khz` or `250ms`
pub fn parse_value(word: &str) -> Option<ExplicitValue> {
    if let Some((num, den)) = word.split_once(':') {
        return match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(n), Ok(d)) if d == 1.0 && n.is_finite() => Some(ExplicitValue::Ratio(n)),
            _ => None,
        };
    }

    // Longest unit first so "khz" is not read as "hz"
    for unit in ["khz", "hz", "db", "ms"] {
        if let Some(number) = word.strip_suffix(unit) {
            if let Ok(n) = number.trim_start_matches('+').parse::<f64>() {
                return with_unit(n, unit);
            }
        }
    }
    None
}

fn with_unit(number: f64, unit: &str) -> Option<ExplicitValue> {
    if !number.is_finite() {
        return None;
    }
    match unit {
        "db" => Some(ExplicitValue::Decibels(number)),
        "hz" => Some(ExplicitValue::Hertz(number)),
        "khz" => Some(ExplicitValue::Hertz(number * 1000.0)),
        "ms" => Some(ExplicitValue::Millis(number)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_split_on_punctuation_and_conjunctions() {
        assert_eq!(
            split_phrases("Make it brighter, and add reverb. Then master it!"),
            vec!["make it brighter", "add reverb", "master it"]
        );
    }

    #[test]
    fn test_decimal_point_is_not_a_boundary() {
        assert_eq!(split_phrases("boost 1.5khz"), vec!["boost 1.5khz"]);
    }

    #[test_case("3db", ExplicitValue::Decibels(3.0) ; "attached db")]
    #[test_case("-6db", ExplicitValue::Decibels(-6.0) ; "negative db")]
    #[test_case("+2db", ExplicitValue::Decibels(2.0) ; "plus db")]
    #[test_case("4:1", ExplicitValue::Ratio(4.0) ; "ratio")]
    #[test_case("1khz", ExplicitValue::Hertz(1000.0) ; "khz")]
    #[test_case("1.5khz", ExplicitValue::Hertz(1500.0) ; "decimal khz")]
    #[test_case("250hz", ExplicitValue::Hertz(250.0) ; "hz")]
    #[test_case("250ms", ExplicitValue::Millis(250.0) ; "ms")]
    fn test_parse_value(word: &str, expected: ExplicitValue) {
        assert_eq!(parse_value(word), Some(expected));
    }

    #[test]
    fn test_parse_value_rejects_words() {
        assert_eq!(parse_value("reverb"), None);
        assert_eq!(parse_value("4:3"), None);
        assert_eq!(parse_value("db"), None);
    }

    #[test]
    fn test_tokenize_drops_fillers_and_pairs_units() {
        let tokens = tokenize("make it a little brighter by 2 db");
        assert_eq!(
            tokens,
            vec![
                Token::Modifier(Modifier::Slight),
                Token::Word("brighter".to_string()),
                Token::Value {
                    value: ExplicitValue::Decibels(2.0),
                    text: "2 db".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_tokenize_keeps_unknown_words() {
        assert_eq!(
            tokenize("xyzzy nonsense"),
            vec![Token::Word("xyzzy".to_string()), Token::Word("nonsense".to_string())]
        );
    }
}
