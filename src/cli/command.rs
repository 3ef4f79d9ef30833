//! Line-oriented command parsing
//!
//! Keywords without arguments (`undo`, `history`, ...) only count when they
//! are the whole line; anything else that is not a known command is a
//! mixing prompt.

use std::path::PathBuf;

use crate::config::parse_bitrate;
use crate::error::{MixError, Result};

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open or create a session
    Session(String),
    /// Load a source; `replace` discards existing history
    Source { path: PathBuf, replace: bool },
    /// Free-text mixing instruction
    Prompt(String),
    History,
    Undo,
    Checkout(usize),
    Export { target: String, bitrate_kbps: Option<u32> },
    Status,
    Sessions,
    Help,
    Quit,
    /// Blank line or comment
    Empty,
}

impl Command {
    /// Parse one input line
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Command::Empty);
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };
        let malformed = |reason: &str| MixError::MalformedCommand {
            input: line.to_string(),
            reason: reason.to_string(),
        };

        let command = match (keyword.to_ascii_lowercase().as_str(), rest.is_empty()) {
            ("quit" | "exit" | "q", true) => Command::Quit,
            ("history", true) => Command::History,
            ("undo", true) => Command::Undo,
            ("status", true) => Command::Status,
            ("sessions", true) => Command::Sessions,
            ("help" | "?", true) => Command::Help,
            ("session", true) => return Err(malformed("usage: session <name>")),
            ("session", false) => {
                if rest.contains(char::is_whitespace) {
                    return Err(malformed("session names cannot contain spaces"));
                }
                Command::Session(rest.to_string())
            }
            ("source" | "source!", true) => return Err(malformed("usage: source <file.wav>")),
            ("source", false) => Command::Source {
                path: PathBuf::from(unquote(rest)),
                replace: false,
            },
            ("source!", false) => Command::Source {
                path: PathBuf::from(unquote(rest)),
                replace: true,
            },
            ("checkout", true) => return Err(malformed("usage: checkout <version>")),
            ("checkout", false) => {
                let index = rest
                    .trim_start_matches(['v', 'V'])
                    .parse()
                    .map_err(|_| malformed("version must be a number"))?;
                Command::Checkout(index)
            }
            ("export", true) => return Err(malformed("usage: export <name>[.mp3|.wav|.flac|.ogg|.m4a] [<kbps>k]")),
            ("export", false) => parse_export(rest),
            _ => Command::Prompt(line.to_string()),
        };
        Ok(command)
    }
}

/// `export <target> [<kbps>k]`
fn parse_export(rest: &str) -> Command {
    if let Some((target, last)) = rest.rsplit_once(char::is_whitespace) {
        if last.ends_with(['k', 'K']) {
            if let Ok(kbps) = parse_bitrate(last) {
                return Command::Export {
                    target: unquote(target.trim()).to_string(),
                    bitrate_kbps: Some(kbps),
                };
            }
        }
    }
    Command::Export {
        target: unquote(rest).to_string(),
        bitrate_kbps: None,
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("quit", Command::Quit ; "quit")]
    #[test_case("  EXIT ", Command::Quit ; "exit upper")]
    #[test_case("q", Command::Quit ; "q")]
    #[test_case("history", Command::History ; "history")]
    #[test_case("undo", Command::Undo ; "undo")]
    #[test_case("status", Command::Status ; "status")]
    #[test_case("sessions", Command::Sessions ; "sessions")]
    #[test_case("help", Command::Help ; "help")]
    #[test_case("", Command::Empty ; "blank")]
    #[test_case("# comment", Command::Empty ; "comment")]
    #[test_case("session demo", Command::Session("demo".to_string()) ; "session")]
    #[test_case("checkout 3", Command::Checkout(3) ; "checkout")]
    #[test_case("checkout v2", Command::Checkout(2) ; "checkout prefixed")]
    fn test_parse(line: &str, expected: Command) {
        assert_eq!(Command::parse(line).unwrap(), expected);
    }

    #[test]
    fn test_source_variants() {
        assert_eq!(
            Command::parse("source \"my song.wav\"").unwrap(),
            Command::Source {
                path: PathBuf::from("my song.wav"),
                replace: false
            }
        );
        assert_eq!(
            Command::parse("source! b.wav").unwrap(),
            Command::Source {
                path: PathBuf::from("b.wav"),
                replace: true
            }
        );
    }

    #[test]
    fn test_export_with_bitrate() {
        assert_eq!(
            Command::parse("export final mix.mp3 192k").unwrap(),
            Command::Export {
                target: "final mix.mp3".to_string(),
                bitrate_kbps: Some(192)
            }
        );
        assert_eq!(
            Command::parse("export out").unwrap(),
            Command::Export {
                target: "out".to_string(),
                bitrate_kbps: None
            }
        );
    }

    #[test]
    fn test_keywords_with_text_are_prompts() {
        assert_eq!(
            Command::parse("undo the reverb").unwrap(),
            Command::Prompt("undo the reverb".to_string())
        );
        assert_eq!(
            Command::parse("make it brighter").unwrap(),
            Command::Prompt("make it brighter".to_string())
        );
    }

    #[test_case("session" ; "missing name")]
    #[test_case("session two words" ; "spaces")]
    #[test_case("source" ; "missing path")]
    #[test_case("checkout latest" ; "bad version")]
    #[test_case("export" ; "missing target")]
    fn test_malformed(line: &str) {
        assert!(matches!(Command::parse(line), Err(MixError::MalformedCommand { .. })));
    }
}
