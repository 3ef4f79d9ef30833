//! Interactive command loop
//!
//! [`MixEngineer`] owns the active session and executes one [`Command`] at a
//! time. Every command produces printable lines; errors are reported as
//! `[CODE] message` plus a suggestion and never end the loop.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::info;

use super::command::Command;
use crate::agent::interpret;
use crate::config::Config;
use crate::engine::CancelFlag;
use crate::error::{MixError, Result};
use crate::export::{ExportFormat, Exporter};
use crate::processing::Processor;
use crate::session::{Session, SessionStore};

/// Extension added to export names that have none
const DEFAULT_EXPORT_EXTENSION: &str = "mp3";

const HELP: &str = "\
Commands:
  session <name>      open or create a session
  source <file.wav>   load the source audio (version 0)
  source! <file.wav>  replace the source, discarding history
  <prompt>            describe a change, e.g. 'make it brighter'
  history             list versions (* = current, + = active path)
  undo                step back to the previous version
  checkout <n>        make version n current
  export <name> [192k] write the current version (wav, mp3, flac, ogg, m4a)
  status              show the active session
  sessions            list stored sessions
  quit                leave

Example prompts:
  make it brighter
  a little more bass and less mud
  heavy compression, then add some hall reverb
  wider, with a 250ms echo
  cut bass by 6db
  master for streaming";

/// Result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line(s: impl Into<String>) -> Self {
        Reply::Lines(vec![s.into()])
    }
}

/// The interpreter behind the command surface
pub struct MixEngineer {
    config: Config,
    store: SessionStore,
    processor: Processor,
    exporter: Exporter,
    session: Option<Session>,
    cancel: CancelFlag,
}

impl MixEngineer {
    pub fn new(config: Config) -> Self {
        Self {
            store: SessionStore::new(&config.sessions_dir),
            processor: config.processor(),
            exporter: config.exporter(),
            session: None,
            cancel: CancelFlag::new(),
            config,
        }
    }

    /// Swap the processing engine
    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_exporter(mut self, exporter: Exporter) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Flag that aborts the running engine call when raised
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Parse and execute one line, formatting errors for display
    pub fn handle_line(&mut self, line: &str) -> Reply {
        match Command::parse(line).and_then(|command| self.execute(command)) {
            Ok(reply) => reply,
            Err(e) => Reply::Lines(format_error(&e)),
        }
    }

    /// Read commands until `quit` or end of input
    pub fn run(&mut self, mut input: impl BufRead, mut output: impl Write, interactive: bool) -> Result<()> {
        let mut raw = Vec::new();
        loop {
            if interactive {
                write!(output, "{}", self.prompt_marker())?;
                output.flush()?;
            }
            raw.clear();
            if input.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let reply = match std::str::from_utf8(&raw) {
                Ok(line) => self.handle_line(line.trim_end_matches(['\n', '\r'])),
                Err(e) => Reply::Lines(format_error(&MixError::MalformedCommand {
                    input: String::from_utf8_lossy(&raw).trim_end().to_string(),
                    reason: format!("not valid UTF-8 ({})", e),
                })),
            };
            match reply {
                Reply::Quit => break,
                Reply::Lines(lines) => {
                    for l in lines {
                        writeln!(output, "{}", l)?;
                    }
                }
            }
        }
        if let Some(session) = self.session.take() {
            info!("Closing session '{}'", session.name());
        }
        Ok(())
    }

    fn prompt_marker(&self) -> String {
        match &self.session {
            Some(s) if s.has_source() => format!("{} v{}> ", s.name(), s.cursor()),
            Some(s) => format!("{}> ", s.name()),
            None => "mix> ".to_string(),
        }
    }

    /// Execute a parsed command
    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        self.cancel.reset();
        match command {
            Command::Empty => Ok(Reply::Lines(Vec::new())),
            Command::Quit => Ok(Reply::Quit),
            Command::Help => Ok(Reply::Lines(HELP.lines().map(str::to_string).collect())),
            Command::Session(name) => self.open_session(&name),
            Command::Source { path, replace } => self.load_source(&path, replace),
            Command::Prompt(text) => self.apply_prompt(&text),
            Command::History => self.history(),
            Command::Undo => {
                let version = self.active_session()?.undo()?;
                Ok(Reply::line(format!("Back to version {}: {}", version.index, version.describe())))
            }
            Command::Checkout(index) => {
                let version = self.active_session()?.checkout(index)?;
                Ok(Reply::line(format!("Checked out version {}: {}", version.index, version.describe())))
            }
            Command::Export { target, bitrate_kbps } => self.export(&target, bitrate_kbps),
            Command::Status => self.status(),
            Command::Sessions => self.list_sessions(),
        }
    }

    fn active_session(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(MixError::NoActiveSession)
    }

    fn open_session(&mut self, name: &str) -> Result<Reply> {
        if self.session.as_ref().is_some_and(|s| s.name() == name) {
            return Ok(Reply::line(format!("Session '{}' is already active", name)));
        }
        let session = self.store.open(name)?;
        info!("Opened session '{}'", name);
        let reply = if session.has_source() {
            format!(
                "Resumed session '{}': {} version(s), current version {}",
                name,
                session.version_count(),
                session.cursor()
            )
        } else {
            format!("Started session '{}'. Load audio with: source <file.wav>", name)
        };
        self.session = Some(session);
        Ok(Reply::line(reply))
    }

    fn load_source(&mut self, path: &Path, replace: bool) -> Result<Reply> {
        let session = self.active_session()?;
        session.load_source(path, replace)?;
        info!("Loaded source {} into '{}'", path.display(), session.name());
        let lines = match session.source() {
            Some(src) => vec![
                format!("Loaded {} as version 0", path.display()),
                format!(
                    "  {} Hz, {} channel(s), {:.2}s",
                    src.sample_rate, src.channels, src.duration_secs
                ),
            ],
            None => vec![format!("Loaded {} as version 0", path.display())],
        };
        Ok(Reply::Lines(lines))
    }

    fn apply_prompt(&mut self, text: &str) -> Result<Reply> {
        if self.session.is_none() {
            return Err(MixError::NoActiveSession);
        }
        let interpretation = interpret(text)?;

        let mut lines = vec![format!("Understood: {}", interpretation.summary())];
        for conflict in &interpretation.conflicts {
            lines.push(format!(
                "  {}: '{}' replaces '{}'",
                conflict.slot, conflict.winner, conflict.overridden
            ));
        }
        if !interpretation.unrecognized.is_empty() {
            lines.push(format!("  Ignored: {}", interpretation.unrecognized.join(", ")));
        }

        let processor = &self.processor;
        let cancel = &self.cancel;
        let session = self.session.as_mut().ok_or(MixError::NoActiveSession)?;
        let version = session.apply_chain(&interpretation.chain, Some(text), processor, cancel)?;

        for op in version.chain.describe() {
            lines.push(format!("  - {}", op));
        }
        lines.push(format!(
            "Version {} created from version {}",
            version.index,
            version.parent.unwrap_or_default()
        ));
        Ok(Reply::Lines(lines))
    }

    fn history(&mut self) -> Result<Reply> {
        let session = self.active_session()?;
        session.current_version()?;
        let lines = session
            .history()
            .map(|v| {
                let marker = match (v.current, v.active) {
                    (true, _) => '*',
                    (false, true) => '+',
                    (false, false) => ' ',
                };
                let parent = v.parent.map_or_else(|| "-".to_string(), |p| p.to_string());
                let prompt = v.prompt.as_deref().unwrap_or("(source)");
                format!(
                    "{} v{:<3} <- {:<3} {}  \"{}\"  {}",
                    marker,
                    v.index,
                    parent,
                    v.timestamp.format("%H:%M:%S"),
                    prompt,
                    v.description
                )
            })
            .collect();
        Ok(Reply::Lines(lines))
    }

    fn export(&mut self, target: &str, bitrate_kbps: Option<u32>) -> Result<Reply> {
        let output = self.resolve_export_path(target)?;
        let bitrate = bitrate_kbps.unwrap_or(self.config.export_bitrate_kbps);

        let session = self.session.as_mut().ok_or(MixError::NoActiveSession)?;
        let version = session.current_version()?.index;
        let buffer = session.current_buffer()?;
        let record = self.exporter.export(&buffer, version, &output, Some(bitrate))?;
        info!("Exported version {} to {}", version, record.path.display());

        let detail = match record.bitrate_kbps {
            Some(kbps) => format!("{} {} kbps", record.format, kbps),
            None => record.format.to_string(),
        };
        Ok(Reply::line(format!(
            "Exported version {} to {} ({})",
            record.version,
            record.path.display(),
            detail
        )))
    }

    /// Add the default extension, and place bare names in the exports directory
    fn resolve_export_path(&self, target: &str) -> Result<PathBuf> {
        let mut path = PathBuf::from(target);
        if path.extension().is_none() {
            path.set_extension(DEFAULT_EXPORT_EXTENSION);
        }
        ExportFormat::from_path(&path)?;

        let bare = path.parent().map_or(true, |p| p.as_os_str().is_empty());
        if bare && !path.is_absolute() {
            fs::create_dir_all(&self.config.exports_dir).map_err(|source| MixError::WriteFailure {
                path: self.config.exports_dir.clone(),
                source,
            })?;
            path = self.config.exports_dir.join(path);
        }
        Ok(path)
    }

    fn status(&mut self) -> Result<Reply> {
        let engine = self.processor.engine_name().to_string();
        let session = self.active_session()?;
        let mut lines = vec![format!("Session: {}", session.name())];
        match session.source() {
            Some(src) => {
                lines.push(format!("Source: {}", src.path.display()));
                lines.push(format!(
                    "Versions: {} (current {})",
                    session.version_count(),
                    session.cursor()
                ));
                if let Ok(current) = session.current_version() {
                    lines.push(format!("Current: {}", current.describe()));
                }
            }
            None => lines.push("Source: (none)".to_string()),
        }
        lines.push(format!("Engine: {}", engine));
        Ok(Reply::Lines(lines))
    }

    fn list_sessions(&self) -> Result<Reply> {
        let sessions = self.store.list()?;
        if sessions.is_empty() {
            return Ok(Reply::line(format!(
                "No sessions in {}",
                self.store.root().display()
            )));
        }
        Ok(Reply::Lines(
            sessions
                .into_iter()
                .map(|s| {
                    let active = self.session.as_ref().is_some_and(|a| a.name() == s.name);
                    format!(
                        "{} {:<20} {} version(s), current {}",
                        if active { '*' } else { ' ' },
                        s.name,
                        s.versions,
                        s.cursor
                    )
                })
                .collect(),
        ))
    }
}

/// `[CODE] message` and, if there is one, an indented suggestion
pub fn format_error(error: &MixError) -> Vec<String> {
    let mut lines = vec![format!("[{}] {}", error.error_code(), error)];
    if let Some(suggestion) = error.recovery_suggestion() {
        lines.push(format!("  {}", suggestion));
    }
    lines
}
