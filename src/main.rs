//! Mix Engineer CLI
//!
//! Interactive natural-language mixing sessions.

use std::fs::File;
use std::io::{self, BufReader, IsTerminal};

use anyhow::Context;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use mix_engineer::cli::{Cli, MixEngineer, Reply};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = cli.config().context("invalid configuration")?;
    info!(
        "Mix Engineer v{} (engine: {}, sessions: {})",
        env!("CARGO_PKG_VERSION"),
        config.engine,
        config.sessions_dir.display()
    );

    let mut app = MixEngineer::new(config);
    let stdout = io::stdout();

    if let Some(name) = &cli.session {
        if let Reply::Lines(lines) = app.handle_line(&format!("session {}", name)) {
            for line in lines {
                println!("{}", line);
            }
        }
    }

    match &cli.script {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("cannot open script {}", path.display()))?;
            app.run(BufReader::new(file), stdout.lock(), false)?;
        }
        None => {
            let stdin = io::stdin();
            let interactive = stdin.is_terminal();
            if interactive {
                println!("Mix Engineer v{}. Type 'help' for commands.", env!("CARGO_PKG_VERSION"));
            }
            app.run(stdin.lock(), stdout.lock(), interactive)?;
        }
    }

    Ok(())
}
