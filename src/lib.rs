//! Mix Engineer - natural-language mixing with versioned session history
//!
//! Free-text instructions ("make it brighter", "master for streaming") are
//! interpreted into deterministic operation chains, applied to the session's
//! current audio through a processing engine, and recorded as versions that
//! can be undone, checked out and exported.
//!
//! # Architecture
//!
//! - `agent`: vocabulary and prompt interpreter (text to operation chain)
//! - `dsp`: operation model, parameter contract and the built-in effects
//! - `processing`: engines that apply a chain to a buffer
//! - `session`: version log, cursor, on-disk store and locking
//! - `export`: format selection and atomic file output
//! - `cli`: the interactive command loop

pub mod agent;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod export;
pub mod processing;
pub mod session;

pub use agent::{interpret, Interpretation};
pub use config::Config;
pub use error::{MixError, Result};
pub use session::{Session, SessionStore};
