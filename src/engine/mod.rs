//! Audio Engine Module
//!
//! Core audio plumbing shared by every other component:
//! - Audio buffer type
//! - WAV file I/O
//! - Cooperative cancellation

pub mod buffer;
pub mod cancel;
pub mod io;

pub use buffer::{calculate_peak, calculate_rms, db_to_linear, linear_to_db, AudioBuffer, ChannelLayout};
pub use cancel::CancelFlag;
pub use io::{generate_stereo_test_tone, generate_test_tone, hash_file, import_audio, write_wav};
