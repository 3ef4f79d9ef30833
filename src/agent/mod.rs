//! Natural-language front end
//!
//! - Vocabulary of mixing concepts and their default operations
//! - Prompt tokenization (phrases, modifiers, explicit values)
//! - Interpretation of a prompt into a canonical operation chain

pub mod intent;
mod interpreter;
pub mod vocabulary;

pub use interpreter::{interpret, Conflict, Interpretation, MatchedTerm};
pub use vocabulary::{resolve, Concept, Modifier, Slot};
