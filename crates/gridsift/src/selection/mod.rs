//! Asking vision models which cells of a grid to keep, and combining their
//! answers.

pub mod consensus;
pub mod parser;
pub mod prompt;

pub use consensus::{ConsensusResult, ConsensusSelector, ModelSelection};
pub use parser::{extract_coordinates, validate_coordinates};
pub use prompt::{build_selection_prompt, CriteriaPreset, SelectionPrompt};
