//! Error types for the document model.

use thiserror::Error;

/// Reasons a step cannot be applied to a document.
///
/// These are recoverable: the document is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Position out of range: {pos} (content size: {size})")]
    OutOfRange { pos: usize, size: usize },

    #[error("Invalid gap: {gap_from}..{gap_to} does not fit inside {from}..{to}")]
    InvalidGap {
        from: usize,
        to: usize,
        gap_from: usize,
        gap_to: usize,
    },

    #[error("Structure replace would overwrite content")]
    StructureOverwrite,

    #[error("No node starts at position {0}")]
    NotANode(usize),

    #[error("Schema violation: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, StepError>;
