//! Error types for positions, outlines and formatting.

use thiserror::Error;

/// Errors raised by [`Order`](crate::order::Order), [`Outline`](crate::outline::Outline)
/// and [`Formatting`](crate::formatting::Formatting).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A position references a bunch whose metadata was never registered.
    ///
    /// This is a causality violation upstream and is never recovered.
    #[error("Unknown bunch: {0} (BunchMeta must be delivered before positions that use it)")]
    UnknownBunch(String),

    #[error("Conflicting metadata for bunch {0}")]
    ConflictingMeta(String),

    #[error("Invalid range: prev must be strictly less than next")]
    InvalidRange,

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("Count must be positive")]
    ZeroCount,

    #[error("Count {0} is too large for one bunch")]
    CountOverflow(usize),
}

pub type Result<T> = std::result::Result<T, CoreError>;
