//! Error types for translation and rebasing.

use thiserror::Error;
use weft_core::CoreError;

/// Errors raised by a [`Replica`](crate::replica::Replica).
///
/// Steps that no longer apply are not errors; they are logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A mutation references a bunch whose metadata never arrived. Fatal:
    /// the transport delivered operations out of causal order.
    #[error("Missing dependency: bunch {0} is not registered")]
    MissingDependency(String),

    #[error("Core error: {0}")]
    Core(CoreError),

    #[error("Transaction was not started on the current editor state")]
    StaleTransaction,

    #[error("Cannot snapshot with {0} pending mutations")]
    PendingMutations(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownBunch(bunch_id) => SyncError::MissingDependency(bunch_id),
            other => SyncError::Core(other),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
