//! Error types for the weft SDK.

use thiserror::Error;
use weft_doc::StepError;
use weft_sync::SyncError;

/// Error type for SDK operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// The edit closure produced a step that does not apply.
    #[error("Edit error: {0}")]
    Edit(#[from] StepError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Disconnected")]
    Disconnected,

    /// A peer sent a message that is not valid at this point of the exchange.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
