//! Common error types for FolderTrail.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for FolderTrail operations.
///
/// The `Display` text of each variant is what the presentation layer shows.
/// Only the variants that call for a fresh sign-in mention "Authentication".
#[derive(Debug, Error)]
pub enum Error {
    /// The identity authority is not configured or cannot be reached.
    #[error("Identity provider unavailable: {0}")]
    AuthUnavailable(String),

    /// The user declined, or the sign-in flow produced no usable token.
    #[error("Authentication failed: {0}")]
    AuthDenied(String),

    /// The remote API rejected the bearer credential.
    #[error("Authentication expired. Please re-authenticate.")]
    Unauthorized,

    /// The requested document does not exist or is not visible.
    #[error("File not found or access denied. File ID: {file_id}\nAPI Response: {body}")]
    NotFound { file_id: String, body: String },

    /// The remote API refused the request.
    #[error(
        "Access forbidden. File ID: {file_id}\nPossible causes:\n- File is private\n- API quota exceeded\n- Insufficient permissions\nAPI Response: {body}"
    )]
    Forbidden { file_id: String, body: String },

    /// Any other non-2xx response.
    #[error("API request failed: {status}\nAPI Response: {body}")]
    RequestFailed { status: u16, body: String },

    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Durable store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Classify this error for callers that branch on it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized | Error::AuthDenied(_) => ErrorKind::AuthRequired,
            Error::AuthUnavailable(_) => ErrorKind::AuthUnavailable,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Forbidden { .. } => ErrorKind::Forbidden,
            Error::RequestFailed { .. } => ErrorKind::RequestFailed,
            Error::Network(_) => ErrorKind::Network,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Storage(_) | Error::Io(_) | Error::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller should prompt for a fresh interactive sign-in.
    pub fn requires_authentication(&self) -> bool {
        self.kind() == ErrorKind::AuthRequired
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Coarse error classification exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthRequired,
    AuthUnavailable,
    NotFound,
    Forbidden,
    RequestFailed,
    Network,
    InvalidInput,
    Internal,
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
