//! Common types used throughout FolderTrail.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifier of a remote document.
///
/// Identifiers are opaque, but restricted to the alphabet the remote API
/// issues (`[A-Za-z0-9_-]`) so they are always safe inside a URL path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new DocumentId from a string.
    ///
    /// # Preconditions
    /// - `id` must be non-empty
    /// - `id` must only contain ASCII letters, digits, `-` or `_`
    ///
    /// # Errors
    /// - Returns `InvalidInput` if either precondition is violated
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Document ID cannot be empty".to_string(),
            ));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(crate::Error::InvalidInput(format!(
                "Document ID contains invalid character {:?}",
                c
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Bearer token authorizing metadata API calls.
///
/// Validity is unknown until the token is used. The secret is zeroized on
/// drop and never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token. Returns `None` for an empty string.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Decode a persisted token.
    ///
    /// Accepts a bare string or an object with a `token` field. Anything
    /// else is treated as no token.
    pub fn from_stored(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::new(s.as_str()),
            serde_json::Value::Object(map) => map
                .get("token")
                .and_then(|t| t.as_str())
                .and_then(Self::new),
            _ => None,
        }
    }

    /// Encode for the durable store.
    pub fn to_stored(&self) -> serde_json::Value {
        serde_json::Value::String(self.0.clone())
    }

    /// Get the raw secret.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED; {} chars])", self.0.len())
    }
}

/// Public metadata of the resolved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Public metadata of one parent folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// A document together with its immediate parent folders.
///
/// `folders` keeps the order in which the document record lists its parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub file: FileSummary,
    pub folders: Vec<FolderSummary>,
}
