//! Common utilities and types shared across FolderTrail modules.
//!
//! This module provides the error taxonomy and the domain types that flow
//! between the credential, metadata, cache and engine layers.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{AccessToken, DocumentId, FileSummary, FolderSummary, ResolutionResult};
