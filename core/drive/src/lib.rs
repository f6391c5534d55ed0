//! Google Drive access for FolderTrail.
//!
//! This module provides:
//! - An identity authority abstraction with an OAuth2 installed-app flow
//! - A credential provider that caches one bearer token in memory and in
//!   the durable store
//! - A metadata client that resolves a document's record and its parents

pub mod auth;
pub mod client;
pub mod credential;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use auth::{AuthConfig, IdentityAuthority, OAuthAuthority, DRIVE_METADATA_SCOPE};
pub use client::{DriveMetadataClient, DriveUser, MetadataSource, DRIVE_API_BASE};
pub use credential::{CredentialProvider, CredentialState, CREDENTIAL_KEY};
