//! Transport-independent request dispatch.
//!
//! Requests arrive as JSON objects tagged by `type`; each variant has exactly
//! one handler. Responses use the `{success, data?, error?, errorKind?}`
//! envelope. `error` mentions "Authentication" exactly when `errorKind` is
//! `auth_required`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use foldertrail_common::{DocumentId, Error, ErrorKind, Result};

use crate::engine::ResolutionEngine;

/// Every request type understood by the dispatcher.
const REQUEST_TYPES: &[&str] = &[
    "FILE_DETECTED",
    "GET_FOLDER_INFO",
    "AUTHENTICATE",
    "SIGN_OUT",
    "CLEAR_CACHE",
    "CHECK_STORAGE_STATUS",
    "TEST_DRIVE_ACCESS",
];

/// Incoming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    /// A document was detected; warm the cache for it.
    FileDetected { file_id: DocumentId },
    /// Resolve a document's parent folders.
    GetFolderInfo {
        file_id: DocumentId,
        #[serde(default)]
        force_refresh: bool,
    },
    /// Run an interactive sign-in.
    Authenticate,
    /// Forget the current credential.
    SignOut,
    /// Drop all cached results.
    ClearCache,
    /// Report credential and cache status.
    CheckStorageStatus,
    /// Verify the credential against the metadata API.
    TestDriveAccess,
}

/// Outgoing response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Response {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }

    fn unknown_type() -> Self {
        Self {
            success: false,
            data: None,
            error: Some("Unknown message type".to_string()),
            error_kind: Some(ErrorKind::InvalidInput),
        }
    }
}

/// Routes requests to the resolution engine.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<ResolutionEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<ResolutionEngine>) -> Self {
        Self { engine }
    }

    /// Handle a raw JSON request.
    ///
    /// Malformed JSON or fields yield an `invalid_input` failure; an
    /// unrecognized `type` yields "Unknown message type".
    pub async fn handle_json(&self, raw: &str) -> Response {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                return Response::failure(&Error::InvalidInput(format!(
                    "Malformed request: {}",
                    e
                )))
            }
        };

        let known = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| REQUEST_TYPES.contains(&t));
        if !known {
            return Response::unknown_type();
        }

        match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::failure(&Error::InvalidInput(e.to_string())),
        }
    }

    /// Handle a typed request.
    pub async fn handle(&self, request: Request) -> Response {
        let outcome = match request {
            Request::FileDetected { file_id } => self.file_detected(&file_id).await,
            Request::GetFolderInfo {
                file_id,
                force_refresh,
            } => self.get_folder_info(&file_id, force_refresh).await,
            Request::Authenticate => self.authenticate().await,
            Request::SignOut => self.sign_out().await,
            Request::ClearCache => self.clear_cache().await,
            Request::CheckStorageStatus => self.check_storage_status().await,
            Request::TestDriveAccess => self.test_drive_access().await,
        };

        match outcome {
            Ok(data) => Response::ok(data),
            Err(e) => {
                tracing::debug!("Request failed: {}", e);
                Response::failure(&e)
            }
        }
    }

    async fn file_detected(&self, id: &DocumentId) -> Result<Option<Value>> {
        if let Err(e) = self.engine.resolve(id, false).await {
            tracing::warn!("Failed to cache file info for {}: {}", id, e);
        }
        Ok(None)
    }

    async fn get_folder_info(&self, id: &DocumentId, force_refresh: bool) -> Result<Option<Value>> {
        let result = self.engine.resolve(id, force_refresh).await?;
        Ok(Some(serde_json::to_value(result)?))
    }

    async fn authenticate(&self) -> Result<Option<Value>> {
        self.engine.credentials().reauthenticate().await?;
        Ok(Some(json!({ "authenticated": true })))
    }

    async fn sign_out(&self) -> Result<Option<Value>> {
        self.engine.credentials().invalidate().await;
        Ok(None)
    }

    async fn clear_cache(&self) -> Result<Option<Value>> {
        let cleared = self.engine.cache().invalidate_all().await?;
        Ok(Some(json!({ "cleared": cleared })))
    }

    async fn check_storage_status(&self) -> Result<Option<Value>> {
        let state = self.engine.credentials().state().await;
        let stored = self.engine.credentials().has_stored_credential().await;
        let entries = self.engine.cache().len().await?;

        Ok(Some(json!({
            "credential": state.label(),
            "credentialStored": stored,
            "cachedEntries": entries,
        })))
    }

    async fn test_drive_access(&self) -> Result<Option<Value>> {
        let user = self.engine.check_access().await?;
        Ok(Some(json!({ "user": user })))
    }
}
