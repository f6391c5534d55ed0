//! Google Drive metadata API client.

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use foldertrail_common::{
    AccessToken, DocumentId, Error, FileSummary, FolderSummary, ResolutionResult, Result,
};

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for the document being resolved.
const DOCUMENT_FIELDS: &str = "id,name,parents,webViewLink";
/// Fields requested for each parent folder.
const FOLDER_FIELDS: &str = "id,name,webViewLink";
/// Fields requested when probing API access.
const ABOUT_FIELDS: &str = "user(displayName,emailAddress)";

/// Record returned by `files.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    web_view_link: String,
}

/// Account the credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: String,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    user: DriveUser,
}

/// Remote source of document metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch a document and its immediate parent folders.
    ///
    /// Parents that cannot be fetched (non-2xx) are left out of the result;
    /// folder order follows the document's parent list.
    ///
    /// # Errors
    /// - `Unauthorized` on 401
    /// - `NotFound` on 404, `Forbidden` on 403
    /// - `RequestFailed` on any other non-2xx for the document itself
    /// - `Network` on transport or decoding failures
    async fn fetch_resolution(
        &self,
        id: &DocumentId,
        token: &AccessToken,
    ) -> Result<ResolutionResult>;

    /// Fetch the account behind `token`, to check that API access works.
    async fn fetch_user(&self, token: &AccessToken) -> Result<DriveUser>;
}

/// Google Drive metadata client.
///
/// Performs no retries; callers own the retry and re-authentication policy.
pub struct DriveMetadataClient {
    http: Client,
    base_url: String,
}

impl DriveMetadataClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("FolderTrail/0.1")
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client for the public Drive API.
    pub fn with_defaults() -> Result<Self> {
        Self::new(DRIVE_API_BASE)
    }

    async fn get(
        &self,
        path: &str,
        fields: &str,
        token: &AccessToken,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {} fields={}", url, fields);

        self.http
            .get(&url)
            .bearer_auth(token.secret())
            .query(&[("fields", fields)])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request to {} failed: {}", url, e)))
    }

    async fn fetch_document(&self, id: &DocumentId, token: &AccessToken) -> Result<DriveRecord> {
        let response = self
            .get(&format!("/files/{}", id), DOCUMENT_FIELDS, token)
            .await?;
        handle_response(response, id.as_str()).await
    }

    /// Fetch one parent folder; `Ok(None)` when the API refuses it.
    async fn fetch_folder(
        &self,
        parent_id: &str,
        token: &AccessToken,
    ) -> Result<Option<FolderSummary>> {
        let Ok(parent) = DocumentId::new(parent_id) else {
            tracing::warn!("Skipping parent with malformed ID {:?}", parent_id);
            return Ok(None);
        };

        let response = self
            .get(&format!("/files/{}", parent), FOLDER_FIELDS, token)
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Skipping parent {}: HTTP {}", parent, status.as_u16());
            return Ok(None);
        }

        let record: DriveRecord = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse folder {}: {}", parent, e)))?;

        Ok(Some(FolderSummary {
            id: record.id,
            name: record.name,
            url: record.web_view_link,
        }))
    }
}

#[async_trait]
impl MetadataSource for DriveMetadataClient {
    async fn fetch_resolution(
        &self,
        id: &DocumentId,
        token: &AccessToken,
    ) -> Result<ResolutionResult> {
        let record = self.fetch_document(id, token).await?;

        let folders = try_join_all(
            record
                .parents
                .iter()
                .map(|parent_id| self.fetch_folder(parent_id, token)),
        )
        .await?
        .into_iter()
        .flatten()
        .collect();

        Ok(ResolutionResult {
            file: FileSummary {
                id: record.id,
                name: record.name,
                url: record.web_view_link,
            },
            folders,
        })
    }

    async fn fetch_user(&self, token: &AccessToken) -> Result<DriveUser> {
        let response = self.get("/about", ABOUT_FIELDS, token).await?;
        let about: AboutResponse = handle_response(response, "about").await?;
        Ok(about.user)
    }
}

/// Decode a successful response or classify the failure.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    subject: &str,
) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!("API error {} for {}: {}", status.as_u16(), subject, body);
    Err(classify_status(status, subject, body))
}

/// Map a non-2xx status to the error taxonomy.
fn classify_status(status: StatusCode, subject: &str, body: String) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::NOT_FOUND => Error::NotFound {
            file_id: subject.to_string(),
            body,
        },
        StatusCode::FORBIDDEN => Error::Forbidden {
            file_id: subject.to_string(),
            body,
        },
        other => Error::RequestFailed {
            status: other.as_u16(),
            body,
        },
    }
}
