//! Resolution engine: cache, credential and metadata orchestration.

use std::sync::Arc;
use tracing::instrument;

use foldertrail_common::{DocumentId, Error, ResolutionResult, Result};
use foldertrail_drive::{
    CredentialProvider, DriveMetadataClient, DriveUser, MetadataSource, OAuthAuthority,
};
use foldertrail_storage::{FileStore, KeyValueStore};

use crate::cache::ResultCache;
use crate::config::ResolverConfig;

/// Resolves documents to their parent folders.
///
/// Each `resolve` call issues at most one metadata fetch. A rejected
/// credential is invalidated and reported as `Error::Unauthorized`; the
/// engine never signs in again or retries on its own.
pub struct ResolutionEngine {
    credentials: Arc<CredentialProvider>,
    metadata: Arc<dyn MetadataSource>,
    cache: ResultCache,
    interactive_auth: bool,
}

impl ResolutionEngine {
    /// Create an engine over the given collaborators.
    ///
    /// The cache shares `store` with the credential provider, under its own
    /// key prefix.
    pub fn new(
        credentials: Arc<CredentialProvider>,
        metadata: Arc<dyn MetadataSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            credentials,
            metadata,
            cache: ResultCache::new(store),
            interactive_auth: true,
        }
    }

    /// Build the production engine: file-backed store, OAuth authority and
    /// the Drive metadata client.
    ///
    /// # Errors
    /// - Store location unavailable
    /// - HTTP client construction failure
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        let store_path = config.store_path()?;
        tracing::debug!("Using store {}", store_path.display());

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&store_path)?);
        let authority = Arc::new(OAuthAuthority::new(config.auth.clone()));
        let credentials = Arc::new(CredentialProvider::new(authority, store.clone()));
        let metadata = Arc::new(DriveMetadataClient::new(config.api_base_url.clone())?);

        Ok(Self::new(credentials, metadata, store).with_interactive_auth(config.interactive_auth))
    }

    /// Whether a missing credential may trigger an interactive sign-in.
    pub fn with_interactive_auth(mut self, interactive: bool) -> Self {
        self.interactive_auth = interactive;
        self
    }

    pub fn credentials(&self) -> &CredentialProvider {
        &self.credentials
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Resolve `id` to its metadata and parent folders.
    ///
    /// # Postconditions
    /// - On success the result is cached, also when `force_refresh` is set
    /// - On `Unauthorized` the credential is invalidated
    ///
    /// # Errors
    /// - Credential acquisition failures
    /// - Metadata API failures, returned as classified by the client
    #[instrument(skip(self), fields(document = %id))]
    pub async fn resolve(&self, id: &DocumentId, force_refresh: bool) -> Result<ResolutionResult> {
        if !force_refresh {
            match self.cache.get(id).await {
                Ok(Some(result)) => {
                    tracing::debug!("Cache hit");
                    return Ok(result);
                }
                Ok(None) => tracing::debug!("Cache miss"),
                Err(e) => tracing::warn!("Cache read failed, fetching instead: {}", e),
            }
        }

        let token = self.credentials.acquire(self.interactive_auth).await?;

        let result = match self.metadata.fetch_resolution(id, &token).await {
            Ok(result) => result,
            Err(e) => return Err(self.handle_api_error(e).await),
        };

        if let Err(e) = self.cache.put(id, &result).await {
            tracing::warn!("Failed to cache resolution: {}", e);
        }
        tracing::debug!(folders = result.folders.len(), "Resolved");
        Ok(result)
    }

    /// Check that the current credential can reach the metadata API.
    ///
    /// A rejected credential is invalidated exactly as in `resolve`.
    #[instrument(skip(self))]
    pub async fn check_access(&self) -> Result<DriveUser> {
        let token = self.credentials.acquire(self.interactive_auth).await?;

        match self.metadata.fetch_user(&token).await {
            Ok(user) => Ok(user),
            Err(e) => Err(self.handle_api_error(e).await),
        }
    }

    async fn handle_api_error(&self, err: Error) -> Error {
        if matches!(err, Error::Unauthorized) {
            tracing::info!("Credential rejected by the API; sign-in required");
            self.credentials.invalidate().await;
        }
        err
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use foldertrail_common::{AccessToken, FileSummary, FolderSummary};
    use foldertrail_drive::test_support::{MockDrive, ScriptedAuthority};
    use foldertrail_drive::{CredentialState, CREDENTIAL_KEY};
    use foldertrail_storage::MemoryStore;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Metadata source answering from per-document scripts and counting calls.
    pub(crate) struct FakeMetadata {
        scripts: Mutex<HashMap<String, VecDeque<Result<ResolutionResult>>>>,
        user: Mutex<VecDeque<Result<DriveUser>>>,
        fetches: AtomicUsize,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl FakeMetadata {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(HashMap::new()),
                user: Mutex::new(VecDeque::new()),
                fetches: AtomicUsize::new(0),
                tokens_seen: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn script(&self, id: &str, outcome: Result<ResolutionResult>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_default()
                .push_back(outcome);
        }

        pub(crate) fn script_user(&self, outcome: Result<DriveUser>) {
            self.user.lock().unwrap().push_back(outcome);
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub(crate) fn tokens_seen(&self) -> Vec<String> {
            self.tokens_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetadataSource for FakeMetadata {
        async fn fetch_resolution(
            &self,
            id: &DocumentId,
            token: &AccessToken,
        ) -> Result<ResolutionResult> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.tokens_seen
                .lock()
                .unwrap()
                .push(token.secret().to_string());
            self.scripts
                .lock()
                .unwrap()
                .get_mut(id.as_str())
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| {
                    Err(Error::NotFound {
                        file_id: id.to_string(),
                        body: String::new(),
                    })
                })
        }

        async fn fetch_user(&self, token: &AccessToken) -> Result<DriveUser> {
            self.tokens_seen
                .lock()
                .unwrap()
                .push(token.secret().to_string());
            self.user
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Network("no user scripted".to_string())))
        }
    }

    pub(crate) fn doc(id: &str) -> DocumentId {
        DocumentId::new(id).unwrap()
    }

    pub(crate) fn sample(id: &str, name: &str) -> ResolutionResult {
        ResolutionResult {
            file: FileSummary {
                id: id.to_string(),
                name: name.to_string(),
                url: format!("https://x/{}", id),
            },
            folders: vec![FolderSummary {
                id: "fA".to_string(),
                name: "Reports".to_string(),
                url: "https://x/fA".to_string(),
            }],
        }
    }

    pub(crate) struct Harness {
        pub(crate) engine: Arc<ResolutionEngine>,
        pub(crate) store: MemoryStore,
        pub(crate) authority: Arc<ScriptedAuthority>,
        pub(crate) metadata: Arc<FakeMetadata>,
    }

    /// Engine over an in-memory store, granting `tokens` in order.
    pub(crate) fn harness(tokens: &[&str]) -> Harness {
        let store = MemoryStore::new();
        let authority = ScriptedAuthority::granting(tokens);
        let metadata = FakeMetadata::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        let credentials = Arc::new(CredentialProvider::new(authority.clone(), shared.clone()));
        let engine = Arc::new(ResolutionEngine::new(credentials, metadata.clone(), shared));

        Harness {
            engine,
            store,
            authority,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_second_resolve_within_ttl_is_cache_hit() {
        let h = harness(&["tok"]);
        h.metadata.script("doc1", Ok(sample("doc1", "Plan")));

        let first = h.engine.resolve(&doc("doc1"), false).await.unwrap();
        let second = h.engine.resolve(&doc("doc1"), false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.metadata.fetches(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_fetches_and_overwrites() {
        let h = harness(&["tok"]);
        h.metadata.script("doc1", Ok(sample("doc1", "Old")));
        h.metadata.script("doc1", Ok(sample("doc1", "New")));

        h.engine.resolve(&doc("doc1"), false).await.unwrap();
        let refreshed = h.engine.resolve(&doc("doc1"), true).await.unwrap();

        assert_eq!(refreshed.file.name, "New");
        assert_eq!(h.metadata.fetches(), 2);

        let cached = h.engine.resolve(&doc("doc1"), false).await.unwrap();
        assert_eq!(cached.file.name, "New");
        assert_eq!(h.metadata.fetches(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_invalidates_credential() {
        let h = harness(&["stale"]);
        h.metadata.script("doc1", Err(Error::Unauthorized));

        let err = h.engine.resolve(&doc("doc1"), false).await.unwrap_err();

        assert!(err.requires_authentication());
        assert!(err.to_string().contains("Authentication"));
        assert_eq!(
            h.engine.credentials().state().await,
            CredentialState::Invalidated
        );
        assert_eq!(h.store.get(CREDENTIAL_KEY).await.unwrap(), None);
        // Exactly one fetch, no silent retry, no extra sign-in.
        assert_eq!(h.metadata.fetches(), 1);
        assert_eq!(h.authority.calls(), 1);
    }

    #[tokio::test]
    async fn test_reissued_resolve_after_unauthorized_uses_new_credential() {
        let h = harness(&["stale", "fresh"]);
        h.metadata.script("doc1", Err(Error::Unauthorized));
        h.metadata.script("doc1", Ok(sample("doc1", "Plan")));

        assert!(h.engine.resolve(&doc("doc1"), false).await.is_err());
        h.engine.resolve(&doc("doc1"), false).await.unwrap();

        assert_eq!(h.metadata.tokens_seen(), vec!["stale", "fresh"]);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_cached() {
        let h = harness(&["tok"]);
        h.metadata.script(
            "doc1",
            Err(Error::Forbidden {
                file_id: "doc1".to_string(),
                body: String::new(),
            }),
        );
        h.metadata.script("doc1", Ok(sample("doc1", "Plan")));

        let err = h.engine.resolve(&doc("doc1"), false).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        assert_eq!(h.engine.cache().len().await.unwrap(), 0);
        // The credential survives non-auth failures.
        assert!(matches!(
            h.engine.credentials().state().await,
            CredentialState::Cached(_)
        ));

        h.engine.resolve(&doc("doc1"), false).await.unwrap();
        assert_eq!(h.metadata.fetches(), 2);
    }

    #[tokio::test]
    async fn test_credential_failure_skips_fetch() {
        let h = harness(&[]);

        let err = h.engine.resolve(&doc("doc1"), false).await.unwrap_err();
        assert!(matches!(err, Error::AuthUnavailable(_)));
        assert_eq!(h.metadata.fetches(), 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_result() {
        let h = harness(&[]);
        h.store.set(CREDENTIAL_KEY, json!("stored")).await.unwrap();
        h.store.set_fail_writes(true);
        h.metadata.script("doc1", Ok(sample("doc1", "Plan")));

        let result = h.engine.resolve(&doc("doc1"), false).await.unwrap();
        assert_eq!(result.file.name, "Plan");
    }

    #[tokio::test]
    async fn test_check_access_invalidates_on_unauthorized() {
        let h = harness(&["tok"]);
        h.metadata.script_user(Err(Error::Unauthorized));

        let err = h.engine.check_access().await.unwrap_err();
        assert!(err.requires_authentication());
        assert_eq!(
            h.engine.credentials().state().await,
            CredentialState::Invalidated
        );
    }

    #[tokio::test]
    async fn test_end_to_end_with_drive_client() {
        let server = MockDrive::start(&[
            (
                "/files/doc123",
                200,
                r#"{"id":"doc123","name":"Q3 Plan","parents":["fA","fB"],"webViewLink":"https://x/doc123"}"#,
            ),
            (
                "/files/fA",
                200,
                r#"{"id":"fA","name":"Reports","webViewLink":"https://x/fA"}"#,
            ),
            ("/files/fB", 403, r#"{"error":"forbidden"}"#),
        ])
        .await;

        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let credentials = Arc::new(CredentialProvider::new(
            ScriptedAuthority::granting(&["tok"]),
            store.clone(),
        ));
        let client = Arc::new(DriveMetadataClient::new(server.base_url()).unwrap());
        let engine = ResolutionEngine::new(credentials, client, store);

        let result = engine.resolve(&doc("doc123"), false).await.unwrap();
        assert_eq!(result.file.id, "doc123");
        assert_eq!(
            result.folders,
            vec![FolderSummary {
                id: "fA".to_string(),
                name: "Reports".to_string(),
                url: "https://x/fA".to_string(),
            }]
        );

        engine.resolve(&doc("doc123"), false).await.unwrap();
        assert_eq!(server.hits("/files/doc123"), 1);
    }
}
