//! Access credential lifecycle.

use std::sync::Arc;
use tokio::sync::RwLock;

use foldertrail_common::{AccessToken, Result};
use foldertrail_storage::KeyValueStore;

use crate::auth::{IdentityAuthority, DRIVE_METADATA_SCOPE};

/// Durable store key holding the current credential.
pub const CREDENTIAL_KEY: &str = "accessToken";

/// In-memory lifecycle of the current credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing has been loaded or acquired yet.
    Absent,
    /// A credential is held; its validity is unknown until used.
    Cached(AccessToken),
    /// The credential was explicitly cleared.
    Invalidated,
}

impl CredentialState {
    /// Short label for status reporting.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialState::Absent => "absent",
            CredentialState::Cached(_) => "cached",
            CredentialState::Invalidated => "invalidated",
        }
    }
}

/// Produces the current access credential, acquiring one when needed.
///
/// No lock is held while talking to the store or the identity authority, so
/// a stalled interactive sign-in only blocks the caller that started it.
pub struct CredentialProvider {
    authority: Arc<dyn IdentityAuthority>,
    store: Arc<dyn KeyValueStore>,
    state: RwLock<CredentialState>,
}

impl CredentialProvider {
    /// Create a provider with no credential loaded.
    pub fn new(authority: Arc<dyn IdentityAuthority>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            authority,
            store,
            state: RwLock::new(CredentialState::Absent),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> CredentialState {
        self.state.read().await.clone()
    }

    /// Get a credential.
    ///
    /// Order of preference: the in-memory credential, then the durable copy
    /// (only while nothing was explicitly invalidated), then the identity
    /// authority.
    ///
    /// # Postconditions
    /// - A newly acquired credential is persisted before it is returned
    ///
    /// # Errors
    /// - `AuthUnavailable` / `AuthDenied` from the identity authority
    /// - Storage errors while persisting a newly acquired credential
    pub async fn acquire(&self, interactive: bool) -> Result<AccessToken> {
        let current = self.state.read().await.clone();

        match current {
            CredentialState::Cached(token) => return Ok(token),
            CredentialState::Absent => {
                if let Some(token) = self.load_stored().await {
                    tracing::debug!("Adopted stored credential");
                    self.adopt_in_memory(token.clone()).await;
                    return Ok(token);
                }
            }
            CredentialState::Invalidated => {}
        }

        self.obtain(interactive).await
    }

    /// Discard whatever is held and run an interactive sign-in.
    pub async fn reauthenticate(&self) -> Result<AccessToken> {
        self.obtain(true).await
    }

    /// Forget the current credential.
    ///
    /// The in-memory clear always succeeds; a failure to clear the durable
    /// copy is logged and otherwise ignored. Calling this repeatedly is a
    /// no-op after the first call.
    pub async fn invalidate(&self) {
        *self.state.write().await = CredentialState::Invalidated;

        if let Err(e) = self.store.remove(CREDENTIAL_KEY).await {
            tracing::warn!("Failed to clear stored credential: {}", e);
        }
        tracing::info!("Credential invalidated");
    }

    /// Whether the durable store currently holds a usable credential.
    pub async fn has_stored_credential(&self) -> bool {
        self.load_stored().await.is_some()
    }

    async fn obtain(&self, interactive: bool) -> Result<AccessToken> {
        tracing::debug!(
            authority = self.authority.name(),
            interactive,
            "Requesting credential"
        );
        let token = self
            .authority
            .request_token(interactive, &[DRIVE_METADATA_SCOPE])
            .await?;

        self.store.set(CREDENTIAL_KEY, token.to_stored()).await?;
        self.adopt_in_memory(token.clone()).await;

        tracing::info!("Acquired new credential from {}", self.authority.name());
        Ok(token)
    }

    async fn adopt_in_memory(&self, token: AccessToken) {
        *self.state.write().await = CredentialState::Cached(token);
    }

    async fn load_stored(&self) -> Option<AccessToken> {
        match self.store.get(CREDENTIAL_KEY).await {
            Ok(Some(value)) => AccessToken::from_stored(&value),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read stored credential: {}", e);
                None
            }
        }
    }
}
