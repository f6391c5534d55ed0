//! Resolver configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use foldertrail_common::{Error, Result};
use foldertrail_drive::{AuthConfig, DRIVE_API_BASE};

/// Environment variable overriding the OAuth client ID.
pub const ENV_CLIENT_ID: &str = "FOLDERTRAIL_CLIENT_ID";
/// Environment variable overriding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "FOLDERTRAIL_CLIENT_SECRET";

/// Configuration for building a resolution engine.
///
/// Every field has a default, so a partial JSON file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Base URL of the metadata API.
    pub api_base_url: String,
    /// Durable store file. `None` uses the platform data directory.
    pub store_path: Option<PathBuf>,
    /// Whether a missing credential may trigger an interactive sign-in.
    pub interactive_auth: bool,
    /// OAuth2 settings for the identity authority.
    pub auth: AuthConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_base_url: DRIVE_API_BASE.to_string(),
            store_path: None,
            interactive_auth: true,
            auth: AuthConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Default location of the config file.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("foldertrail").join("config.json"))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default config file is
    /// read if present and defaults are used otherwise.
    ///
    /// # Errors
    /// - Explicit file missing or unreadable
    /// - Malformed JSON
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => match Self::default_config_path() {
                Some(default) if default.exists() => default,
                _ => return Ok(Self::default()),
            },
        };

        tracing::debug!("Loading configuration from {}", path.display());
        let data = std::fs::read(&path)?;
        serde_json::from_slice(&data).map_err(|e| {
            Error::InvalidInput(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    /// Apply `FOLDERTRAIL_CLIENT_ID` / `FOLDERTRAIL_CLIENT_SECRET`.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.auth.client_id = id;
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.auth.client_secret = Some(secret);
        }
    }

    /// Resolved durable store location.
    ///
    /// # Errors
    /// - No store path configured and no platform data directory
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("foldertrail").join("store.json"))
            .ok_or_else(|| {
                Error::InvalidInput(
                    "No data directory available; set store_path explicitly".to_string(),
                )
            })
    }
}
