//! Identity authority and the OAuth2 installed-app flow for Google Drive.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    reqwest, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
    TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use foldertrail_common::{AccessToken, Error, Result};

/// OAuth2 authorization endpoint.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// OAuth2 token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Path the loopback listener answers on.
const CALLBACK_PATH: &str = "/callback";

/// Read-only access to file metadata.
pub const DRIVE_METADATA_SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";

const CALLBACK_PAGE: &str = "<html><body><h3>FolderTrail is signed in.</h3>\
<p>You can close this window.</p></body></html>";

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Source of access credentials.
///
/// An interactive request may block on the user for as long as the host
/// environment allows; there is no timeout.
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    /// Get the authority name (e.g., "google-oauth").
    fn name(&self) -> &str;

    /// Obtain a bearer token for `scopes`.
    ///
    /// # Errors
    /// - `AuthUnavailable` if the authority cannot be used at all
    /// - `AuthDenied` if the user declined, the flow failed, or no usable
    ///   token came back
    async fn request_token(&self, interactive: bool, scopes: &[&str]) -> Result<AccessToken>;
}

/// Configuration for OAuth2 authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth2 client ID. Empty means no client is configured.
    pub client_id: String,
    /// OAuth2 client secret (installed-app clients may omit it).
    pub client_secret: Option<String>,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Host the loopback redirect listener binds to.
    pub redirect_host: String,
    /// Port for the loopback listener; 0 picks an ephemeral port.
    pub redirect_port: u16,
    /// Whether to launch the system browser on the authorization URL.
    pub open_browser: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            redirect_host: "127.0.0.1".to_string(),
            redirect_port: 0,
            open_browser: true,
        }
    }
}

/// Identity authority backed by an OAuth2 authorization-code flow with PKCE
/// and a loopback redirect.
pub struct OAuthAuthority {
    config: AuthConfig,
}

impl OAuthAuthority {
    /// Create a new authority.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn client(&self, redirect_url: &str) -> Result<ConfiguredClient> {
        if self.config.client_id.is_empty() {
            return Err(Error::AuthUnavailable(
                "No OAuth client ID configured".to_string(),
            ));
        }

        let mut client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(self.config.auth_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(self.config.token_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url.to_string())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            );

        if let Some(secret) = &self.config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        Ok(client)
    }

    /// Build the URL the user must visit.
    ///
    /// Returns the URL, the CSRF state to expect on callback and the PKCE
    /// verifier for the code exchange.
    pub fn authorization_url(
        &self,
        redirect_url: &str,
        scopes: &[&str],
    ) -> Result<(Url, CsrfToken, PkceCodeVerifier)> {
        let client = self.client(redirect_url)?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().map(|s| Scope::new(s.to_string())))
            .set_pkce_challenge(challenge)
            .url();

        Ok((url, state, verifier))
    }

    async fn exchange_code(
        &self,
        redirect_url: &str,
        code: String,
        verifier: PkceCodeVerifier,
    ) -> Result<AccessToken> {
        let client = self.client(redirect_url)?;
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        let token_result = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request_async(&http)
            .await
            .map_err(|e| Error::AuthDenied(format!("Token exchange failed: {}", e)))?;

        AccessToken::new(token_result.access_token().secret().as_str())
            .ok_or_else(|| Error::AuthDenied("No access token received".to_string()))
    }
}

#[async_trait]
impl IdentityAuthority for OAuthAuthority {
    fn name(&self) -> &str {
        "google-oauth"
    }

    async fn request_token(&self, interactive: bool, scopes: &[&str]) -> Result<AccessToken> {
        if self.config.client_id.is_empty() {
            return Err(Error::AuthUnavailable(
                "No OAuth client ID configured".to_string(),
            ));
        }
        if !interactive {
            return Err(Error::AuthDenied("Interactive sign-in required".to_string()));
        }

        let listener = TcpListener::bind((
            self.config.redirect_host.as_str(),
            self.config.redirect_port,
        ))
        .await
        .map_err(|e| Error::AuthUnavailable(format!("Cannot listen for redirect: {}", e)))?;
        let port = listener.local_addr()?.port();
        let redirect_url = format!(
            "http://{}:{}{}",
            self.config.redirect_host, port, CALLBACK_PATH
        );

        let (auth_url, state, verifier) = self.authorization_url(&redirect_url, scopes)?;

        tracing::info!("Open this URL to sign in: {}", auth_url);
        if self.config.open_browser {
            if let Err(e) = open::that(auth_url.as_str()) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        let params = wait_for_callback(&listener).await?;
        let code = parse_callback(&params, state.secret())?;

        let token = self.exchange_code(&redirect_url, code, verifier).await?;
        tracing::debug!("OAuth code exchange succeeded");
        Ok(token)
    }
}

/// Accept connections until one hits the callback path, answer it, and
/// return its query parameters.
async fn wait_for_callback(listener: &TcpListener) -> Result<HashMap<String, String>> {
    loop {
        let (mut stream, _) = listener.accept().await?;

        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let target = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/");
        let url = Url::parse(&format!("http://localhost{}", target))
            .map_err(|e| Error::AuthDenied(format!("Malformed redirect: {}", e)))?;

        if url.path() != CALLBACK_PATH {
            let _ = stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            continue;
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            CALLBACK_PAGE.len(),
            CALLBACK_PAGE
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;

        return Ok(url.query_pairs().into_owned().collect());
    }
}

/// Validate redirect parameters and extract the authorization code.
fn parse_callback(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        return Err(Error::AuthDenied(format!("Sign-in was declined: {}", error)));
    }

    match params.get("state") {
        Some(state) if state == expected_state => {}
        _ => return Err(Error::AuthDenied("CSRF state mismatch".to_string())),
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| Error::AuthDenied("No authorization code in redirect".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    fn test_config() -> AuthConfig {
        AuthConfig {
            client_id: "test_id".to_string(),
            client_secret: Some("test_secret".to_string()),
            ..AuthConfig::default()
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_auth_config_serialization() {
        let config = test_config();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AuthConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.client_id, config.client_id);
        assert_eq!(deserialized.token_url, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn test_auth_config_partial_json_uses_defaults() {
        let config: AuthConfig = serde_json::from_str(r#"{"client_id": "abc"}"#).unwrap();
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.auth_url, GOOGLE_AUTH_URL);
        assert_eq!(config.redirect_port, 0);
        assert!(config.open_browser);
    }

    #[test]
    fn test_authorization_url_generation() {
        let authority = OAuthAuthority::new(test_config());
        let (url, state, _verifier) = authority
            .authorization_url("http://127.0.0.1:4567/callback", &[DRIVE_METADATA_SCOPE])
            .unwrap();
        let url = url.to_string();

        assert!(url.contains("accounts.google.com"));
        assert!(url.contains("client_id=test_id"));
        assert!(url.contains("drive.metadata.readonly"));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(!state.secret().is_empty());
    }

    #[tokio::test]
    async fn test_missing_client_id_is_unavailable() {
        let authority = OAuthAuthority::new(AuthConfig::default());
        let err = authority
            .request_token(true, &[DRIVE_METADATA_SCOPE])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthUnavailable(_)));
    }

    #[tokio::test]
    async fn test_non_interactive_request_is_denied() {
        let authority = OAuthAuthority::new(test_config());
        let err = authority
            .request_token(false, &[DRIVE_METADATA_SCOPE])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthDenied(_)));
    }

    #[test]
    fn test_parse_callback_accepts_matching_state() {
        let code = parse_callback(&params(&[("code", "4/abc"), ("state", "xyz")]), "xyz").unwrap();
        assert_eq!(code, "4/abc");
    }

    #[test]
    fn test_parse_callback_rejects_state_mismatch() {
        let err = parse_callback(&params(&[("code", "4/abc"), ("state", "evil")]), "xyz")
            .unwrap_err();
        assert!(matches!(err, Error::AuthDenied(_)));
    }

    #[test]
    fn test_parse_callback_reports_user_decline() {
        let err = parse_callback(
            &params(&[("error", "access_denied"), ("state", "xyz")]),
            "xyz",
        )
        .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert!(err.requires_authentication());
    }

    #[test]
    fn test_parse_callback_requires_code() {
        assert!(parse_callback(&params(&[("state", "xyz")]), "xyz").is_err());
        assert!(parse_callback(&params(&[("state", "xyz"), ("code", "")]), "xyz").is_err());
    }

    #[tokio::test]
    async fn test_wait_for_callback_skips_other_paths() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stray = TcpStream::connect(addr).await.unwrap();
            stray
                .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut sink = Vec::new();
            stray.read_to_end(&mut sink).await.unwrap();
            assert!(String::from_utf8_lossy(&sink).starts_with("HTTP/1.1 404"));

            let mut callback = TcpStream::connect(addr).await.unwrap();
            callback
                .write_all(b"GET /callback?code=4%2Fabc&state=s1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut page = Vec::new();
            callback.read_to_end(&mut page).await.unwrap();
            String::from_utf8_lossy(&page).to_string()
        });

        let received = wait_for_callback(&listener).await.unwrap();
        assert_eq!(received.get("code").map(String::as_str), Some("4/abc"));
        assert_eq!(received.get("state").map(String::as_str), Some("s1"));

        let page = client.await.unwrap();
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("signed in"));
    }
}
