//! Upstream authentication.
//!
//! Services are reached either with a static key (`api-key` header) or with a
//! bearer token obtained through the OAuth2 client-credentials flow. Tokens are
//! cached per scope and refreshed shortly before they expire.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroize;

/// Scope for the realtime and embeddings endpoints
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
/// Scope for the search service
pub const SEARCH_SCOPE: &str = "https://search.azure.com/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tokens closer than this to expiry are refreshed
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token endpoint returned status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A resolved authentication header
#[derive(Clone, PartialEq, Eq)]
pub enum AuthHeader {
    ApiKey(String),
    Bearer(String),
}

impl AuthHeader {
    pub fn name(&self) -> &'static str {
        match self {
            AuthHeader::ApiKey(_) => "api-key",
            AuthHeader::Bearer(_) => "Authorization",
        }
    }

    pub fn value(&self) -> String {
        match self {
            AuthHeader::ApiKey(key) => key.clone(),
            AuthHeader::Bearer(token) => format!("Bearer {token}"),
        }
    }

    /// Attach the header to an outgoing HTTP request
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(self.name(), self.value())
    }
}

impl std::fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthHeader::ApiKey(_) => f.write_str("AuthHeader::ApiKey(***)"),
            AuthHeader::Bearer(_) => f.write_str("AuthHeader::Bearer(***)"),
        }
    }
}

impl Drop for AuthHeader {
    fn drop(&mut self) {
        match self {
            AuthHeader::ApiKey(secret) | AuthHeader::Bearer(secret) => secret.zeroize(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client-credentials token source with a per-scope cache
pub struct TokenProvider {
    http: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: Cache<String, CachedToken>,
}

impl TokenProvider {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant_id,
            client_id,
            client_secret,
            cache: Cache::builder().max_capacity(16).build(),
        }
    }

    /// Override the identity authority (sovereign clouds, local mocks)
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    /// Return a cached token for `scope`, fetching a new one when missing or about to expire
    pub async fn token(&self, scope: &str) -> Result<String, CredentialError> {
        if let Some(cached) = self.cache.get(scope).await {
            if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(cached.token);
            }
        }

        let fresh = self.fetch(scope).await?;
        self.cache.insert(scope.to_string(), fresh.clone()).await;
        Ok(fresh.token)
    }

    async fn fetch(&self, scope: &str) -> Result<CachedToken, CredentialError> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        tracing::debug!(scope, "Requesting access token");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

impl Drop for TokenProvider {
    fn drop(&mut self) {
        self.client_secret.zeroize();
    }
}

/// How a service is authenticated
#[derive(Clone)]
pub enum Credential {
    /// Static key sent as `api-key`
    Key(String),
    /// Bearer token for the given scope
    Token {
        provider: Arc<TokenProvider>,
        scope: &'static str,
    },
    /// No authentication header (local emulators and tests)
    Anonymous,
}

impl Credential {
    /// Pick a key when present, otherwise a token provider, otherwise anonymous
    pub fn resolve(
        key: Option<&str>,
        provider: Option<&Arc<TokenProvider>>,
        scope: &'static str,
    ) -> Self {
        match (key, provider) {
            (Some(key), _) => Credential::Key(key.to_string()),
            (None, Some(provider)) => Credential::Token {
                provider: provider.clone(),
                scope,
            },
            (None, None) => Credential::Anonymous,
        }
    }

    /// Resolve the header for one request or connection
    pub async fn auth_header(&self) -> Result<Option<AuthHeader>, CredentialError> {
        match self {
            Credential::Key(key) => Ok(Some(AuthHeader::ApiKey(key.clone()))),
            Credential::Token { provider, scope } => {
                Ok(Some(AuthHeader::Bearer(provider.token(scope).await?)))
            }
            Credential::Anonymous => Ok(None),
        }
    }

    /// Attach authentication to an HTTP request
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CredentialError> {
        Ok(match self.auth_header().await? {
            Some(header) => header.apply(request),
            None => request,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Key(_) => "api-key",
            Credential::Token { .. } => "bearer-token",
            Credential::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&self.kind()).finish()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        if let Credential::Key(key) = self {
            key.zeroize();
        }
    }
}
