//! OIDC Discovery
//!
//! OpenID Connect Discovery: resolves a provider's endpoints from its issuer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::transport::{HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OidcError, ProtocolError};
use crate::types::{OIDCDiscoveryDocument, ProviderConfig};

/// Default lifetime of a cached discovery document.
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(3600);

struct DiscoveryCacheEntry {
    document: OIDCDiscoveryDocument,
    expires_at: Instant,
}

/// Discovery client interface (for dependency injection).
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Fetch discovery document for issuer.
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OidcError>;

    /// Get provider config from discovery.
    async fn get_provider_config(&self, issuer: &str) -> Result<ProviderConfig, OidcError> {
        let document = self.fetch(issuer).await?;
        Ok(document.to_provider_config()?)
    }

    /// Clear cache for issuer, or all issuers.
    fn clear_cache(&self, issuer: Option<&str>);
}

/// Default discovery client implementation.
pub struct DefaultDiscoveryClient<T: HttpTransport> {
    transport: T,
    cache: Mutex<HashMap<String, DiscoveryCacheEntry>>,
    cache_ttl: Duration,
    request_timeout: Duration,
}

impl<T: HttpTransport> DefaultDiscoveryClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_cache_ttl(transport, DEFAULT_DISCOVERY_TTL)
    }

    pub fn with_cache_ttl(transport: T, cache_ttl: Duration) -> Self {
        Self {
            transport,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
            request_timeout: crate::types::DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn normalize_issuer(issuer: &str) -> String {
        issuer.trim_end_matches('/').to_string()
    }

    fn get_from_cache(&self, issuer: &str) -> Option<OIDCDiscoveryDocument> {
        let key = Self::normalize_issuer(issuer);
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.get(&key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.document.clone());
            }
            cache.remove(&key);
        }

        None
    }

    fn set_cache(&self, issuer: &str, document: OIDCDiscoveryDocument) {
        self.cache.lock().insert(
            Self::normalize_issuer(issuer),
            DiscoveryCacheEntry {
                document,
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
    }
}

fn discovery_failed(message: impl Into<String>) -> OidcError {
    OidcError::Configuration(ConfigurationError::DiscoveryFailed {
        message: message.into(),
    })
}

#[async_trait]
impl<T: HttpTransport> DiscoveryClient for DefaultDiscoveryClient<T> {
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OidcError> {
        if let Some(cached) = self.get_from_cache(issuer) {
            return Ok(cached);
        }

        let normalized_issuer = Self::normalize_issuer(issuer);
        let discovery_url = format!("{}/.well-known/openid-configuration", normalized_issuer);
        debug!(url = %discovery_url, "Fetching discovery document");

        let request = HttpRequest::get(discovery_url)
            .header("accept", "application/json")
            .timeout(self.request_timeout);

        let response = self.transport.send(request).await?;

        if response.status != 200 {
            return Err(discovery_failed(format!(
                "Discovery request failed with status {}",
                response.status
            )));
        }

        let document: OIDCDiscoveryDocument = serde_json::from_str(&response.body)
            .map_err(|e| ProtocolError::malformed(e.to_string()))?;

        if document.authorization_endpoint.is_empty() || document.token_endpoint.is_empty() {
            return Err(discovery_failed("Discovery document missing required endpoints"));
        }

        let response_issuer = Self::normalize_issuer(&document.issuer);
        if response_issuer != normalized_issuer {
            return Err(discovery_failed(format!(
                "Issuer mismatch: expected {}, got {}",
                normalized_issuer, response_issuer
            )));
        }

        self.set_cache(issuer, document.clone());

        Ok(document)
    }

    fn clear_cache(&self, issuer: Option<&str>) {
        let mut cache = self.cache.lock();
        match issuer {
            Some(i) => {
                cache.remove(&Self::normalize_issuer(i));
            }
            None => cache.clear(),
        }
    }
}

/// Mock discovery client for testing.
#[derive(Default)]
pub struct MockDiscoveryClient {
    documents: Mutex<HashMap<String, OIDCDiscoveryDocument>>,
    fetch_history: Mutex<Vec<String>>,
}

impl MockDiscoveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set discovery document for issuer.
    pub fn set_document(&self, issuer: &str, document: OIDCDiscoveryDocument) -> &Self {
        self.documents.lock().insert(issuer.to_string(), document);
        self
    }

    /// Get fetch history.
    pub fn get_fetch_history(&self) -> Vec<String> {
        self.fetch_history.lock().clone()
    }
}

#[async_trait]
impl DiscoveryClient for MockDiscoveryClient {
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OidcError> {
        self.fetch_history.lock().push(issuer.to_string());

        self.documents
            .lock()
            .get(issuer)
            .cloned()
            .ok_or_else(|| discovery_failed(format!("No mock document for issuer: {}", issuer)))
    }

    fn clear_cache(&self, _issuer: Option<&str>) {}
}

/// Create mock discovery document for testing.
pub fn create_mock_discovery_document(issuer: &str) -> OIDCDiscoveryDocument {
    OIDCDiscoveryDocument {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{}/authorize", issuer),
        token_endpoint: format!("{}/token", issuer),
        userinfo_endpoint: Some(format!("{}/userinfo", issuer)),
        jwks_uri: Some(format!("{}/.well-known/jwks.json", issuer)),
        scopes_supported: vec![
            "openid".to_string(),
            "profile".to_string(),
            "offline_access".to_string(),
        ],
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
        ],
    }
}

/// Create mock discovery client for testing.
pub fn create_mock_discovery_client() -> MockDiscoveryClient {
    MockDiscoveryClient::new()
}
