//! Configuration Types
//!
//! Client options supplied by the embedding application and the provider's endpoints.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigurationError;

/// Default timeout applied to every network call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OIDC client options.
///
/// Passed explicitly into every protocol call; there is no ambient client configuration.
#[derive(Clone)]
pub struct ClientOptions {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: SecretString,
    /// Redirect URL registered with the provider.
    pub redirect_url: Url,
    /// Requested scopes, in order, without duplicates.
    pub scopes: Vec<String>,
    /// How the client authenticates at the token endpoint.
    pub auth_method: ClientAuthMethod,
    /// Timeout for each network call.
    pub request_timeout: Duration,
}

impl ClientOptions {
    /// Check that every required field carries a value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "client_id".to_string(),
            });
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "client_secret".to_string(),
            });
        }
        if self.redirect_url.as_str().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "redirect_url".to_string(),
            });
        }
        Ok(())
    }

    /// Scopes joined with single spaces.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url.as_str())
            .field("scopes", &self.scopes)
            .field("auth_method", &self.auth_method)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Client authentication method at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in request body.
    #[default]
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    ClientSecretBasic,
}

/// Grant type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// OIDC provider endpoint configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Authorization endpoint URL.
    pub authorization_endpoint: Url,
    /// Token endpoint URL.
    pub token_endpoint: Url,
    /// OIDC userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl ProviderConfig {
    pub fn userinfo_endpoint(&self) -> Result<&Url, ConfigurationError> {
        self.userinfo_endpoint
            .as_ref()
            .ok_or_else(|| ConfigurationError::MissingEndpoint {
                endpoint: "userinfo_endpoint".to_string(),
            })
    }
}

/// OIDC Discovery document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OIDCDiscoveryDocument {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// JWKS URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// Supported scopes.
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// Supported response types.
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    /// Supported grant types.
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    /// Token endpoint auth methods.
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

impl OIDCDiscoveryDocument {
    /// Convert to provider config.
    pub fn to_provider_config(&self) -> Result<ProviderConfig, ConfigurationError> {
        let userinfo_endpoint = self
            .userinfo_endpoint
            .as_deref()
            .map(|url| parse_endpoint("userinfo_endpoint", url))
            .transpose()?;

        Ok(ProviderConfig {
            authorization_endpoint: parse_endpoint(
                "authorization_endpoint",
                &self.authorization_endpoint,
            )?,
            token_endpoint: parse_endpoint("token_endpoint", &self.token_endpoint)?,
            userinfo_endpoint,
            issuer: Some(self.issuer.clone()),
        })
    }

    /// Preferred client authentication method advertised by the provider.
    pub fn preferred_auth_method(&self) -> ClientAuthMethod {
        let supports = |m: &str| {
            self.token_endpoint_auth_methods_supported
                .iter()
                .any(|s| s == m)
        };
        if !supports("client_secret_post") && supports("client_secret_basic") {
            ClientAuthMethod::ClientSecretBasic
        } else {
            ClientAuthMethod::ClientSecretPost
        }
    }
}

pub(crate) fn parse_endpoint(field: &str, url: &str) -> Result<Url, ConfigurationError> {
    Url::parse(url).map_err(|_| ConfigurationError::InvalidUrl {
        field: field.to_string(),
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(client_id: &str, secret: &str) -> ClientOptions {
        ClientOptions {
            client_id: client_id.to_string(),
            client_secret: SecretString::new(secret.to_string()),
            redirect_url: Url::parse("https://app.example.com/cb").unwrap(),
            scopes: vec!["openid".to_string(), "offline_access".to_string()],
            auth_method: ClientAuthMethod::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[test]
    fn test_validate_requires_client_id_and_secret() {
        assert!(options("client", "secret").validate().is_ok());
        assert_eq!(
            options("  ", "secret").validate(),
            Err(ConfigurationError::MissingField {
                field: "client_id".to_string()
            })
        );
        assert_eq!(
            options("client", "").validate(),
            Err(ConfigurationError::MissingField {
                field: "client_secret".to_string()
            })
        );
    }

    #[test]
    fn test_scope_string_keeps_order() {
        assert_eq!(options("c", "s").scope_string(), "openid offline_access");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", options("client", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_grant_type_as_str() {
        assert_eq!(GrantType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(GrantType::RefreshToken.as_str(), "refresh_token");
    }

    #[test]
    fn test_discovery_to_provider_config() {
        let doc = OIDCDiscoveryDocument {
            issuer: "https://example.com".to_string(),
            authorization_endpoint: "https://example.com/authorize".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            userinfo_endpoint: Some("https://example.com/userinfo".to_string()),
            jwks_uri: None,
            scopes_supported: vec!["openid".to_string()],
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec!["authorization_code".to_string()],
            token_endpoint_auth_methods_supported: vec!["client_secret_basic".to_string()],
        };

        let config = doc.to_provider_config().unwrap();
        assert_eq!(config.token_endpoint.as_str(), "https://example.com/token");
        assert_eq!(config.issuer, Some("https://example.com".to_string()));
        assert_eq!(doc.preferred_auth_method(), ClientAuthMethod::ClientSecretBasic);
    }

    #[test]
    fn test_discovery_rejects_bad_endpoint() {
        let doc = OIDCDiscoveryDocument {
            issuer: "https://example.com".to_string(),
            authorization_endpoint: "not a url".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            userinfo_endpoint: None,
            jwks_uri: None,
            scopes_supported: Vec::new(),
            response_types_supported: Vec::new(),
            grant_types_supported: Vec::new(),
            token_endpoint_auth_methods_supported: Vec::new(),
        };

        assert!(matches!(
            doc.to_provider_config(),
            Err(ConfigurationError::InvalidUrl { .. })
        ));
    }
}
