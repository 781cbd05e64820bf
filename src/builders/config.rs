//! Configuration Builders
//!
//! Fluent builders for client options and provider endpoints.

use secrecy::SecretString;
use std::time::Duration;

use crate::core::DiscoveryClient;
use crate::error::{ConfigurationError, OidcError};
use crate::types::config::parse_endpoint;
use crate::types::{ClientAuthMethod, ClientOptions, ProviderConfig, DEFAULT_REQUEST_TIMEOUT};

/// Environment variable holding the authorization endpoint.
pub const ENV_AUTHORIZATION_ENDPOINT: &str = "OIDC_AUTHORIZATION_ENDPOINT";
/// Environment variable holding the token endpoint.
pub const ENV_TOKEN_ENDPOINT: &str = "OIDC_TOKEN_ENDPOINT";
/// Environment variable holding the userinfo endpoint.
pub const ENV_USERINFO_ENDPOINT: &str = "OIDC_USERINFO_ENDPOINT";
/// Environment variable holding the issuer.
pub const ENV_ISSUER: &str = "OIDC_ISSUER";

/// Client options builder.
pub struct ClientOptionsBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    redirect_url: Option<String>,
    scopes: Vec<String>,
    auth_method: ClientAuthMethod,
    request_timeout: Duration,
}

impl Default for ClientOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientOptionsBuilder {
    pub fn new() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_url: None,
            scopes: Vec::new(),
            auth_method: ClientAuthMethod::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set the registered redirect URL.
    pub fn redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// Add a scope. Duplicates are ignored; order is kept.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !scope.is_empty() && !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Replace the scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.clear();
        for scope in scopes {
            self = self.add_scope(scope);
        }
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    /// Set timeout for every network call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ClientOptions, ConfigurationError> {
        let client_id = self.client_id.ok_or_else(|| ConfigurationError::MissingField {
            field: "client_id".to_string(),
        })?;

        let client_secret = self
            .client_secret
            .ok_or_else(|| ConfigurationError::MissingField {
                field: "client_secret".to_string(),
            })?;

        let redirect_url = self
            .redirect_url
            .ok_or_else(|| ConfigurationError::MissingField {
                field: "redirect_url".to_string(),
            })?;

        let options = ClientOptions {
            client_id,
            client_secret,
            redirect_url: parse_endpoint("redirect_url", &redirect_url)?,
            scopes: self.scopes,
            auth_method: self.auth_method,
            request_timeout: self.request_timeout,
        };
        options.validate()?;

        Ok(options)
    }
}

/// Create a new client options builder.
pub fn client_options() -> ClientOptionsBuilder {
    ClientOptionsBuilder::new()
}

/// Provider endpoint builder.
#[derive(Default)]
pub struct ProviderConfigBuilder {
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    issuer: Option<String>,
}

impl ProviderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set authorization endpoint.
    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set userinfo endpoint.
    pub fn userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Set issuer.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Fill unset fields from `OIDC_*` environment variables.
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.authorization_endpoint.is_none() {
            self.authorization_endpoint = lookup(ENV_AUTHORIZATION_ENDPOINT);
        }
        if self.token_endpoint.is_none() {
            self.token_endpoint = lookup(ENV_TOKEN_ENDPOINT);
        }
        if self.userinfo_endpoint.is_none() {
            self.userinfo_endpoint = lookup(ENV_USERINFO_ENDPOINT);
        }
        if self.issuer.is_none() {
            self.issuer = lookup(ENV_ISSUER);
        }
        self
    }

    /// Configure from an existing provider config.
    pub fn from_provider_config(mut self, provider: ProviderConfig) -> Self {
        self.authorization_endpoint = Some(provider.authorization_endpoint.into());
        self.token_endpoint = Some(provider.token_endpoint.into());
        self.userinfo_endpoint = provider.userinfo_endpoint.map(Into::into);
        self.issuer = provider.issuer;
        self
    }

    /// Resolve the endpoints through discovery for the configured issuer.
    ///
    /// Endpoints set explicitly on the builder take precedence.
    pub async fn from_discovery<D: DiscoveryClient + ?Sized>(
        self,
        discovery: &D,
    ) -> Result<Self, OidcError> {
        let issuer = self
            .issuer
            .clone()
            .ok_or_else(|| ConfigurationError::MissingField {
                field: "issuer".to_string(),
            })?;
        let discovered = discovery.get_provider_config(&issuer).await?;

        Ok(Self {
            authorization_endpoint: self
                .authorization_endpoint
                .or_else(|| Some(discovered.authorization_endpoint.into())),
            token_endpoint: self
                .token_endpoint
                .or_else(|| Some(discovered.token_endpoint.into())),
            userinfo_endpoint: self
                .userinfo_endpoint
                .or_else(|| discovered.userinfo_endpoint.map(Into::into)),
            issuer: Some(issuer),
        })
    }

    pub fn build(self) -> Result<ProviderConfig, ConfigurationError> {
        let authorization_endpoint =
            self.authorization_endpoint
                .ok_or_else(|| ConfigurationError::MissingField {
                    field: "authorization_endpoint".to_string(),
                })?;

        let token_endpoint = self
            .token_endpoint
            .ok_or_else(|| ConfigurationError::MissingField {
                field: "token_endpoint".to_string(),
            })?;

        let userinfo_endpoint = self
            .userinfo_endpoint
            .as_deref()
            .map(|url| parse_endpoint("userinfo_endpoint", url))
            .transpose()?;

        Ok(ProviderConfig {
            authorization_endpoint: parse_endpoint(
                "authorization_endpoint",
                &authorization_endpoint,
            )?,
            token_endpoint: parse_endpoint("token_endpoint", &token_endpoint)?,
            userinfo_endpoint,
            issuer: self.issuer,
        })
    }
}

/// Create a new provider config builder.
pub fn provider_config() -> ProviderConfigBuilder {
    ProviderConfigBuilder::new()
}
