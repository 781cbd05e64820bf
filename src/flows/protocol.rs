//! OIDC Protocol Client
//!
//! Authorization URL construction and the two token endpoint grants:
//! authorization code exchange and refresh.

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::{form_urlencoded, Url};

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{create_error_from_response, OidcError, ProtocolError};
use crate::types::{
    AuthorizationParams, ClientAuthMethod, ClientOptions, GrantType, TokenResponse, TokenSet,
};

/// Wire-level OIDC operations. Stateless apart from the transport.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Build the URL the login UI opens. No side effects.
    fn build_authorization_url(
        &self,
        authorization_endpoint: &Url,
        options: &ClientOptions,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcError>;

    /// Exchange a single-use authorization code for a full token set.
    async fn exchange_code_for_tokens(
        &self,
        token_endpoint: &Url,
        options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, ProtocolError>;

    /// Obtain a new access token. The returned set may lack ID and refresh tokens.
    async fn refresh_tokens(
        &self,
        token_endpoint: &Url,
        options: &ClientOptions,
        refresh_token: &str,
    ) -> Result<TokenSet, ProtocolError>;
}

/// Build the authorization URL.
///
/// Parameters are appended in a fixed order: `response_type`, `client_id`,
/// `redirect_uri`, `scope`, then the optional ones.
pub fn build_authorization_url(
    authorization_endpoint: &Url,
    options: &ClientOptions,
    params: &AuthorizationParams,
) -> Result<Url, OidcError> {
    options.validate()?;

    let mut url = authorization_endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &options.client_id)
            .append_pair("redirect_uri", options.redirect_url.as_str())
            .append_pair("scope", &options.scope_string());

        if let Some(state) = &params.state {
            query.append_pair("state", state);
        }
        if let Some(nonce) = &params.nonce {
            query.append_pair("nonce", nonce);
        }
        if let Some(prompt) = &params.prompt {
            query.append_pair("prompt", prompt.as_str());
        }
        if let Some(login_hint) = &params.login_hint {
            query.append_pair("login_hint", login_hint);
        }
        for (key, value) in &params.extra_params {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Form body and headers for a token endpoint request.
fn token_request(
    token_endpoint: &Url,
    options: &ClientOptions,
    grant_type: GrantType,
    grant_params: &[(&str, &str)],
) -> HttpRequest {
    let mut form = form_urlencoded::Serializer::new(String::new());
    form.append_pair("grant_type", grant_type.as_str());
    for (key, value) in grant_params {
        form.append_pair(key, value);
    }
    form.append_pair("client_id", &options.client_id);

    let mut request = HttpRequest::post(token_endpoint.as_str())
        .header("content-type", "application/x-www-form-urlencoded")
        .header("accept", "application/json")
        .timeout(options.request_timeout);

    match options.auth_method {
        ClientAuthMethod::ClientSecretPost => {
            form.append_pair("client_secret", options.client_secret.expose_secret());
        }
        ClientAuthMethod::ClientSecretBasic => {
            let credentials = format!(
                "{}:{}",
                form_urlencoded::byte_serialize(options.client_id.as_bytes()).collect::<String>(),
                form_urlencoded::byte_serialize(options.client_secret.expose_secret().as_bytes())
                    .collect::<String>()
            );
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            request = request.header("authorization", format!("Basic {}", encoded));
        }
    }

    request.body(form.finish())
}

/// Parse a token endpoint response into a token set.
fn parse_token_response(response: HttpResponse) -> Result<TokenSet, ProtocolError> {
    if !response.is_success() {
        return Err(create_error_from_response(response.status, &response.body));
    }

    let token_response: TokenResponse = serde_json::from_str(&response.body)
        .map_err(|e| ProtocolError::malformed(format!("invalid token response: {}", e)))?;

    TokenSet::from_response(token_response)
}

/// Default protocol client over an HTTP transport.
pub struct OidcProtocolClient<T: HttpTransport> {
    transport: T,
}

impl<T: HttpTransport> OidcProtocolClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn send(&self, request: HttpRequest, timeout: Duration) -> Result<HttpResponse, ProtocolError> {
        match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::timeout(timeout)),
        }
    }
}

#[async_trait]
impl<T: HttpTransport> ProtocolClient for OidcProtocolClient<T> {
    fn build_authorization_url(
        &self,
        authorization_endpoint: &Url,
        options: &ClientOptions,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcError> {
        build_authorization_url(authorization_endpoint, options, params)
    }

    #[instrument(skip_all, fields(client_id = %options.client_id))]
    async fn exchange_code_for_tokens(
        &self,
        token_endpoint: &Url,
        options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, ProtocolError> {
        let request = token_request(
            token_endpoint,
            options,
            GrantType::AuthorizationCode,
            &[("code", code), ("redirect_uri", options.redirect_url.as_str())],
        );

        debug!(endpoint = %token_endpoint, "Exchanging authorization code");
        let response = self.send(request, options.request_timeout).await?;
        let token_set = parse_token_response(response).map_err(|e| {
            warn!(error = %e, "Code exchange failed");
            e
        })?;

        if !token_set.is_complete() {
            warn!("Code exchange response lacks id_token or refresh_token");
            return Err(ProtocolError::malformed(
                "code exchange response missing id_token or refresh_token",
            ));
        }

        Ok(token_set)
    }

    #[instrument(skip_all, fields(client_id = %options.client_id))]
    async fn refresh_tokens(
        &self,
        token_endpoint: &Url,
        options: &ClientOptions,
        refresh_token: &str,
    ) -> Result<TokenSet, ProtocolError> {
        let scope = options.scope_string();
        let mut grant_params = vec![("refresh_token", refresh_token)];
        if !scope.is_empty() {
            grant_params.push(("scope", scope.as_str()));
        }
        let request = token_request(token_endpoint, options, GrantType::RefreshToken, &grant_params);

        debug!(endpoint = %token_endpoint, "Refreshing tokens");
        let response = self.send(request, options.request_timeout).await?;
        parse_token_response(response).map_err(|e| {
            warn!(error = %e, "Token refresh failed");
            e
        })
    }
}

/// Mock protocol client for testing.
///
/// Queued results are served in order; with an empty queue exchanges return a
/// complete mock set and refreshes an access-only set.
#[derive(Default)]
pub struct MockProtocolClient {
    exchange_results: Mutex<VecDeque<Result<TokenSet, ProtocolError>>>,
    refresh_results: Mutex<VecDeque<Result<TokenSet, ProtocolError>>>,
    exchange_history: Mutex<Vec<String>>,
    refresh_history: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockProtocolClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next code exchange.
    pub fn queue_exchange_result(&self, result: Result<TokenSet, ProtocolError>) -> &Self {
        self.exchange_results.lock().push_back(result);
        self
    }

    /// Queue the result of the next refresh.
    pub fn queue_refresh_result(&self, result: Result<TokenSet, ProtocolError>) -> &Self {
        self.refresh_results.lock().push_back(result);
        self
    }

    /// Delay every token endpoint call.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Codes passed to exchange.
    pub fn get_exchange_history(&self) -> Vec<String> {
        self.exchange_history.lock().clone()
    }

    /// Refresh tokens passed to refresh.
    pub fn get_refresh_history(&self) -> Vec<String> {
        self.refresh_history.lock().clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchange_history.lock().len()
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_history.lock().len()
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProtocolClient for MockProtocolClient {
    fn build_authorization_url(
        &self,
        authorization_endpoint: &Url,
        options: &ClientOptions,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcError> {
        build_authorization_url(authorization_endpoint, options, params)
    }

    async fn exchange_code_for_tokens(
        &self,
        _token_endpoint: &Url,
        _options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, ProtocolError> {
        self.exchange_history.lock().push(code.to_string());
        self.wait().await;

        let queued = self.exchange_results.lock().pop_front();
        queued.unwrap_or_else(|| {
            Ok(TokenSet::new(
                "mock-id-token",
                "mock-access-token",
                "mock-refresh-token",
            ))
        })
    }

    async fn refresh_tokens(
        &self,
        _token_endpoint: &Url,
        _options: &ClientOptions,
        refresh_token: &str,
    ) -> Result<TokenSet, ProtocolError> {
        self.refresh_history.lock().push(refresh_token.to_string());
        self.wait().await;

        let queued = self.refresh_results.lock().pop_front();
        queued.unwrap_or_else(|| {
            Ok(TokenSet {
                id_token: None,
                access_token: "mock-refreshed-access-token".to_string(),
                refresh_token: None,
                expiry: Default::default(),
            })
        })
    }
}

/// Create mock protocol client for testing.
pub fn create_mock_protocol_client() -> MockProtocolClient {
    MockProtocolClient::new()
}
