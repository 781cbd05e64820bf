//! OIDC Client
//!
//! High-level client wiring the protocol client, token store, lifecycle
//! manager and request executor to one provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, instrument};
use url::Url;

use crate::core::{
    DefaultDiscoveryClient, DiscoveryClient, HttpRequest, HttpResponse, HttpTransport,
    ReqwestHttpTransport,
};
use crate::error::{AuthorizationError, ExecutionError, OidcError};
use crate::executor::{AuthFailureMatcher, AuthenticatedRequestExecutor};
use crate::flows::{OidcProtocolClient, ProtocolClient};
use crate::token::{
    DefaultTokenLifecycleManager, InMemoryTokenStore, LifecycleConfig, TokenLifecycleManager,
    TokenStore,
};
use crate::types::{
    AccountIdentity, AuthorizationOutcome, AuthorizationParams, ClientOptions, ProviderConfig,
    TokenSet, TokenState, TokenType,
};

/// The login UI. Opens the authorization URL and reports what the user did.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn authorize(&self, authorization_url: &Url) -> Result<AuthorizationOutcome, OidcError>;
}

/// Lifecycle manager used by [`OidcClient`].
pub type ClientLifecycleManager<T, S> = DefaultTokenLifecycleManager<OidcProtocolClient<Arc<T>>, S>;

/// OIDC client for one provider.
pub struct OidcClient<T: HttpTransport = ReqwestHttpTransport, S: TokenStore = InMemoryTokenStore> {
    manager: Arc<ClientLifecycleManager<T, S>>,
    executor: AuthenticatedRequestExecutor<ClientLifecycleManager<T, S>, Arc<T>>,
}

impl OidcClient<ReqwestHttpTransport, InMemoryTokenStore> {
    /// Create a client with the reqwest transport and an in-memory store.
    pub fn new(provider: ProviderConfig) -> Result<Self, OidcError> {
        let transport = ReqwestHttpTransport::new()?;
        Ok(Self::with_components(provider, transport, InMemoryTokenStore::new()))
    }

    /// Create a client for the provider behind `issuer` using discovery.
    pub async fn from_issuer(issuer: &str) -> Result<Self, OidcError> {
        let transport = ReqwestHttpTransport::new()?;
        let provider = DefaultDiscoveryClient::new(transport.clone())
            .get_provider_config(issuer)
            .await?;
        Ok(Self::with_components(provider, transport, InMemoryTokenStore::new()))
    }
}

impl<T: HttpTransport, S: TokenStore> OidcClient<T, S> {
    /// Create a client with custom components.
    pub fn with_components(provider: ProviderConfig, transport: T, store: S) -> Self {
        Self::with_config(provider, LifecycleConfig::default(), transport, store)
    }

    pub fn with_config(
        provider: ProviderConfig,
        config: LifecycleConfig,
        transport: T,
        store: S,
    ) -> Self {
        let transport = Arc::new(transport);
        let protocol = Arc::new(OidcProtocolClient::new(transport.clone()));
        let manager = Arc::new(DefaultTokenLifecycleManager::with_config(
            provider,
            config,
            protocol,
            Arc::new(store),
        ));
        let executor = AuthenticatedRequestExecutor::new(manager.clone(), transport);

        Self { manager, executor }
    }

    /// Replace the auth failure matcher used for authenticated requests.
    pub fn with_matcher(mut self, matcher: impl AuthFailureMatcher + 'static) -> Self {
        self.executor = self.executor.with_matcher(matcher);
        self
    }

    pub fn provider(&self) -> &ProviderConfig {
        self.manager.provider()
    }

    pub fn manager(&self) -> &Arc<ClientLifecycleManager<T, S>> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<S> {
        self.manager.store()
    }

    // ========== Authorization ==========

    /// Build the authorization URL for the login UI.
    pub fn build_authorization_url(
        &self,
        options: &ClientOptions,
        params: &AuthorizationParams,
    ) -> Result<Url, OidcError> {
        self.manager.protocol().build_authorization_url(
            &self.provider().authorization_endpoint,
            options,
            params,
        )
    }

    /// Run the login flow for an account and store the resulting tokens.
    ///
    /// A fresh `state` and `nonce` go into the authorization URL. The prompt is
    /// expected to check the redirect's `state`; the ID token must echo the
    /// `nonce` before anything is stored. Without the `jwt` feature no nonce is sent.
    #[instrument(skip(self, options, prompt), fields(account = %account))]
    pub async fn authorize_account<P: AuthorizationPrompt + ?Sized>(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
        prompt: &P,
    ) -> Result<TokenSet, OidcError> {
        let mut params = AuthorizationParams::with_random_state();
        if cfg!(not(feature = "jwt")) {
            params.nonce = None;
        }
        let url = self.build_authorization_url(options, &params)?;

        let code = match prompt.authorize(&url).await? {
            AuthorizationOutcome::Code(code) => code,
            AuthorizationOutcome::Cancelled => {
                info!("Authorization cancelled by user");
                return Err(AuthorizationError::Cancelled.into());
            }
        };

        let nonce = params.nonce;
        self.manager
            .complete_authorization_verified(account, options, &code, move |token_set| {
                match nonce.as_deref() {
                    Some(nonce) => verify_nonce(token_set, nonce),
                    None => Ok(()),
                }
            })
            .await
    }

    /// Exchange a code captured outside [`OidcClient::authorize_account`].
    pub async fn complete_authorization(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, OidcError> {
        self.manager
            .complete_authorization(account, options, code)
            .await
    }

    // ========== Tokens ==========

    pub async fn get_access_token(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<String, OidcError> {
        self.manager.get_access_token(account, options).await
    }

    pub async fn get_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        options: &ClientOptions,
    ) -> Result<String, OidcError> {
        self.manager.get_token(account, token_type, options).await
    }

    pub async fn invalidate(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<(), OidcError> {
        self.manager.invalidate(account, token_type).await
    }

    pub async fn state(&self, account: &AccountIdentity) -> Result<TokenState, OidcError> {
        self.manager.state(account).await
    }

    pub async fn remove_account(&self, account: &AccountIdentity) -> Result<bool, OidcError> {
        self.manager.remove_account(account).await
    }

    /// Claims of the account's ID token. Not verified; for display only.
    #[cfg(feature = "jwt")]
    pub async fn id_token_claims(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<crate::types::IdTokenClaims, OidcError> {
        let id_token = self.manager.get_token(account, TokenType::Id, options).await?;
        Ok(crate::types::IdTokenClaims::decode_unverified(&id_token)?)
    }

    // ========== Authenticated Requests ==========

    pub async fn execute(
        &self,
        request: HttpRequest,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<HttpResponse, ExecutionError> {
        self.executor.execute(request, account, options).await
    }

    pub async fn get_json(
        &self,
        url: &str,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<serde_json::Value, ExecutionError> {
        self.executor.get_json(url, account, options).await
    }

    /// Fetch the account's user info from the provider.
    pub async fn user_info(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<serde_json::Value, ExecutionError> {
        let endpoint = self.provider().userinfo_endpoint()?.clone();
        self.executor.get_json(endpoint.as_str(), account, options).await
    }
}

/// Check the ID token's `nonce` claim against the one sent in the authorization URL.
#[cfg(feature = "jwt")]
fn verify_nonce(token_set: &TokenSet, expected: &str) -> Result<(), OidcError> {
    let id_token = token_set
        .id_token
        .as_deref()
        .ok_or_else(|| {
            crate::error::ProtocolError::malformed("code exchange response missing id_token")
        })?;
    let claims = crate::types::IdTokenClaims::decode_unverified(id_token)?;

    if claims.nonce.as_deref() != Some(expected) {
        tracing::warn!("ID token nonce mismatch");
        return Err(AuthorizationError::NonceMismatch {
            expected: expected.to_string(),
            received: claims.nonce,
        }
        .into());
    }
    Ok(())
}

#[cfg(not(feature = "jwt"))]
fn verify_nonce(_token_set: &TokenSet, _expected: &str) -> Result<(), OidcError> {
    Ok(())
}

/// Create a client with default components.
pub fn oidc_client(provider: ProviderConfig) -> Result<OidcClient, OidcError> {
    OidcClient::new(provider)
}

/// Mock login UI for testing.
///
/// With an empty queue it answers with `Code("mock-code")`.
#[derive(Default)]
pub struct MockAuthorizationPrompt {
    outcomes: Mutex<VecDeque<Result<AuthorizationOutcome, OidcError>>>,
    url_history: Mutex<Vec<Url>>,
}

impl MockAuthorizationPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_outcome(&self, outcome: Result<AuthorizationOutcome, OidcError>) -> &Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    /// URLs the prompt was opened with.
    pub fn get_url_history(&self) -> Vec<Url> {
        self.url_history.lock().clone()
    }
}

#[async_trait]
impl AuthorizationPrompt for MockAuthorizationPrompt {
    async fn authorize(&self, authorization_url: &Url) -> Result<AuthorizationOutcome, OidcError> {
        self.url_history.lock().push(authorization_url.clone());
        let queued = self.outcomes.lock().pop_front();
        queued.unwrap_or_else(|| Ok(AuthorizationOutcome::Code("mock-code".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{client_options, provider_config};
    use crate::core::MockHttpTransport;
    use crate::types::CallbackParams;
    use serde_json::json;
    use std::collections::HashMap;

    type TestClient = OidcClient<Arc<MockHttpTransport>, InMemoryTokenStore>;

    fn account() -> AccountIdentity {
        AccountIdentity::new("alice", "com.example.oidc")
    }

    fn options() -> ClientOptions {
        client_options()
            .client_id("OIDCAndroidSample")
            .client_secret("password")
            .redirect_url("https://app.example.com/cb")
            .scopes(["openid", "profile", "offline_access"])
            .build()
            .unwrap()
    }

    fn provider() -> ProviderConfig {
        provider_config()
            .authorization_endpoint("https://op.example.com/authorize")
            .token_endpoint("https://op.example.com/token")
            .userinfo_endpoint("https://op.example.com/userinfo")
            .build()
            .unwrap()
    }

    fn client() -> (Arc<MockHttpTransport>, TestClient) {
        let transport = Arc::new(MockHttpTransport::new());
        let client = OidcClient::with_components(provider(), transport.clone(), InMemoryTokenStore::new());
        (transport, client)
    }

    fn full_token_response(id_token: &str) -> serde_json::Value {
        json!({
            "id_token": id_token,
            "access_token": "A1",
            "refresh_token": "R1",
            "token_type": "Bearer",
            "expires_in": 3600
        })
    }

    #[cfg(feature = "jwt")]
    fn id_token(claims: serde_json::Value) -> String {
        use jsonwebtoken::{encode, EncodingKey, Header};

        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"provider-key")).unwrap()
    }

    /// Login UI that consents at once; the provider then answers the code
    /// exchange with an ID token carrying `nonce` (or the one from the URL).
    #[cfg(feature = "jwt")]
    struct ConsentingPrompt {
        transport: Arc<MockHttpTransport>,
        nonce: Option<String>,
    }

    #[cfg(feature = "jwt")]
    #[async_trait]
    impl AuthorizationPrompt for ConsentingPrompt {
        async fn authorize(&self, url: &Url) -> Result<AuthorizationOutcome, OidcError> {
            let sent = url
                .query_pairs()
                .find(|(key, _)| key == "nonce")
                .map(|(_, value)| value.into_owned());
            let nonce = self.nonce.clone().or(sent);
            let id_token = id_token(json!({
                "iss": "https://op.example.com",
                "sub": "alice",
                "nonce": nonce
            }));
            self.transport
                .queue_json_response(200, &full_token_response(&id_token));
            Ok(AuthorizationOutcome::Code("mock-code".to_string()))
        }
    }

    #[test]
    fn test_client_creation() {
        assert!(OidcClient::new(provider()).is_ok());
    }

    #[cfg(feature = "jwt")]
    #[tokio::test]
    async fn test_authorize_account_stores_tokens() {
        let (transport, client) = client();
        let prompt = ConsentingPrompt {
            transport: transport.clone(),
            nonce: None,
        };

        let token_set = client
            .authorize_account(&account(), &options(), &prompt)
            .await
            .unwrap();
        assert_eq!(token_set.access_token, "A1");
        assert_eq!(client.state(&account()).await.unwrap(), TokenState::HasFullSet);

        let body = transport.get_requests()[0].body.clone().unwrap();
        assert!(body.contains("code=mock-code"));

        let token = client.get_access_token(&account(), &options()).await.unwrap();
        assert_eq!(token, "A1");
        assert_eq!(transport.request_count(), 1);
    }

    #[cfg(feature = "jwt")]
    #[tokio::test]
    async fn test_nonce_mismatch_stores_nothing() {
        let (transport, client) = client();
        let prompt = ConsentingPrompt {
            transport: transport.clone(),
            nonce: Some("replayed-nonce".to_string()),
        };

        let result = client.authorize_account(&account(), &options(), &prompt).await;
        assert!(matches!(
            result,
            Err(OidcError::Authorization(AuthorizationError::NonceMismatch { ref received, .. }))
                if received.as_deref() == Some("replayed-nonce")
        ));
        assert_eq!(transport.request_count(), 1);
        assert_eq!(client.state(&account()).await.unwrap(), TokenState::NoTokens);
    }

    #[cfg(feature = "jwt")]
    #[tokio::test]
    async fn test_id_token_without_nonce_is_rejected() {
        let (transport, client) = client();
        let prompt = MockAuthorizationPrompt::new();
        transport.queue_json_response(200, &full_token_response(&id_token(json!({
            "iss": "https://op.example.com",
            "sub": "alice"
        }))));

        let result = client.authorize_account(&account(), &options(), &prompt).await;
        assert!(matches!(
            result,
            Err(OidcError::Authorization(AuthorizationError::NonceMismatch { received: None, .. }))
        ));
        assert_eq!(client.state(&account()).await.unwrap(), TokenState::NoTokens);
    }

    #[tokio::test]
    async fn test_authorization_url_carries_state_and_nonce() {
        let (_transport, client) = client();
        let prompt = MockAuthorizationPrompt::new();
        prompt.queue_outcome(Ok(AuthorizationOutcome::Cancelled));
        let _ = client.authorize_account(&account(), &options(), &prompt).await;

        let url = &prompt.get_url_history()[0];
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "OIDCAndroidSample");
        assert!(query.contains_key("state"));
        assert_eq!(query.contains_key("nonce"), cfg!(feature = "jwt"));
    }

    #[tokio::test]
    async fn test_authorize_account_checks_state_through_callback() {
        struct RedirectPrompt;

        #[async_trait]
        impl AuthorizationPrompt for RedirectPrompt {
            async fn authorize(&self, url: &Url) -> Result<AuthorizationOutcome, OidcError> {
                let redirect = Url::parse("https://app.example.com/cb?code=c1&state=forged").unwrap();
                let expected = CallbackParams::expected_state(url);
                Ok(CallbackParams::from_redirect_url(&redirect).into_outcome(expected.as_deref())?)
            }
        }

        let (transport, client) = client();
        let result = client
            .authorize_account(&account(), &options(), &RedirectPrompt)
            .await;
        assert!(matches!(
            result,
            Err(OidcError::Authorization(AuthorizationError::StateMismatch { .. }))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_authorization() {
        let (transport, client) = client();
        let prompt = MockAuthorizationPrompt::new();
        prompt.queue_outcome(Ok(AuthorizationOutcome::Cancelled));

        let result = client.authorize_account(&account(), &options(), &prompt).await;
        assert!(matches!(
            result,
            Err(OidcError::Authorization(AuthorizationError::Cancelled))
        ));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(client.state(&account()).await.unwrap(), TokenState::NoTokens);
    }

    #[tokio::test]
    async fn test_user_info_uses_bearer() {
        let (transport, client) = client();
        client
            .manager()
            .store_token_set(&account(), &TokenSet::new("I1", "A1", "R1"))
            .await
            .unwrap();
        transport.queue_json_response(200, &json!({"sub": "alice", "given_name": "Leo"}));

        let info = client.user_info(&account(), &options()).await.unwrap();
        assert_eq!(info["given_name"], "Leo");

        let request = transport.get_last_request().unwrap();
        assert_eq!(request.url, "https://op.example.com/userinfo");
        assert_eq!(request.header_value("authorization"), Some("Bearer A1"));
    }

    #[tokio::test]
    async fn test_user_info_without_endpoint() {
        let transport = Arc::new(MockHttpTransport::new());
        let provider = provider_config()
            .authorization_endpoint("https://op.example.com/authorize")
            .token_endpoint("https://op.example.com/token")
            .build()
            .unwrap();
        let client = OidcClient::with_components(provider, transport, InMemoryTokenStore::new());

        let result = client.user_info(&account(), &options()).await;
        assert!(matches!(result, Err(ExecutionError::Configuration(_))));
    }

    #[cfg(feature = "jwt")]
    #[tokio::test]
    async fn test_id_token_claims() {
        let id_token = id_token(json!({
            "iss": "https://op.example.com",
            "sub": "alice",
            "given_name": "Leo"
        }));

        let (_transport, client) = client();
        client
            .manager()
            .store_token_set(&account(), &TokenSet::new(id_token, "A1", "R1"))
            .await
            .unwrap();

        let claims = client.id_token_claims(&account(), &options()).await.unwrap();
        assert_eq!(claims.given_name.as_deref(), Some("Leo"));
    }

    #[tokio::test]
    async fn test_remove_account() {
        let (_transport, client) = client();
        client
            .manager()
            .store_token_set(&account(), &TokenSet::new("I1", "A1", "R1"))
            .await
            .unwrap();

        assert!(client.remove_account(&account()).await.unwrap());
        let result = client.get_access_token(&account(), &options()).await;
        assert!(matches!(result, Err(OidcError::ReauthRequired { .. })));
    }
}
