//! Shared helpers for the wiremock integration tests.

#![allow(dead_code)]

use oidc_integration::{
    client_options, provider_config, AccountIdentity, ClientOptions, InMemoryTokenStore,
    OidcClient, ReqwestHttpTransport, TokenLifecycleManager, TokenSet,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

pub type TestClient = OidcClient<ReqwestHttpTransport, InMemoryTokenStore>;

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn account() -> AccountIdentity {
    AccountIdentity::new("alice", "com.example.oidc")
}

pub fn options() -> ClientOptions {
    client_options()
        .client_id("OIDCAndroidSample")
        .client_secret("password")
        .redirect_url("http://openam.example.com:8080/openid/cb-basic.html")
        .scopes(["openid", "profile", "offline_access"])
        .request_timeout(Duration::from_secs(5))
        .build()
        .expect("valid client options")
}

/// Client whose provider endpoints all live on `server`.
pub fn client_for(server: &MockServer) -> TestClient {
    let provider = provider_config()
        .authorization_endpoint(format!("{}/authorize", server.uri()))
        .token_endpoint(format!("{}/token", server.uri()))
        .userinfo_endpoint(format!("{}/userinfo", server.uri()))
        .build()
        .expect("valid provider config");
    let transport = ReqwestHttpTransport::new().expect("HTTP client");
    OidcClient::with_components(provider, transport, InMemoryTokenStore::new())
}

pub async fn seed(client: &TestClient, token_set: TokenSet) {
    client
        .manager()
        .store_token_set(&account(), &token_set)
        .await
        .expect("seed tokens");
}

/// Token endpoint mock for the refresh grant.
pub fn refresh_grant() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
}

/// Token endpoint mock for the authorization code grant.
pub fn code_grant() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
}

pub fn token_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

pub fn invalid_grant() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": "invalid_grant",
        "error_description": "refresh token revoked"
    }))
}
