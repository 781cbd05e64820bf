//! Authenticated requests against a mock provider and resource server.

mod common;

use common::*;
use oidc_integration::{
    ExecutionError, HttpRequest, StatusMatcher, TokenSet, TokenState, TokenStore,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockBuilder, ResponseTemplate};

fn resource_request(server: &wiremock::MockServer) -> HttpRequest {
    HttpRequest::get(format!("{}/api/profile", server.uri()))
}

fn resource(token: &str) -> MockBuilder {
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_request_retried() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    resource("A2")
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "alice"})))
        .expect(1)
        .mount(&server)
        .await;
    refresh_grant()
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(token_response(json!({
            "access_token": "A2",
            "refresh_token": "R1",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let response = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, r#"{"name":"alice"}"#);

    let stored = client.store().load(&account()).await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("A2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("R1"));
    assert_eq!(stored.id_token.as_deref(), Some("I1"));
}

#[tokio::test]
async fn test_concurrent_rejections_of_stale_token_refresh_once() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(100)))
        .expect(2)
        .mount(&server)
        .await;
    resource("A2")
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;
    refresh_grant()
        .respond_with(token_response(json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let (acct, opts) = (account(), options());
    let (first, second) = tokio::join!(
        client.execute(resource_request(&server), &acct, &opts),
        client.execute(resource_request(&server), &acct, &opts),
    );
    assert_eq!(first.unwrap().status, 200);
    assert_eq!(second.unwrap().status, 200);

    let stored = client.store().load(&account()).await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("A2"));
}

#[tokio::test]
async fn test_persistent_unauthorized_is_unrecoverable() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .expect(2)
        .mount(&server)
        .await;
    refresh_grant()
        .respond_with(token_response(json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let error = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap_err();
    match error {
        ExecutionError::Unrecoverable { status, body, .. } => {
            assert_eq!(status, 401);
            assert_eq!(body, "token revoked");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_reauth_during_retry_surfaces_reauth_required() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    refresh_grant()
        .respond_with(invalid_grant())
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let error = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap_err();
    assert!(error.needs_reauth());
    assert_eq!(
        client.state(&account()).await.unwrap(),
        TokenState::NeedsReauthorization
    );
}

#[tokio::test]
async fn test_no_tokens_sends_nothing() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap_err();
    assert!(matches!(error, ExecutionError::ReauthRequired { .. }));
}

#[tokio::test]
async fn test_bad_request_with_marker_is_retried_by_default() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(400).set_body_string("Access Token not valid"))
        .expect(1)
        .mount(&server)
        .await;
    resource("A2")
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    refresh_grant()
        .respond_with(token_response(json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let response = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_plain_bad_request_is_not_retried_by_default() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_request"})))
        .expect(1)
        .mount(&server)
        .await;
    refresh_grant()
        .respond_with(token_response(json!({"access_token": "A2"})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let error = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(400));
}

#[tokio::test]
async fn test_always_policy_retries_plain_bad_request() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_request"})))
        .expect(1)
        .mount(&server)
        .await;
    resource("A2")
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    refresh_grant()
        .respond_with(token_response(json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_matcher(StatusMatcher::always());
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let response = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_never_policy_ignores_marker_bodies() {
    let server = setup_mock_server().await;
    resource("A1")
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).with_matcher(StatusMatcher::never());
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let error = client
        .execute(resource_request(&server), &account(), &options())
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(400));
}

#[tokio::test]
async fn test_user_info() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"sub": "alice", "given_name": "Leo"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    seed(&client, TokenSet::new("I1", "A1", "R1")).await;

    let info = client.user_info(&account(), &options()).await.unwrap();
    assert_eq!(info["given_name"], "Leo");
}
