// ABOUTME: Integration tests for explicit token refresh
// ABOUTME: Validates lineage append, refresh-token carry-forward, and failure isolation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use chrono::Utc;
use mcp_oauth_engine::errors::OAuthError;
use mcp_oauth_engine::manager::StartTransactionRequest;
use mcp_oauth_engine::models::OAuthToken;
use mcp_oauth_engine::resolver::TokenResolver;
use mcp_oauth_engine::store::TokenStore;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{create_test_manager, test_provider_document};

/// Mount an exchange mock answering authorization-code grants
async fn mount_exchange_mock(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ACCESS",
            "refresh_token": "REFRESH",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "files.read"
        })))
        .mount(server)
        .await;
}

/// Run a full start-and-complete flow, returning the issued token
async fn issue_token(
    manager: &mcp_oauth_engine::manager::TransactionManager<mcp_oauth_engine::store::SqliteStore>,
    user_id: Uuid,
) -> OAuthToken {
    let request =
        StartTransactionRequest::new("test".to_owned(), user_id, "example/server".to_owned());
    let transaction = manager.start_transaction(request).await.unwrap();
    manager
        .complete_transaction(&transaction.id, "auth-code", Some(&transaction.state))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_refresh_appends_new_token() {
    let server = MockServer::start().await;
    mount_exchange_mock(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=REFRESH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ACCESS2",
            "expires_in": 7200,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let document = test_provider_document(
        &format!("{}/auth", server.uri()),
        &format!("{}/token", server.uri()),
    );
    let (manager, store) = create_test_manager(&document).await.unwrap();

    let user_id = Uuid::new_v4();
    let original = issue_token(&manager, user_id).await;
    let renewed = manager.refresh(&original.id).await.unwrap();

    assert_ne!(renewed.id, original.id);
    assert_eq!(renewed.access_token, "ACCESS2");
    assert_eq!(renewed.transaction_id, original.transaction_id);
    assert_eq!(renewed.user_id, user_id);
    assert_eq!(renewed.mcp_namespace, "example/server");
    // The provider did not rotate; the old refresh token carries forward
    assert_eq!(renewed.refresh_token.as_deref(), Some("REFRESH"));

    // Recency: the resolver now returns the renewed token
    let resolver = TokenResolver::new(Arc::clone(&store));
    let latest = resolver
        .latest("example/server", Some(user_id), None)
        .await
        .unwrap()
        .expect("token resolved");
    assert_eq!(latest.id, renewed.id);

    // The refreshed-from record is untouched
    let old = store
        .get_token(&original.id)
        .await
        .unwrap()
        .expect("original token still stored");
    assert_eq!(old.access_token, "ACCESS");
}

#[tokio::test]
async fn test_refresh_rotates_refresh_token_when_provided() {
    let server = MockServer::start().await;
    mount_exchange_mock(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ACCESS2",
            "refresh_token": "REFRESH2",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let document = test_provider_document(
        &format!("{}/auth", server.uri()),
        &format!("{}/token", server.uri()),
    );
    let (manager, _store) = create_test_manager(&document).await.unwrap();

    let original = issue_token(&manager, Uuid::new_v4()).await;
    let renewed = manager.refresh(&original.id).await.unwrap();

    assert_eq!(renewed.refresh_token.as_deref(), Some("REFRESH2"));
}

#[tokio::test]
async fn test_refresh_without_refresh_token_fails() {
    let document =
        test_provider_document("https://idp.example/auth", "https://idp.example/token");
    let (manager, store) = create_test_manager(&document).await.unwrap();

    let token = OAuthToken {
        id: "tok-no-refresh".to_owned(),
        transaction_id: "txn-1".to_owned(),
        user_id: Uuid::new_v4(),
        organization_id: None,
        mcp_namespace: "example/server".to_owned(),
        provider_key: "test".to_owned(),
        access_token: "ACCESS".to_owned(),
        refresh_token: None,
        token_type: "Bearer".to_owned(),
        scope: "files.read".to_owned(),
        expires_at: None,
        issued_at: Utc::now(),
        upstream_response: None,
    };
    store.create_token(&token).await.unwrap();

    let err = manager.refresh(&token.id).await.unwrap_err();
    assert!(matches!(err, OAuthError::RefreshUnavailable(id) if id == token.id));
}

#[tokio::test]
async fn test_refresh_unknown_token_fails() {
    let document =
        test_provider_document("https://idp.example/auth", "https://idp.example/token");
    let (manager, _store) = create_test_manager(&document).await.unwrap();

    let err = manager.refresh("missing-token").await.unwrap_err();
    assert!(matches!(err, OAuthError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_refresh_leaves_existing_token() {
    let server = MockServer::start().await;
    mount_exchange_mock(&server).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "error": "invalid_grant" })),
        )
        .mount(&server)
        .await;

    let document = test_provider_document(
        &format!("{}/auth", server.uri()),
        &format!("{}/token", server.uri()),
    );
    let (manager, store) = create_test_manager(&document).await.unwrap();

    let user_id = Uuid::new_v4();
    let original = issue_token(&manager, user_id).await;

    let err = manager.refresh(&original.id).await.unwrap_err();
    assert!(matches!(
        err,
        OAuthError::TokenEndpointError { status: 400, .. }
    ));

    // No record was appended; the original token is still the latest
    let resolver = TokenResolver::new(Arc::clone(&store));
    let latest = resolver
        .latest("example/server", Some(user_id), None)
        .await
        .unwrap()
        .expect("token resolved");
    assert_eq!(latest.id, original.id);
    assert_eq!(latest.access_token, "ACCESS");
}
