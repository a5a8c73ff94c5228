// ABOUTME: Unit tests for provider configuration documents and engine settings
// ABOUTME: Validates JSON/YAML parsing, credential resolution, and redirect expansion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::env;

use serde_json::json;
use serial_test::serial;

use mcp_oauth_engine::config::{EngineConfig, ProviderConfigDocument, ProviderEntry};
use mcp_oauth_engine::errors::OAuthError;
use mcp_oauth_engine::providers::ProviderDirectory;

use common::{init_test_logging, test_engine_config};

fn entry_from(value: serde_json::Value) -> ProviderEntry {
    serde_json::from_value(value).expect("valid provider entry")
}

fn minimal_entry() -> ProviderEntry {
    entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token"
    }))
}

#[test]
fn test_json_document_parses_with_defaults() {
    init_test_logging();
    let raw = json!({
        "github": {
            "authorization_endpoint": "https://github.example/authorize",
            "token_endpoint": "https://github.example/token",
            "client_id": "gh-client"
        }
    })
    .to_string();

    let document = ProviderConfigDocument::from_json_str(&raw).unwrap();
    let entry = document.providers.get("github").unwrap();
    assert_eq!(
        entry.authorization_endpoint,
        "https://github.example/authorize"
    );
    assert_eq!(entry.client_id.as_deref(), Some("gh-client"));
    assert!(entry.display_name.is_none());
    assert!(entry.scopes.is_empty());
    assert!(entry.uses_pkce, "PKCE defaults on");
    assert!(entry.extra_authorize_params.is_empty());
}

#[test]
fn test_yaml_document_parses() {
    init_test_logging();
    let raw = r#"
github:
  display_name: GitHub
  authorization_endpoint: https://github.example/authorize
  token_endpoint: https://github.example/token
  client_id: gh-client
  client_secret: gh-secret
  uses_pkce: false
  scopes:
    - repo
    - "user:email"
  extra_authorize_params:
    allow_signup: "false"
"#;

    let document = ProviderConfigDocument::from_yaml_str(raw).unwrap();
    let entry = document.providers.get("github").unwrap();
    assert_eq!(entry.display_name.as_deref(), Some("GitHub"));
    assert_eq!(entry.client_secret.as_deref(), Some("gh-secret"));
    assert!(!entry.uses_pkce);
    assert_eq!(entry.scopes, vec!["repo".to_owned(), "user:email".to_owned()]);
    assert_eq!(
        entry.extra_authorize_params.get("allow_signup"),
        Some(&"false".to_owned())
    );
}

#[test]
fn test_malformed_json_is_config_error() {
    let err = ProviderConfigDocument::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, OAuthError::Config(_)));
    assert!(err.to_string().contains("JSON"));
}

#[test]
fn test_malformed_yaml_is_config_error() {
    // A sequence cannot deserialize into the provider map
    let err = ProviderConfigDocument::from_yaml_str("- just\n- a\n- list\n").unwrap_err();
    assert!(matches!(err, OAuthError::Config(_)));
    assert!(err.to_string().contains("YAML"));
}

#[test]
fn test_from_file_dispatches_on_extension() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();

    let yaml_path = dir.path().join("providers.yaml");
    std::fs::write(
        &yaml_path,
        "test:\n  authorization_endpoint: https://idp.example/auth\n  token_endpoint: https://idp.example/token\n",
    )
    .unwrap();
    let document = ProviderConfigDocument::from_file(&yaml_path).unwrap();
    assert!(document.providers.contains_key("test"));

    let json_path = dir.path().join("providers.json");
    std::fs::write(
        &json_path,
        r#"{"test": {"authorization_endpoint": "https://idp.example/auth", "token_endpoint": "https://idp.example/token"}}"#,
    )
    .unwrap();
    let document = ProviderConfigDocument::from_file(&json_path).unwrap();
    assert!(document.providers.contains_key("test"));
}

#[test]
fn test_from_file_missing_path_is_config_error() {
    let err =
        ProviderConfigDocument::from_file(std::path::Path::new("/nonexistent/providers.json"))
            .unwrap_err();
    assert!(matches!(err, OAuthError::Config(_)));
}

#[test]
fn test_resolve_client_id_prefers_inline_value() {
    let entry = entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token",
        "client_id": "inline-id"
    }));
    assert_eq!(entry.resolve_client_id("test").unwrap(), "inline-id");
}

#[test]
fn test_resolve_client_id_absent_is_empty() {
    // PKCE entries may defer the client id; the gap surfaces at start time
    let entry = minimal_entry();
    assert_eq!(entry.resolve_client_id("test").unwrap(), "");
}

#[test]
#[serial]
fn test_resolve_client_id_from_environment() {
    let entry = entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token",
        "client_id_env": "CFG_TEST_CLIENT_ID"
    }));

    env::set_var("CFG_TEST_CLIENT_ID", "env-client");
    assert_eq!(entry.resolve_client_id("test").unwrap(), "env-client");

    env::remove_var("CFG_TEST_CLIENT_ID");
    let err = entry.resolve_client_id("test").unwrap_err();
    assert!(matches!(err, OAuthError::MissingCredential(_)));
    assert!(err.to_string().contains("CFG_TEST_CLIENT_ID"));
}

#[test]
fn test_resolve_client_secret_inline() {
    let entry = entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token",
        "client_secret": "inline-secret"
    }));
    assert_eq!(
        entry.resolve_client_secret("test").unwrap().as_deref(),
        Some("inline-secret")
    );
}

#[test]
fn test_resolve_client_secret_optional_with_pkce() {
    let entry = minimal_entry();
    assert!(entry.resolve_client_secret("test").unwrap().is_none());
}

#[test]
fn test_resolve_client_secret_required_without_pkce() {
    let entry = entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token",
        "uses_pkce": false
    }));
    let err = entry.resolve_client_secret("test").unwrap_err();
    assert!(matches!(err, OAuthError::MissingCredential(_)));
}

#[test]
#[serial]
fn test_resolve_client_secret_from_environment() {
    let entry = entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token",
        "client_secret_env": "CFG_TEST_CLIENT_SECRET"
    }));

    env::set_var("CFG_TEST_CLIENT_SECRET", "env-secret");
    assert_eq!(
        entry.resolve_client_secret("test").unwrap().as_deref(),
        Some("env-secret")
    );

    env::remove_var("CFG_TEST_CLIENT_SECRET");
    let err = entry.resolve_client_secret("test").unwrap_err();
    assert!(matches!(err, OAuthError::MissingCredential(_)));
}

#[test]
fn test_redirect_uri_template_expansion() {
    let entry = entry_from(json!({
        "authorization_endpoint": "https://idp.example/auth",
        "token_endpoint": "https://idp.example/token",
        "redirect_uri": "${BASE_URL}/oauth/callback/custom"
    }));
    assert_eq!(
        entry.redirect_uri_for("test", "https://engine.example"),
        "https://engine.example/oauth/callback/custom"
    );
}

#[test]
fn test_redirect_uri_defaults_to_callback_path() {
    let entry = minimal_entry();
    assert_eq!(
        entry.redirect_uri_for("github", "https://engine.example"),
        "https://engine.example/oauth/callback/github"
    );
}

#[test]
#[serial]
fn test_engine_config_from_env() {
    env::set_var("OAUTH_BASE_URL", "https://auth.example");
    env::set_var("OAUTH_CLIENT_NAME", "Example Engine");
    let config = EngineConfig::from_env();
    assert_eq!(config.base_url, "https://auth.example");
    assert_eq!(config.client_name, "Example Engine");

    env::remove_var("OAUTH_BASE_URL");
    env::remove_var("OAUTH_CLIENT_NAME");
    let config = EngineConfig::from_env();
    assert_eq!(config.base_url, "http://localhost:8081");
    assert_eq!(config.client_name, "MCP OAuth Engine");
}

#[test]
fn test_directory_load_rejects_empty_endpoints() {
    init_test_logging();
    let raw = json!({
        "broken": {
            "authorization_endpoint": "",
            "token_endpoint": "https://idp.example/token"
        }
    })
    .to_string();
    let document = ProviderConfigDocument::from_json_str(&raw).unwrap();

    let err = ProviderDirectory::load(&document, test_engine_config()).unwrap_err();
    assert!(matches!(err, OAuthError::Config(_)));
    assert!(err.to_string().contains("broken"));
}
