// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides logging initialization, store setup, and provider fixtures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(
    dead_code,
    clippy::wildcard_in_or_patterns,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(missing_docs)]

//! Shared test utilities for `mcp_oauth_engine`
//!
//! This module provides common test setup functions to reduce duplication
//! across integration tests.

use std::sync::{Arc, Once};

use anyhow::Result;
use mcp_oauth_engine::config::{EngineConfig, ProviderConfigDocument};
use mcp_oauth_engine::manager::TransactionManager;
use mcp_oauth_engine::providers::ProviderDirectory;
use mcp_oauth_engine::store::SqliteStore;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // Check for TEST_LOG environment variable to control test logging level
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN, // Default to WARN for quiet tests
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard in-memory store setup
pub async fn create_test_store() -> Result<Arc<SqliteStore>> {
    init_test_logging();
    Ok(Arc::new(SqliteStore::in_memory().await?))
}

/// Engine settings used across tests
pub fn test_engine_config() -> EngineConfig {
    EngineConfig::new(
        "https://engine.example".to_owned(),
        "Engine Test Client".to_owned(),
    )
}

/// Provider document with a single PKCE provider under the key `"test"`
pub fn test_provider_document(
    authorization_endpoint: &str,
    token_endpoint: &str,
) -> ProviderConfigDocument {
    let raw = serde_json::json!({
        "test": {
            "authorization_endpoint": authorization_endpoint,
            "token_endpoint": token_endpoint,
            "client_id": "test-client",
            "scopes": ["files.read"]
        }
    })
    .to_string();
    ProviderConfigDocument::from_json_str(&raw).expect("valid test provider document")
}

/// Manager wired to an in-memory store and the given provider document
pub async fn create_test_manager(
    document: &ProviderConfigDocument,
) -> Result<(TransactionManager<SqliteStore>, Arc<SqliteStore>)> {
    let store = create_test_store().await?;
    let directory = Arc::new(ProviderDirectory::load(document, test_engine_config())?);
    let manager = TransactionManager::new(Arc::clone(&store), directory);
    Ok((manager, store))
}
