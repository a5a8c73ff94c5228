// ABOUTME: Main library entry point for the MCP OAuth authorization engine
// ABOUTME: Provides provider discovery, PKCE authorization flows, and token persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # MCP OAuth Authorization Engine
//!
//! An OAuth 2.0 authorization engine for MCP tool servers. The engine drives
//! authorization-code flows (with PKCE) against upstream identity providers
//! so that an MCP composition layer can attach bearer tokens to outbound
//! tool-server connections.
//!
//! ## Features
//!
//! - **Provider directory**: statically configured providers plus dynamic
//!   bootstrap via RFC 8414 metadata discovery and RFC 7591 client
//!   registration
//! - **Transaction lifecycle**: start, complete, fail, revoke, persisted as
//!   auditable `OAuthTransaction` records with a single-winner completion
//!   guarantee under races
//! - **PKCE**: `S256` code challenges on every flow unless a provider opts
//!   out
//! - **Token resolution**: the most recent token per namespace, scoped to a
//!   user or organization
//! - **Pluggable persistence**: `async` store traits with a bundled SQLite
//!   implementation
//!
//! ## Architecture
//!
//! The engine is a library crate with no HTTP surface of its own:
//! - **`providers`**: provider descriptors, the directory, and discovery
//!   bootstrap
//! - **`manager`**: the transaction lifecycle engine
//! - **`resolver`**: the read-side token lookup
//! - **`store`**: persistence traits and the SQLite implementation
//! - **`client`**: authorize-URL construction and token-endpoint exchanges
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use mcp_oauth_engine::config::{EngineConfig, ProviderConfigDocument};
//! use mcp_oauth_engine::manager::{StartTransactionRequest, TransactionManager};
//! use mcp_oauth_engine::providers::ProviderDirectory;
//! use mcp_oauth_engine::store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let providers = ProviderConfigDocument::from_file(Path::new("providers.yaml"))?;
//!     let directory = ProviderDirectory::load(&providers, EngineConfig::from_env())?;
//!     let store = SqliteStore::new("sqlite:oauth.db").await?;
//!
//!     let manager = TransactionManager::new(Arc::new(store), Arc::new(directory));
//!     let request = StartTransactionRequest::new(
//!         "github".to_owned(),
//!         uuid::Uuid::new_v4(),
//!         "example/server".to_owned(),
//!     );
//!     let transaction = manager.start_transaction(request).await?;
//!     println!("redirect the user to {}", transaction.authorization_url);
//!
//!     Ok(())
//! }
//! ```

/// HTTP client for a resolved provider's authorize and token endpoints
pub mod client;

/// Provider configuration documents and engine settings
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// RFC 8414 metadata discovery and RFC 7591 dynamic client registration
pub mod discovery;

/// Unified error handling for every engine operation
pub mod errors;

/// Production logging and structured output
pub mod logging;

/// Transaction lifecycle engine for authorization flows
pub mod manager;

/// Common data models for transactions and tokens
pub mod models;

/// PKCE code verifier and challenge generation
pub mod pkce;

/// Provider directory with static configuration and dynamic bootstrap
pub mod providers;

/// Read-side token resolution for MCP connection builders
pub mod resolver;

/// Persistence traits and the SQLite reference implementation
pub mod store;

/// Utility functions and helpers
pub mod utils;
