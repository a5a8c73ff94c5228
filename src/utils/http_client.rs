// ABOUTME: Shared HTTP client utilities with connection pooling and timeout configuration
// ABOUTME: Provides per-purpose HTTP clients to eliminate redundant client creation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::constants::{discovery, tokens, HTTP_CONNECT_TIMEOUT_SECS};

/// Create a new HTTP client with custom timeout settings
///
/// # Arguments
/// * `timeout_secs` - Request timeout in seconds
/// * `connect_timeout_secs` - Connection timeout in seconds
///
/// # Errors
/// Returns a default client if custom client creation fails
#[must_use]
pub fn create_client_with_timeout(timeout_secs: u64, connect_timeout_secs: u64) -> Client {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Create a new HTTP client for metadata discovery and client registration
#[must_use]
pub fn discovery_client() -> Client {
    create_client_with_timeout(discovery::HTTP_TIMEOUT_SECS, HTTP_CONNECT_TIMEOUT_SECS)
}

/// Create a new HTTP client for token endpoint calls
#[must_use]
pub fn token_client() -> Client {
    create_client_with_timeout(tokens::HTTP_TIMEOUT_SECS, HTTP_CONNECT_TIMEOUT_SECS)
}
