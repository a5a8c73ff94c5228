// ABOUTME: Typed error taxonomy for the authorization engine
// ABOUTME: Every fallible operation surfaces one of these variants to callers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Error types shared by the provider directory, transaction manager, and
//! token resolver
//!
//! Variants are terminal to the caller's current request. The engine never
//! retries internally; the only legitimate retry is starting a fresh
//! transaction to obtain a new authorization code.

use thiserror::Error;

/// Convenience alias used throughout the engine
pub type OAuthResult<T> = Result<T, OAuthError>;

/// OAuth engine error types
#[derive(Debug, Error)]
pub enum OAuthError {
    /// No static configuration entry and no hint metadata to bootstrap from
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// No discovery URL was reachable, or the metadata lacked a required endpoint
    #[error("Authorization server discovery failed: {0}")]
    DiscoveryFailed(String),

    /// Dynamic client registration returned a non-success status or no client id
    #[error("Dynamic client registration rejected: {0}")]
    RegistrationRejected(String),

    /// Static configuration references a credential that is not available
    #[error("Missing credential for provider {0}")]
    MissingCredential(String),

    /// Neither the caller nor the provider configuration produced any scopes
    #[error("No scopes configured for provider {0}")]
    NoScopesConfigured(String),

    /// Transaction or token lookup found no matching record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transaction already reached a terminal status
    #[error("Transaction already resolved: {0}")]
    AlreadyResolved(String),

    /// Presented state does not match the stored transaction state
    #[error("State mismatch for transaction {0}")]
    StateMismatch(String),

    /// Token endpoint answered with a non-success status
    #[error("Token endpoint returned {status}: {body}")]
    TokenEndpointError {
        /// Upstream HTTP status code
        status: u16,
        /// Upstream response body, truncated to a loggable size
        body: String,
    },

    /// Token resolution was requested without a user or organization scope
    #[error("A user or organization scope is required for token resolution")]
    ScopeRequired,

    /// Stored token carries no refresh token to renew with
    #[error("No refresh token available for token {0}")]
    RefreshUnavailable(String),

    /// Transport-level HTTP failure (timeout, connect, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider configuration document could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl OAuthError {
    /// Whether the error indicates a possible CSRF or token-substitution attempt
    ///
    /// State mismatches deserve distinct alerting from ordinary lookup misses.
    #[must_use]
    pub const fn is_security_event(&self) -> bool {
        matches!(self, Self::StateMismatch(_))
    }
}
