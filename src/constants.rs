// ABOUTME: Engine constants grouped by domain
// ABOUTME: PKCE parameters, discovery paths, registration defaults, and HTTP timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Constants used across the authorization engine
//!
//! Constants are grouped into small domain modules rather than scattered
//! through the call sites that use them.

/// PKCE generation parameters (RFC 7636)
pub mod pkce {
    /// Length of the generated code verifier in characters
    pub const CODE_VERIFIER_LENGTH: usize = 128;
    /// Unreserved characters permitted in a code verifier
    pub const CODE_VERIFIER_CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
    /// The only code challenge method the engine emits
    pub const CODE_CHALLENGE_METHOD: &str = "S256";
}

/// Authorization server metadata discovery (RFC 8414)
pub mod discovery {
    /// Well-known paths probed when a provider hint supplies only an issuer
    pub const WELL_KNOWN_PATHS: &[&str] = &[
        "/.well-known/openid-configuration",
        "/.well-known/oauth-authorization-server",
    ];
    /// Request timeout for metadata and registration calls in seconds
    pub const HTTP_TIMEOUT_SECS: u64 = 15;
}

/// Dynamic client registration defaults (RFC 7591)
pub mod registration {
    /// Client name sent when none is configured
    pub const DEFAULT_CLIENT_NAME: &str = "MCP OAuth Engine";
    /// Grant types requested for registered clients
    pub const GRANT_TYPES: &[&str] = &["authorization_code"];
    /// Response types requested for registered clients
    pub const RESPONSE_TYPES: &[&str] = &["code"];
    /// Public clients prove possession with PKCE rather than a client secret
    pub const TOKEN_ENDPOINT_AUTH_METHOD: &str = "none";
    /// Scope used when neither the provider hint nor the server metadata names any
    pub const FALLBACK_SCOPE: &str = "openid";
}

/// Token endpoint interaction
pub mod tokens {
    /// Fallback lifetime when the provider reports an out-of-range `expires_in`
    pub const DEFAULT_TOKEN_EXPIRY_SECONDS: i64 = 3600;
    /// Request timeout for code exchange and refresh calls in seconds
    pub const HTTP_TIMEOUT_SECS: u64 = 30;
    /// Window before expiry in which a token counts as due for refresh
    pub const EXPIRY_REFRESH_WINDOW_SECONDS: i64 = 300;
}

/// Environment variables consulted for engine-wide defaults
pub mod env_keys {
    /// Base URL used to expand `${BASE_URL}` in provider configuration
    pub const BASE_URL: &str = "OAUTH_BASE_URL";
    /// Client name override for dynamic registration
    pub const CLIENT_NAME: &str = "OAUTH_CLIENT_NAME";
}

/// HTTP connect timeout shared by all outbound calls in seconds
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;
