// ABOUTME: Authorization server metadata discovery and dynamic client registration
// ABOUTME: Implements the RFC 8414 metadata fetch and RFC 7591 registration POST
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::registration;
use crate::errors::{OAuthError, OAuthResult};

/// Authorization server metadata document (RFC 8414 / OpenID discovery)
///
/// Only the fields the engine consumes are modeled; unknown fields are
/// ignored during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// Issuer identifier the document describes
    pub issuer: Option<String>,
    /// Authorization endpoint URL
    pub authorization_endpoint: Option<String>,
    /// Token endpoint URL
    pub token_endpoint: Option<String>,
    /// Dynamic client registration endpoint URL
    pub registration_endpoint: Option<String>,
    /// Scopes the server advertises
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// PKCE challenge methods the server advertises
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// Client registration request body (RFC 7591)
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    /// Human-readable client name shown on consent screens
    pub client_name: String,
    /// Redirect URIs the client will use
    pub redirect_uris: Vec<String>,
    /// Grant types the client requests
    pub grant_types: Vec<String>,
    /// Response types the client requests
    pub response_types: Vec<String>,
    /// How the client authenticates at the token endpoint
    pub token_endpoint_auth_method: String,
    /// Space-delimited scopes, omitted when none were discovered or hinted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl RegistrationRequest {
    /// Build a registration request for a public PKCE client
    #[must_use]
    pub fn public_client(client_name: &str, redirect_uri: &str, scopes: &[String]) -> Self {
        Self {
            client_name: client_name.to_owned(),
            redirect_uris: vec![redirect_uri.to_owned()],
            grant_types: registration::GRANT_TYPES
                .iter()
                .map(|&s| s.to_owned())
                .collect(),
            response_types: registration::RESPONSE_TYPES
                .iter()
                .map(|&s| s.to_owned())
                .collect(),
            token_endpoint_auth_method: registration::TOKEN_ENDPOINT_AUTH_METHOD.to_owned(),
            scope: if scopes.is_empty() {
                None
            } else {
                Some(scopes.join(" "))
            },
        }
    }
}

/// Credentials returned by a successful client registration
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// Issued client identifier
    pub client_id: String,
    /// Issued client secret, absent for public clients
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: Option<String>,
    client_secret: Option<String>,
}

/// Fetch an authorization server metadata document from one candidate URL
///
/// # Errors
///
/// Returns `OAuthError::Http` on transport failure and
/// `OAuthError::DiscoveryFailed` on a non-success status or unparseable body.
/// Callers trying several candidate URLs treat either as "try the next one".
pub async fn fetch_server_metadata(client: &Client, url: &str) -> OAuthResult<ServerMetadata> {
    debug!("Fetching authorization server metadata from {url}");
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(OAuthError::DiscoveryFailed(format!(
            "{url} returned {status}"
        )));
    }
    response
        .json::<ServerMetadata>()
        .await
        .map_err(|e| OAuthError::DiscoveryFailed(format!("{url} returned invalid metadata: {e}")))
}

/// Register a client at the given registration endpoint
///
/// # Errors
///
/// Returns `OAuthError::RegistrationRejected` on a non-2xx/3xx status or a
/// response lacking a client id, `OAuthError::Http` on transport failure.
pub async fn register_client(
    client: &Client,
    registration_endpoint: &str,
    request: &RegistrationRequest,
) -> OAuthResult<RegisteredClient> {
    info!("Registering OAuth client at {registration_endpoint}");
    let response = client
        .post(registration_endpoint)
        .json(request)
        .send()
        .await?;
    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
        let body = response.text().await.unwrap_or_default();
        return Err(OAuthError::RegistrationRejected(format!(
            "{registration_endpoint} returned {status}: {body}"
        )));
    }
    let registered: RegistrationResponse = response.json().await.map_err(|e| {
        OAuthError::RegistrationRejected(format!("Invalid registration response: {e}"))
    })?;
    let client_id = registered
        .client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            OAuthError::RegistrationRejected("Registration response missing client_id".to_owned())
        })?;
    debug!("Registered OAuth client {client_id}");
    Ok(RegisteredClient {
        client_id,
        client_secret: registered.client_secret,
    })
}
