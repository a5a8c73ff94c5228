// ABOUTME: HTTP client for one provider's authorize and token endpoints
// ABOUTME: Builds authorization URLs and performs code exchange and refresh calls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::tokens::DEFAULT_TOKEN_EXPIRY_SECONDS;
use crate::errors::{OAuthError, OAuthResult};
use crate::pkce::PkceParams;
use crate::providers::ProviderDescriptor;
use crate::utils::http_client::token_client;

/// Longest upstream error body carried inside a `TokenEndpointError`
const MAX_ERROR_BODY_LEN: usize = 2048;

/// Token material returned by a successful exchange or refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    /// The access token issued by the authorization server
    pub access_token: String,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Expiration timestamp, absent when the provider omitted `expires_in`
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token for obtaining new access tokens
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes as reported by the provider
    pub scope: Option<String>,
    /// Raw provider response, retained for audit
    pub raw: serde_json::Value,
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// The access token issued by the authorization server
    access_token: String,
    /// The type of token (usually "Bearer")
    token_type: Option<String>,
    /// Token lifetime in seconds
    expires_in: Option<u64>,
    /// Refresh token for obtaining new access tokens
    refresh_token: Option<String>,
    /// Space-separated list of granted scopes
    scope: Option<String>,
}

/// Client for the authorize and token endpoints of one resolved provider
pub struct ProviderClient {
    descriptor: ProviderDescriptor,
    client: reqwest::Client,
}

impl ProviderClient {
    /// Create a client for the given provider descriptor
    #[must_use]
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        Self {
            descriptor,
            client: token_client(),
        }
    }

    /// Build the authorization URL the end user is sent to
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Config` if the authorization endpoint is not a
    /// valid URL.
    pub fn build_authorization_url(
        &self,
        state: &str,
        scopes: &[String],
        pkce: Option<&PkceParams>,
    ) -> OAuthResult<String> {
        let mut url = Url::parse(&self.descriptor.authorization_endpoint).map_err(|e| {
            OAuthError::Config(format!(
                "Invalid authorization endpoint for {}: {e}",
                self.descriptor.key
            ))
        })?;

        let mut query_pairs = url.query_pairs_mut();
        query_pairs
            .append_pair("client_id", &self.descriptor.client_id)
            .append_pair("redirect_uri", &self.descriptor.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);

        if let Some(audience) = &self.descriptor.audience {
            query_pairs.append_pair("audience", audience);
        }
        if let Some(access_type) = &self.descriptor.access_type {
            query_pairs.append_pair("access_type", access_type);
        }
        if let Some(prompt) = &self.descriptor.prompt {
            query_pairs.append_pair("prompt", prompt);
        }
        for (name, value) in &self.descriptor.extra_authorize_params {
            query_pairs.append_pair(name, value);
        }

        if let Some(pkce) = pkce {
            query_pairs
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", &pkce.code_challenge_method);
        }

        drop(query_pairs);
        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::TokenEndpointError` when the provider answers
    /// with a non-success status or an unusable body, `OAuthError::Http` on
    /// transport failure.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> OAuthResult<TokenGrant> {
        let mut params = vec![
            ("client_id", self.descriptor.client_id.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.descriptor.redirect_uri.as_str()),
        ];
        if let Some(secret) = &self.descriptor.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }
        for (name, value) in &self.descriptor.extra_token_params {
            params.push((name.as_str(), value.as_str()));
        }

        self.post_token_request(&params).await
    }

    /// Refresh an access token using a stored refresh token
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::TokenEndpointError` when the provider answers
    /// with a non-success status or an unusable body, `OAuthError::Http` on
    /// transport failure.
    pub async fn refresh(&self, refresh_token: &str) -> OAuthResult<TokenGrant> {
        let mut params = vec![
            ("client_id", self.descriptor.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = &self.descriptor.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        for (name, value) in &self.descriptor.extra_token_params {
            params.push((name.as_str(), value.as_str()));
        }

        self.post_token_request(&params).await
    }

    /// POST the token endpoint and convert the response into a grant
    async fn post_token_request(&self, params: &[(&str, &str)]) -> OAuthResult<TokenGrant> {
        let response = self
            .client
            .post(&self.descriptor.token_endpoint)
            .form(params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OAuthError::TokenEndpointError {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            OAuthError::TokenEndpointError {
                status: status.as_u16(),
                body: truncate_body(&body),
            }
        })?;
        let parsed: TokenResponse =
            serde_json::from_value(raw.clone()).map_err(|_| OAuthError::TokenEndpointError {
                status: status.as_u16(),
                body: truncate_body(&body),
            })?;

        Ok(token_from_response(parsed, raw))
    }
}

/// Convert a parsed token response into a grant with an absolute expiry
fn token_from_response(response: TokenResponse, raw: serde_json::Value) -> TokenGrant {
    let expires_at = response.expires_in.map(|seconds| {
        Utc::now()
            + Duration::seconds(i64::try_from(seconds).unwrap_or(DEFAULT_TOKEN_EXPIRY_SECONDS))
    });

    TokenGrant {
        access_token: response.access_token,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_owned()),
        expires_at,
        refresh_token: response.refresh_token,
        scope: response.scope,
        raw,
    }
}

/// Bound an upstream body to a loggable size without splitting a code point
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_owned();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} (truncated)", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_LEN);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("(truncated)"));
        assert!(truncated.len() <= MAX_ERROR_BODY_LEN + " (truncated)".len());
    }

    #[test]
    fn short_body_passes_through() {
        assert_eq!(truncate_body("invalid_grant"), "invalid_grant");
    }
}
