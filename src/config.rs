// ABOUTME: Provider configuration document parsing and engine-wide settings
// ABOUTME: Resolves credentials from inline values or environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{env_keys, registration};
use crate::errors::{OAuthError, OAuthResult};

const fn default_uses_pkce() -> bool {
    true
}

/// One named provider entry as written in the configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Human-readable provider name
    pub display_name: Option<String>,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Redirect URI template; `${BASE_URL}` expands to the engine base URL
    pub redirect_uri: Option<String>,
    /// Default scopes requested when the caller supplies none
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Inline OAuth client ID
    pub client_id: Option<String>,
    /// Environment variable holding the client ID
    pub client_id_env: Option<String>,
    /// Inline OAuth client secret
    pub client_secret: Option<String>,
    /// Environment variable holding the client secret
    pub client_secret_env: Option<String>,
    /// Audience parameter forwarded to the authorize call
    pub audience: Option<String>,
    /// Access type parameter (e.g. "offline" for Google refresh tokens)
    pub access_type: Option<String>,
    /// Prompt parameter forwarded to the authorize call
    pub prompt: Option<String>,
    /// Whether the provider uses PKCE (defaults to true)
    #[serde(default = "default_uses_pkce")]
    pub uses_pkce: bool,
    /// Free-form extra query parameters for the authorize call
    #[serde(default)]
    pub extra_authorize_params: HashMap<String, String>,
    /// Free-form extra form parameters for the token call
    #[serde(default)]
    pub extra_token_params: HashMap<String, String>,
}

impl ProviderEntry {
    /// Resolve the client ID from the inline value or named environment variable
    ///
    /// PKCE providers may omit the client ID entirely; starting a transaction
    /// against such an entry fails later with `MissingCredential`.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::MissingCredential` when a named environment
    /// variable is unset.
    pub fn resolve_client_id(&self, provider_key: &str) -> OAuthResult<String> {
        if let Some(id) = &self.client_id {
            if !id.is_empty() {
                return Ok(id.clone());
            }
        }
        if let Some(env_key) = &self.client_id_env {
            return env::var(env_key).map_err(|_| {
                OAuthError::MissingCredential(format!("{provider_key} ({env_key} is unset)"))
            });
        }
        Ok(String::new())
    }

    /// Resolve the client secret from the inline value or named environment variable
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::MissingCredential` when a named environment
    /// variable is unset, or when the provider does not use PKCE and no
    /// secret is configured at all.
    pub fn resolve_client_secret(&self, provider_key: &str) -> OAuthResult<Option<String>> {
        if let Some(secret) = &self.client_secret {
            if !secret.is_empty() {
                return Ok(Some(secret.clone()));
            }
        }
        if let Some(env_key) = &self.client_secret_env {
            return env::var(env_key).map(Some).map_err(|_| {
                OAuthError::MissingCredential(format!("{provider_key} ({env_key} is unset)"))
            });
        }
        if self.uses_pkce {
            Ok(None)
        } else {
            Err(OAuthError::MissingCredential(provider_key.to_owned()))
        }
    }

    /// Expand the redirect URI template, defaulting to the engine callback path
    #[must_use]
    pub fn redirect_uri_for(&self, provider_key: &str, base_url: &str) -> String {
        self.redirect_uri.as_ref().map_or_else(
            || format!("{base_url}/oauth/callback/{provider_key}"),
            |template| template.replace("${BASE_URL}", base_url),
        )
    }
}

/// Named map of provider entries parsed from JSON or YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfigDocument {
    /// Provider entries keyed by provider key
    pub providers: HashMap<String, ProviderEntry>,
}

impl ProviderConfigDocument {
    /// Parse a provider configuration document from JSON
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Config` if the document is malformed.
    pub fn from_json_str(raw: &str) -> OAuthResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| OAuthError::Config(format!("Invalid provider configuration JSON: {e}")))
    }

    /// Parse a provider configuration document from YAML
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Config` if the document is malformed.
    pub fn from_yaml_str(raw: &str) -> OAuthResult<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| OAuthError::Config(format!("Invalid provider configuration YAML: {e}")))
    }

    /// Load a provider configuration document from a file, choosing the
    /// parser by extension (`.yaml`/`.yml` or JSON otherwise)
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> OAuthResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OAuthError::Config(format!(
                "Cannot read provider configuration {}: {e}",
                path.display()
            ))
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        }
    }
}

/// Engine-wide settings resolved once at construction
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Externally reachable base URL used to expand redirect templates
    pub base_url: String,
    /// Client name presented during dynamic client registration
    pub client_name: String,
}

impl EngineConfig {
    /// Build engine settings with explicit values
    #[must_use]
    pub const fn new(base_url: String, client_name: String) -> Self {
        Self {
            base_url,
            client_name,
        }
    }

    /// Load engine settings from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: env::var(env_keys::BASE_URL)
                .unwrap_or_else(|_| "http://localhost:8081".to_owned()),
            client_name: env::var(env_keys::CLIENT_NAME)
                .unwrap_or_else(|_| registration::DEFAULT_CLIENT_NAME.to_owned()),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_owned(),
            client_name: registration::DEFAULT_CLIENT_NAME.to_owned(),
        }
    }
}
