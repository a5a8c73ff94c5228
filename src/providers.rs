// ABOUTME: Provider directory resolving provider keys to descriptors
// ABOUTME: Static configuration load plus dynamic bootstrap via discovery and registration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, ProviderConfigDocument};
use crate::constants::{discovery as discovery_constants, registration};
use crate::discovery::{self, RegistrationRequest, ServerMetadata};
use crate::errors::{OAuthError, OAuthResult};
use crate::utils::http_client::discovery_client;

/// Fully resolved provider description used to drive authorization flows
///
/// Descriptors are immutable once created. When a dynamic client's
/// credentials change, a fresh descriptor replaces the cached one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Stable provider identifier (github, google, etc.)
    pub key: String,
    /// Human-readable provider name
    pub display_name: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
    /// Redirect URI, fully expanded
    pub redirect_uri: String,
    /// Scopes requested when the caller supplies none
    pub scopes: Vec<String>,
    /// OAuth client ID; empty when the entry omitted one
    pub client_id: String,
    /// OAuth client secret, absent for public PKCE clients
    pub client_secret: Option<String>,
    /// Audience parameter forwarded to the authorize call
    pub audience: Option<String>,
    /// Access type parameter forwarded to the authorize call
    pub access_type: Option<String>,
    /// Prompt parameter forwarded to the authorize call
    pub prompt: Option<String>,
    /// Whether authorization uses PKCE
    pub uses_pkce: bool,
    /// Free-form extra query parameters for the authorize call
    pub extra_authorize_params: HashMap<String, String>,
    /// Free-form extra form parameters for the token call
    pub extra_token_params: HashMap<String, String>,
}

impl ProviderDescriptor {
    /// Whether the descriptor carries the credentials its flow needs
    ///
    /// PKCE flows need a registered client id; client-secret flows need both.
    #[must_use]
    pub fn has_required_credentials(&self) -> bool {
        if self.client_id.is_empty() {
            return false;
        }
        self.uses_pkce || self.client_secret.is_some()
    }
}

/// Scopes supplied either as a list or as one space-delimited string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopesHint {
    /// Scopes as a list of strings
    List(Vec<String>),
    /// Scopes as a single space-delimited string
    Joined(String),
}

impl ScopesHint {
    /// Normalize to a list of individual scopes
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::List(scopes) => scopes.clone(),
            Self::Joined(joined) => joined.split_whitespace().map(str::to_owned).collect(),
        }
    }
}

/// Caller-supplied metadata used to bootstrap an unknown provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderHint {
    /// Explicit authorization server metadata URL
    pub metadata_url: Option<String>,
    /// Issuer to derive well-known metadata URLs from
    pub issuer: Option<String>,
    /// Authorization endpoint fallback when the metadata document omits it
    pub authorization_endpoint: Option<String>,
    /// Token endpoint fallback when the metadata document omits it
    pub token_endpoint: Option<String>,
    /// Registration endpoint fallback when the metadata document omits it
    pub registration_endpoint: Option<String>,
    /// Scopes to request, as a list or space-delimited string
    pub scopes: Option<ScopesHint>,
}

impl ProviderHint {
    /// Candidate discovery URLs in probe order
    #[must_use]
    pub fn discovery_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(url) = &self.metadata_url {
            candidates.push(url.clone());
        }
        if let Some(issuer) = &self.issuer {
            let base = issuer.trim_end_matches('/');
            for path in discovery_constants::WELL_KNOWN_PATHS {
                candidates.push(format!("{base}{path}"));
            }
        }
        candidates
    }

    /// Hinted scopes, normalized to a list
    #[must_use]
    pub fn hinted_scopes(&self) -> Vec<String> {
        self.scopes.as_ref().map(ScopesHint::to_vec).unwrap_or_default()
    }
}

/// Resolves provider keys to descriptors
///
/// Static descriptors come from the configuration document at construction.
/// Unknown keys are bootstrapped on first use via metadata discovery and
/// dynamic client registration, then cached in memory for the remainder of
/// the process lifetime. Two callers racing to bootstrap the same key both
/// succeed; last write wins and the descriptors are functionally equivalent.
#[derive(Debug)]
pub struct ProviderDirectory {
    engine: EngineConfig,
    static_providers: HashMap<String, ProviderDescriptor>,
    dynamic_providers: DashMap<String, ProviderDescriptor>,
}

impl ProviderDirectory {
    /// Build a directory from a parsed configuration document
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::MissingCredential` when an entry names an unset
    /// environment variable, or omits a client secret for a flow without
    /// PKCE. Returns `OAuthError::Config` when an entry has empty endpoints.
    pub fn load(document: &ProviderConfigDocument, engine: EngineConfig) -> OAuthResult<Self> {
        let mut static_providers = HashMap::new();
        for (key, entry) in &document.providers {
            if entry.authorization_endpoint.is_empty() || entry.token_endpoint.is_empty() {
                return Err(OAuthError::Config(format!(
                    "Provider {key} has empty authorization or token endpoint"
                )));
            }
            let descriptor = ProviderDescriptor {
                key: key.clone(),
                display_name: entry.display_name.clone().unwrap_or_else(|| key.clone()),
                authorization_endpoint: entry.authorization_endpoint.clone(),
                token_endpoint: entry.token_endpoint.clone(),
                redirect_uri: entry.redirect_uri_for(key, &engine.base_url),
                scopes: entry.scopes.clone(),
                client_id: entry.resolve_client_id(key)?,
                client_secret: entry.resolve_client_secret(key)?,
                audience: entry.audience.clone(),
                access_type: entry.access_type.clone(),
                prompt: entry.prompt.clone(),
                uses_pkce: entry.uses_pkce,
                extra_authorize_params: entry.extra_authorize_params.clone(),
                extra_token_params: entry.extra_token_params.clone(),
            };
            static_providers.insert(key.clone(), descriptor);
        }
        info!("Loaded {} static OAuth provider(s)", static_providers.len());
        Ok(Self {
            engine,
            static_providers,
            dynamic_providers: DashMap::new(),
        })
    }

    /// Build an empty directory that only serves dynamically bootstrapped providers
    #[must_use]
    pub fn empty(engine: EngineConfig) -> Self {
        Self {
            engine,
            static_providers: HashMap::new(),
            dynamic_providers: DashMap::new(),
        }
    }

    /// Whether a static or cached dynamic descriptor exists for this key
    #[must_use]
    pub fn contains(&self, provider_key: &str) -> bool {
        self.static_providers.contains_key(provider_key)
            || self.dynamic_providers.contains_key(provider_key)
    }

    /// Resolve a provider key to a descriptor
    ///
    /// Known keys return the static or cached descriptor. Unknown keys are
    /// bootstrapped from the hint metadata; the resulting descriptor is
    /// cached only on full success.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::ProviderNotConfigured` when the key is unknown
    /// and the hint carries nothing to bootstrap from,
    /// `OAuthError::DiscoveryFailed` when no candidate URL yields a usable
    /// metadata document, and `OAuthError::RegistrationRejected` when the
    /// server refuses the client registration.
    pub async fn resolve(
        &self,
        provider_key: &str,
        hint: Option<&ProviderHint>,
    ) -> OAuthResult<ProviderDescriptor> {
        if let Some(descriptor) = self.static_providers.get(provider_key) {
            return Ok(descriptor.clone());
        }
        if let Some(descriptor) = self.dynamic_providers.get(provider_key) {
            return Ok(descriptor.value().clone());
        }

        let hint = hint.ok_or_else(|| {
            OAuthError::ProviderNotConfigured(format!(
                "{provider_key} has no static entry and no hint metadata"
            ))
        })?;
        let descriptor = self.bootstrap(provider_key, hint).await?;
        self.dynamic_providers
            .insert(provider_key.to_owned(), descriptor.clone());
        info!(
            "Bootstrapped OAuth provider {provider_key} (client_id={})",
            descriptor.client_id
        );
        Ok(descriptor)
    }

    /// Discover metadata, register a client, and assemble a descriptor
    async fn bootstrap(
        &self,
        provider_key: &str,
        hint: &ProviderHint,
    ) -> OAuthResult<ProviderDescriptor> {
        let candidates = hint.discovery_candidates();
        if candidates.is_empty() {
            return Err(OAuthError::ProviderNotConfigured(format!(
                "{provider_key} hint carries neither a metadata URL nor an issuer"
            )));
        }

        let client = discovery_client();
        let metadata = fetch_first_metadata(&client, provider_key, &candidates).await?;
        let endpoints = ResolvedEndpoints::merge(provider_key, &metadata, hint)?;

        let mut scopes = hint.hinted_scopes();
        if scopes.is_empty() {
            scopes.clone_from(&metadata.scopes_supported);
        }
        if scopes.is_empty() {
            scopes = vec![registration::FALLBACK_SCOPE.to_owned()];
        }

        let redirect_uri = format!("{}/oauth/callback/{provider_key}", self.engine.base_url);
        let request =
            RegistrationRequest::public_client(&self.engine.client_name, &redirect_uri, &scopes);
        let registered =
            discovery::register_client(&client, &endpoints.registration_endpoint, &request).await?;

        Ok(ProviderDescriptor {
            key: provider_key.to_owned(),
            display_name: provider_key.to_owned(),
            authorization_endpoint: endpoints.authorization_endpoint,
            token_endpoint: endpoints.token_endpoint,
            redirect_uri,
            scopes,
            client_id: registered.client_id,
            client_secret: registered.client_secret,
            audience: None,
            access_type: None,
            prompt: None,
            uses_pkce: true,
            extra_authorize_params: HashMap::new(),
            extra_token_params: HashMap::new(),
        })
    }
}

/// The three endpoints a bootstrapped provider must expose
struct ResolvedEndpoints {
    authorization_endpoint: String,
    token_endpoint: String,
    registration_endpoint: String,
}

impl ResolvedEndpoints {
    /// Merge metadata document values with hint fallbacks
    ///
    /// Document values take precedence. A missing endpoint after merging
    /// fails resolution outright; no partial descriptor is created.
    fn merge(
        provider_key: &str,
        metadata: &ServerMetadata,
        hint: &ProviderHint,
    ) -> OAuthResult<Self> {
        let authorization_endpoint = metadata
            .authorization_endpoint
            .clone()
            .or_else(|| hint.authorization_endpoint.clone());
        let token_endpoint = metadata
            .token_endpoint
            .clone()
            .or_else(|| hint.token_endpoint.clone());
        let registration_endpoint = metadata
            .registration_endpoint
            .clone()
            .or_else(|| hint.registration_endpoint.clone());

        match (authorization_endpoint, token_endpoint, registration_endpoint) {
            (Some(authorization_endpoint), Some(token_endpoint), Some(registration_endpoint)) => {
                Ok(Self {
                    authorization_endpoint,
                    token_endpoint,
                    registration_endpoint,
                })
            }
            (authorize, token, register) => {
                let mut missing = Vec::new();
                if authorize.is_none() {
                    missing.push("authorization_endpoint");
                }
                if token.is_none() {
                    missing.push("token_endpoint");
                }
                if register.is_none() {
                    missing.push("registration_endpoint");
                }
                Err(OAuthError::DiscoveryFailed(format!(
                    "{provider_key} metadata missing {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Fetch the first candidate metadata document that responds successfully
async fn fetch_first_metadata(
    client: &reqwest::Client,
    provider_key: &str,
    candidates: &[String],
) -> OAuthResult<ServerMetadata> {
    for url in candidates {
        match discovery::fetch_server_metadata(client, url).await {
            Ok(metadata) => {
                debug!("Discovered authorization server metadata for {provider_key} at {url}");
                return Ok(metadata);
            }
            Err(e) => {
                warn!("Discovery candidate {url} failed for {provider_key}: {e}");
            }
        }
    }
    Err(OAuthError::DiscoveryFailed(format!(
        "No discovery URL reachable for {provider_key}"
    )))
}
