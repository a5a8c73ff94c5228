// ABOUTME: Transaction lifecycle engine driving authorization flows end to end
// ABOUTME: Starts transactions, completes code exchanges, and records terminal outcomes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ProviderClient, TokenGrant};
use crate::errors::{OAuthError, OAuthResult};
use crate::models::{OAuthToken, OAuthTransaction, TransactionFailure, TransactionStatus};
use crate::pkce::PkceParams;
use crate::providers::{ProviderDirectory, ProviderHint};
use crate::store::{TokenStore, TransactionStore, TransactionUpdate};

/// Parameters for starting a new authorization transaction
#[derive(Debug, Clone)]
pub struct StartTransactionRequest {
    /// Provider key the transaction runs against
    pub provider_key: String,
    /// User the resulting token belongs to
    pub user_id: Uuid,
    /// MCP server namespace the token is issued for
    pub mcp_namespace: String,
    /// Optional owning organization
    pub organization_id: Option<Uuid>,
    /// Scopes to request; falls back to the provider's configured scopes
    pub scopes: Option<Vec<String>>,
    /// Bootstrap metadata for providers without a static configuration entry
    pub hint: Option<ProviderHint>,
}

impl StartTransactionRequest {
    /// Create a request with the required fields and no optional overrides
    #[must_use]
    pub const fn new(provider_key: String, user_id: Uuid, mcp_namespace: String) -> Self {
        Self {
            provider_key,
            user_id,
            mcp_namespace,
            organization_id: None,
            scopes: None,
            hint: None,
        }
    }
}

/// Orchestrates the authorization-code flow against a provider directory and
/// a persistence backend
pub struct TransactionManager<S> {
    store: Arc<S>,
    directory: Arc<ProviderDirectory>,
}

impl<S> Clone for TransactionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<S> TransactionManager<S>
where
    S: TransactionStore + TokenStore,
{
    /// Create a manager over the given store and provider directory
    #[must_use]
    pub fn new(store: Arc<S>, directory: Arc<ProviderDirectory>) -> Self {
        Self { store, directory }
    }

    /// Start an authorization transaction and persist it as `pending`
    ///
    /// Resolves the provider (bootstrapping it from the hint when unknown),
    /// generates the state and PKCE material, and builds the authorization
    /// URL the end user must be redirected to.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the provider key or namespace is empty,
    /// provider resolution errors (`ProviderNotConfigured`,
    /// `DiscoveryFailed`, `RegistrationRejected`), `MissingCredential` when
    /// the provider has no usable client id, `NoScopesConfigured` when
    /// neither the request nor the provider yields any scope, and `Storage`
    /// when the transaction cannot be persisted.
    pub async fn start_transaction(
        &self,
        request: StartTransactionRequest,
    ) -> OAuthResult<OAuthTransaction> {
        if request.provider_key.is_empty() {
            return Err(OAuthError::Config(
                "provider_key must not be empty".to_owned(),
            ));
        }
        if request.mcp_namespace.is_empty() {
            return Err(OAuthError::Config(
                "mcp_namespace must not be empty".to_owned(),
            ));
        }

        let descriptor = self
            .directory
            .resolve(&request.provider_key, request.hint.as_ref())
            .await?;

        if !descriptor.has_required_credentials() {
            return Err(OAuthError::MissingCredential(request.provider_key));
        }

        let scopes = request
            .scopes
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(|| descriptor.scopes.clone());
        if scopes.is_empty() {
            return Err(OAuthError::NoScopesConfigured(request.provider_key));
        }

        let transaction_id = Uuid::new_v4().to_string();
        let nonce = Uuid::new_v4().simple().to_string();
        let state = format!("{transaction_id}:{nonce}");

        let pkce = descriptor.uses_pkce.then(PkceParams::generate);

        let client = ProviderClient::new(descriptor);
        let authorization_url = client.build_authorization_url(&state, &scopes, pkce.as_ref())?;

        let (code_verifier, code_challenge) = pkce
            .map(|params| (params.code_verifier, params.code_challenge))
            .unzip();

        let now = Utc::now();
        let transaction = OAuthTransaction {
            id: transaction_id,
            user_id: request.user_id,
            organization_id: request.organization_id,
            mcp_namespace: request.mcp_namespace,
            provider_key: request.provider_key,
            status: TransactionStatus::Pending,
            authorization_url,
            code_verifier,
            code_challenge,
            state,
            scopes,
            upstream_metadata: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        self.store
            .create_transaction(&transaction)
            .await
            .map_err(storage)?;

        info!(
            provider = %transaction.provider_key,
            transaction = %transaction.id,
            "Started OAuth transaction"
        );

        Ok(transaction)
    }

    /// Complete a pending transaction by exchanging its authorization code
    ///
    /// Validates the transaction state, performs the token-endpoint exchange,
    /// and atomically claims the `pending` → `authorized` transition before
    /// persisting the token. Exactly one of two racing completions wins.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown transactions, `AlreadyResolved` when
    /// the transaction is no longer pending (no HTTP call is made),
    /// `StateMismatch` when the supplied state does not match,
    /// `TokenEndpointError` when the provider rejects the exchange (the
    /// transaction is then marked `failed`), `Http` on transport failure
    /// (the transaction stays `pending`), and `Storage` on persistence
    /// failure.
    pub async fn complete_transaction(
        &self,
        transaction_id: &str,
        code: &str,
        state: Option<&str>,
    ) -> OAuthResult<OAuthToken> {
        let transaction = self.fetch_required(transaction_id).await?;

        if !transaction.is_pending() {
            return Err(OAuthError::AlreadyResolved(transaction.id));
        }

        if let Some(provided) = state {
            if !states_match(provided, &transaction.state) {
                warn!(
                    provider = %transaction.provider_key,
                    transaction = %transaction.id,
                    security_event = true,
                    "State mismatch on transaction completion"
                );
                return Err(OAuthError::StateMismatch(transaction.id));
            }
        }

        let descriptor = self.directory.resolve(&transaction.provider_key, None).await?;
        let client = ProviderClient::new(descriptor);

        let grant = match client
            .exchange_code(code, transaction.code_verifier.as_deref())
            .await
        {
            Ok(grant) => grant,
            Err(err) => return Err(self.fail_exchange(&transaction, err).await),
        };

        let token = Self::token_record(&transaction, grant);
        let claimed = self.store.store_grant(&token).await.map_err(storage)?;
        if !claimed {
            return Err(OAuthError::AlreadyResolved(transaction.id));
        }

        info!(
            provider = %token.provider_key,
            transaction = %token.transaction_id,
            "Completed OAuth transaction"
        );

        Ok(token)
    }

    /// Complete a transaction identified only by its `state` parameter
    ///
    /// Callback adapters hold the provider's redirect query parameters but
    /// not the transaction id; this wrapper looks the transaction up by
    /// state and delegates to [`Self::complete_transaction`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no transaction carries the state, otherwise
    /// the same errors as [`Self::complete_transaction`].
    pub async fn complete_callback(&self, code: &str, state: &str) -> OAuthResult<OAuthToken> {
        let transaction = self
            .store
            .get_transaction_by_state(state)
            .await
            .map_err(storage)?
            .ok_or_else(|| OAuthError::NotFound(format!("state {state}")))?;

        self.complete_transaction(&transaction.id, code, Some(state))
            .await
    }

    /// Mark a pending transaction as failed with the given reason
    ///
    /// Already-terminal transactions are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown transactions and `Storage` on
    /// persistence failure.
    pub async fn mark_failed(
        &self,
        transaction_id: &str,
        reason: &str,
        details: Option<serde_json::Value>,
    ) -> OAuthResult<OAuthTransaction> {
        let failure = TransactionFailure {
            reason: reason.to_owned(),
            details,
        };
        self.transition(transaction_id, TransactionUpdate::failed(failure))
            .await
    }

    /// Cancel a pending transaction
    ///
    /// No provider revocation endpoint is called; the transaction is locally
    /// marked `cancelled`. Already-terminal transactions are returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown transactions and `Storage` on
    /// persistence failure.
    pub async fn revoke(&self, transaction_id: &str) -> OAuthResult<OAuthTransaction> {
        self.transition(transaction_id, TransactionUpdate::cancelled())
            .await
    }

    /// Obtain a fresh access token using a stored refresh token
    ///
    /// Appends a new token record sharing the originating transaction and
    /// ownership; the refreshed-from record is never mutated. When the
    /// provider does not rotate the refresh token the old one is carried
    /// forward on the new record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown token ids, `RefreshUnavailable` when
    /// the token carries no refresh token, `TokenEndpointError` when the
    /// provider rejects the refresh (no record is written), `Http` on
    /// transport failure, and `Storage` on persistence failure.
    pub async fn refresh(&self, token_id: &str) -> OAuthResult<OAuthToken> {
        let current = self
            .store
            .get_token(token_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| OAuthError::NotFound(format!("token {token_id}")))?;

        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| OAuthError::RefreshUnavailable(token_id.to_owned()))?;

        let descriptor = self.directory.resolve(&current.provider_key, None).await?;
        let client = ProviderClient::new(descriptor);
        let grant = client.refresh(&refresh_token).await?;

        let renewed = OAuthToken {
            id: Uuid::new_v4().to_string(),
            transaction_id: current.transaction_id,
            user_id: current.user_id,
            organization_id: current.organization_id,
            mcp_namespace: current.mcp_namespace,
            provider_key: current.provider_key,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(Some(refresh_token)),
            token_type: grant.token_type,
            scope: grant.scope.unwrap_or(current.scope),
            expires_at: grant.expires_at,
            issued_at: Utc::now(),
            upstream_response: Some(grant.raw),
        };

        self.store.create_token(&renewed).await.map_err(storage)?;

        info!(
            provider = %renewed.provider_key,
            transaction = %renewed.transaction_id,
            "Refreshed OAuth token"
        );

        Ok(renewed)
    }

    /// Record a token-endpoint rejection on the transaction before surfacing it
    ///
    /// Only applies to provider rejections carrying an HTTP status; transport
    /// failures leave the transaction `pending` so the caller may retry.
    async fn fail_exchange(&self, transaction: &OAuthTransaction, err: OAuthError) -> OAuthError {
        if let OAuthError::TokenEndpointError { status, body } = &err {
            let failure = TransactionFailure {
                reason: format!("Token endpoint returned {status}"),
                details: Some(json!({ "status": status, "body": body })),
            };
            let update = TransactionUpdate::failed(failure);
            match self.store.update_transaction(&transaction.id, &update).await {
                Ok(true) => {
                    warn!(
                        provider = %transaction.provider_key,
                        transaction = %transaction.id,
                        "Marked transaction failed after token endpoint rejection"
                    );
                }
                Ok(false) => {
                    debug!(
                        transaction = %transaction.id,
                        "Transaction resolved concurrently; rejection not recorded"
                    );
                }
                Err(store_err) => {
                    warn!(
                        transaction = %transaction.id,
                        "Could not record token endpoint rejection: {store_err}"
                    );
                }
            }
        }
        err
    }

    /// Apply a terminal transition to a pending transaction
    async fn transition(
        &self,
        transaction_id: &str,
        update: TransactionUpdate,
    ) -> OAuthResult<OAuthTransaction> {
        let transaction = self.fetch_required(transaction_id).await?;
        if transaction.status.is_terminal() {
            return Ok(transaction);
        }

        let applied = self
            .store
            .update_transaction(transaction_id, &update)
            .await
            .map_err(storage)?;
        if applied {
            info!(
                transaction = %transaction_id,
                status = %update.status,
                "OAuth transaction transitioned"
            );
        } else {
            debug!(
                transaction = %transaction_id,
                "Transaction resolved concurrently; transition skipped"
            );
        }

        self.fetch_required(transaction_id).await
    }

    async fn fetch_required(&self, transaction_id: &str) -> OAuthResult<OAuthTransaction> {
        self.store
            .get_transaction(transaction_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| OAuthError::NotFound(format!("transaction {transaction_id}")))
    }

    /// Build the token record persisted when a completion wins its claim
    fn token_record(transaction: &OAuthTransaction, grant: TokenGrant) -> OAuthToken {
        OAuthToken {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction.id.clone(),
            user_id: transaction.user_id,
            organization_id: transaction.organization_id,
            mcp_namespace: transaction.mcp_namespace.clone(),
            provider_key: transaction.provider_key.clone(),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            scope: grant.scope.unwrap_or_else(|| transaction.scopes.join(" ")),
            expires_at: grant.expires_at,
            issued_at: Utc::now(),
            upstream_response: Some(grant.raw),
        }
    }
}

/// Map a store failure into the engine error type
fn storage(err: anyhow::Error) -> OAuthError {
    OAuthError::Storage(err.to_string())
}

/// Compare a caller-supplied state against the stored one in constant time
fn states_match(provided: &str, stored: &str) -> bool {
    bool::from(provided.as_bytes().ct_eq(stored.as_bytes()))
}
