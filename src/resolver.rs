// ABOUTME: Read-side token resolution for MCP connection builders
// ABOUTME: Returns the most recent token for a namespace scoped to a user or organization
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::errors::{OAuthError, OAuthResult};
use crate::models::OAuthToken;
use crate::store::TokenStore;

/// Resolves the current token for an MCP namespace
///
/// A pure read over the token store; refreshing an expired token is a
/// separate explicit operation on the transaction manager.
pub struct TokenResolver<S> {
    store: Arc<S>,
}

impl<S> Clone for TokenResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> TokenResolver<S>
where
    S: TokenStore,
{
    /// Create a resolver over the given token store
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Return the most recently issued token for the namespace
    ///
    /// Tokens scoped to the user take precedence over tokens scoped to the
    /// organization. `Ok(None)` means no token exists and the caller must
    /// start a new authorization flow; it is not a fault.
    ///
    /// # Errors
    ///
    /// Returns `ScopeRequired` when neither a user nor an organization is
    /// supplied (a namespace-only lookup would leak another principal's
    /// token) and `Storage` when the store query fails.
    pub async fn latest(
        &self,
        mcp_namespace: &str,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
    ) -> OAuthResult<Option<OAuthToken>> {
        if user_id.is_none() && organization_id.is_none() {
            return Err(OAuthError::ScopeRequired);
        }

        if let Some(user) = user_id {
            let token = self
                .store
                .get_latest_token(mcp_namespace, Some(user), None)
                .await
                .map_err(|e| OAuthError::Storage(e.to_string()))?;
            if token.is_some() {
                return Ok(token);
            }
            debug!(
                namespace = %mcp_namespace,
                user = %user,
                "No user-scoped token; falling back to organization scope"
            );
        }

        if let Some(org) = organization_id {
            return self
                .store
                .get_latest_token(mcp_namespace, None, Some(org))
                .await
                .map_err(|e| OAuthError::Storage(e.to_string()));
        }

        Ok(None)
    }
}
