// ABOUTME: Core data records for authorization transactions and stored tokens
// ABOUTME: OAuthTransaction, OAuthToken, TransactionStatus, and failure detail types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::tokens::EXPIRY_REFRESH_WINDOW_SECONDS;
use crate::errors::{OAuthError, OAuthResult};

/// Lifecycle status of an authorization transaction
///
/// `Pending` is the only non-terminal status. Terminal transactions never
/// transition again; late callbacks against them are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Waiting for the end user to complete authorization upstream
    Pending,
    /// Authorization code exchanged and token persisted
    Authorized,
    /// Callback validation or token exchange failed
    Failed,
    /// Explicitly revoked before completion
    Cancelled,
}

impl TransactionStatus {
    /// Convert from database string representation
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::Storage` if the string is not a valid status.
    pub fn from_str_value(s: &str) -> OAuthResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "authorized" => Ok(Self::Authorized),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OAuthError::Storage(format!(
                "Unknown transaction status: {other}"
            ))),
        }
    }

    /// Convert to database string representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status permits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail recorded on a transaction that reached `Failed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionFailure {
    /// Short machine-readable reason
    pub reason: String,
    /// Structured detail, e.g. the upstream status and response body
    pub details: Option<serde_json::Value>,
}

/// One authorization attempt against an upstream provider
///
/// Created by `start_transaction`, mutated exactly once by completion,
/// failure, or revocation. Records are never deleted by the engine;
/// retention is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTransaction {
    /// Unique identifier for this transaction record
    pub id: String,
    /// User who initiated the authorization
    pub user_id: Uuid,
    /// Organization scope, when the grant is organization-wide
    pub organization_id: Option<Uuid>,
    /// Logical identifier of the tool server being authorized
    pub mcp_namespace: String,
    /// Provider key (github, google, etc.)
    pub provider_key: String,
    /// Current lifecycle status
    pub status: TransactionStatus,
    /// URL the end user was sent to
    pub authorization_url: String,
    /// PKCE code verifier, present exactly when the provider uses PKCE
    pub code_verifier: Option<String>,
    /// PKCE code challenge sent upstream
    pub code_challenge: Option<String>,
    /// Opaque state parameter bound to this transaction
    pub state: String,
    /// Scopes the authorization was requested for
    pub scopes: Vec<String>,
    /// Opaque provider detail captured at start, e.g. the redirect base in effect
    pub upstream_metadata: Option<serde_json::Value>,
    /// Failure detail, set only when status is `Failed`
    pub error: Option<TransactionFailure>,
    /// When this transaction was created
    pub created_at: DateTime<Utc>,
    /// When this transaction was last updated
    pub updated_at: DateTime<Utc>,
    /// When this transaction reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl OAuthTransaction {
    /// Whether the transaction still accepts a callback
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, TransactionStatus::Pending)
    }
}

/// One successful grant produced by a completed transaction
///
/// Completion and refresh both append new records rather than updating in
/// place; the resolver always picks the most recently issued record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Unique identifier for this token record
    pub id: String,
    /// Transaction that produced this token
    pub transaction_id: String,
    /// User who owns this token
    pub user_id: Uuid,
    /// Organization scope copied from the originating transaction
    pub organization_id: Option<Uuid>,
    /// Logical identifier of the tool server the token belongs to
    pub mcp_namespace: String,
    /// Provider key (github, google, etc.)
    pub provider_key: String,
    /// OAuth access token
    pub access_token: String,
    /// OAuth refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// Token type (usually "Bearer")
    pub token_type: String,
    /// Space-joined scopes actually granted
    pub scope: String,
    /// When the access token expires; absent means unknown or non-expiring
    pub expires_at: Option<DateTime<Utc>>,
    /// When this token was issued
    pub issued_at: DateTime<Utc>,
    /// Raw provider response stored for audit
    pub upstream_response: Option<serde_json::Value>,
}

impl OAuthToken {
    /// Check if the access token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() > expires_at)
    }

    /// Check if the token expires within the refresh window
    #[must_use]
    pub fn expires_soon(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            let threshold = Utc::now() + chrono::Duration::seconds(EXPIRY_REFRESH_WINDOW_SECONDS);
            threshold >= expires_at
        })
    }
}
