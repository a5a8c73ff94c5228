// ABOUTME: Storage collaborator traits for transaction and token persistence
// ABOUTME: The engine treats implementations as the source of truth for persisted state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Storage traits consumed by the transaction manager and token resolver
//!
//! Implementations own durability and atomicity. The engine never caches
//! persisted state in memory across calls; every operation re-reads through
//! these traits.

/// SQLite-backed implementation of both storage traits
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{OAuthToken, OAuthTransaction, TransactionFailure, TransactionStatus};

pub use sqlite::SqliteStore;

/// Partial update applied when a transaction leaves `pending`
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    /// Terminal status to transition to
    pub status: TransactionStatus,
    /// Failure detail recorded alongside a `Failed` status
    pub error: Option<TransactionFailure>,
}

impl TransactionUpdate {
    /// Update marking a transaction failed with the given reason
    #[must_use]
    pub const fn failed(error: TransactionFailure) -> Self {
        Self {
            status: TransactionStatus::Failed,
            error: Some(error),
        }
    }

    /// Update marking a transaction cancelled
    #[must_use]
    pub const fn cancelled() -> Self {
        Self {
            status: TransactionStatus::Cancelled,
            error: None,
        }
    }
}

/// Persistence operations for authorization transactions
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a newly started transaction
    async fn create_transaction(&self, transaction: &OAuthTransaction) -> Result<()>;

    /// Fetch a transaction by id
    async fn get_transaction(&self, id: &str) -> Result<Option<OAuthTransaction>>;

    /// Fetch a transaction by its state parameter
    async fn get_transaction_by_state(&self, state: &str) -> Result<Option<OAuthTransaction>>;

    /// Conditionally transition a transaction out of `pending`
    ///
    /// Returns `false` without writing anything when the row is no longer
    /// pending; racing writers are serialized by this check.
    async fn update_transaction(&self, id: &str, update: &TransactionUpdate) -> Result<bool>;
}

/// Persistence operations for issued tokens
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Atomically persist a token and finalize its originating transaction
    ///
    /// Flips the transaction named by `token.transaction_id` from `pending`
    /// to `authorized` and inserts the token record as one unit. Returns
    /// `false` without writing anything when the transaction is no longer
    /// pending, so exactly one of two racing completions persists a token.
    async fn store_grant(&self, token: &OAuthToken) -> Result<bool>;

    /// Append a token record without touching any transaction
    ///
    /// Used by refresh, which adds a new record to an already-finalized
    /// transaction's lineage.
    async fn create_token(&self, token: &OAuthToken) -> Result<()>;

    /// Fetch a token by id
    async fn get_token(&self, id: &str) -> Result<Option<OAuthToken>>;

    /// Fetch the most recently issued token matching the given owners
    ///
    /// `user_id` and `organization_id` narrow the match when present. The
    /// caller is responsible for requiring at least one owner scope.
    async fn get_latest_token(
        &self,
        mcp_namespace: &str,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
    ) -> Result<Option<OAuthToken>>;
}
