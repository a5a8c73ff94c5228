// ABOUTME: SQLite-backed implementation of the transaction and token stores
// ABOUTME: Raw sqlx queries with a conditional status update guarding completion races
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{TokenStore, TransactionStore, TransactionUpdate};
use crate::models::{OAuthToken, OAuthTransaction, TransactionFailure, TransactionStatus};

/// SQLite store for transactions and tokens
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open a store at the given database URL, creating the file if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema migration fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory store
    ///
    /// A single pooled connection keeps every caller on the same in-memory
    /// database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema migration fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        self.migrate_transactions().await?;
        self.migrate_tokens().await?;
        Ok(())
    }

    /// Create the `oauth_transactions` table
    async fn migrate_transactions(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                organization_id TEXT,
                mcp_namespace TEXT NOT NULL,
                provider_key TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                authorization_url TEXT NOT NULL,
                code_verifier TEXT,
                code_challenge TEXT,
                state TEXT NOT NULL UNIQUE,
                scopes TEXT NOT NULL,
                upstream_metadata TEXT,
                error TEXT,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                completed_at DATETIME
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create the `oauth_tokens` table and its lookup indexes
    async fn migrate_tokens(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                id TEXT PRIMARY KEY,
                transaction_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                organization_id TEXT,
                mcp_namespace TEXT NOT NULL,
                provider_key TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                token_type TEXT NOT NULL DEFAULT 'Bearer',
                scope TEXT NOT NULL,
                expires_at DATETIME,
                issued_at DATETIME NOT NULL,
                upstream_response TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_tokens_user_latest \
             ON oauth_tokens(mcp_namespace, user_id, issued_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_tokens_org_latest \
             ON oauth_tokens(mcp_namespace, organization_id, issued_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convert a database row to an `OAuthTransaction`
    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthTransaction> {
        let user_id_str: String = row.get("user_id");
        let status_str: String = row.get("status");
        let scopes_str: String = row.get("scopes");

        Ok(OAuthTransaction {
            id: row.get("id"),
            user_id: Uuid::parse_str(&user_id_str)?,
            organization_id: row
                .get::<Option<String>, _>("organization_id")
                .map(|s| Uuid::parse_str(&s))
                .transpose()?,
            mcp_namespace: row.get("mcp_namespace"),
            provider_key: row.get("provider_key"),
            status: TransactionStatus::from_str_value(&status_str)?,
            authorization_url: row.get("authorization_url"),
            code_verifier: row.get("code_verifier"),
            code_challenge: row.get("code_challenge"),
            state: row.get("state"),
            scopes: scopes_str.split_whitespace().map(str::to_owned).collect(),
            upstream_metadata: row
                .get::<Option<String>, _>("upstream_metadata")
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
            error: row
                .get::<Option<String>, _>("error")
                .map(|raw| serde_json::from_str::<TransactionFailure>(&raw))
                .transpose()?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
        })
    }

    /// Convert a database row to an `OAuthToken`
    fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthToken> {
        let user_id_str: String = row.get("user_id");

        Ok(OAuthToken {
            id: row.get("id"),
            transaction_id: row.get("transaction_id"),
            user_id: Uuid::parse_str(&user_id_str)?,
            organization_id: row
                .get::<Option<String>, _>("organization_id")
                .map(|s| Uuid::parse_str(&s))
                .transpose()?,
            mcp_namespace: row.get("mcp_namespace"),
            provider_key: row.get("provider_key"),
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            token_type: row.get("token_type"),
            scope: row.get("scope"),
            expires_at: row.get("expires_at"),
            issued_at: row.get("issued_at"),
            upstream_response: row
                .get::<Option<String>, _>("upstream_response")
                .map(|raw| serde_json::from_str(&raw))
                .transpose()?,
        })
    }

    /// Insert a token row inside the given executor
    async fn insert_token<'e, E>(executor: E, token: &OAuthToken) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r"
            INSERT INTO oauth_tokens (
                id, transaction_id, user_id, organization_id, mcp_namespace,
                provider_key, access_token, refresh_token, token_type, scope,
                expires_at, issued_at, upstream_response
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(&token.id)
        .bind(&token.transaction_id)
        .bind(token.user_id.to_string())
        .bind(token.organization_id.map(|id| id.to_string()))
        .bind(&token.mcp_namespace)
        .bind(&token.provider_key)
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(&token.token_type)
        .bind(&token.scope)
        .bind(token.expires_at)
        .bind(token.issued_at)
        .bind(
            token
                .upstream_response
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn create_transaction(&self, transaction: &OAuthTransaction) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_transactions (
                id, user_id, organization_id, mcp_namespace, provider_key,
                status, authorization_url, code_verifier, code_challenge, state,
                scopes, upstream_metadata, error, created_at, updated_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ",
        )
        .bind(&transaction.id)
        .bind(transaction.user_id.to_string())
        .bind(transaction.organization_id.map(|id| id.to_string()))
        .bind(&transaction.mcp_namespace)
        .bind(&transaction.provider_key)
        .bind(transaction.status.as_str())
        .bind(&transaction.authorization_url)
        .bind(&transaction.code_verifier)
        .bind(&transaction.code_challenge)
        .bind(&transaction.state)
        .bind(transaction.scopes.join(" "))
        .bind(
            transaction
                .upstream_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            transaction
                .error
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .bind(transaction.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<OAuthTransaction>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, organization_id, mcp_namespace, provider_key,
                   status, authorization_url, code_verifier, code_challenge, state,
                   scopes, upstream_metadata, error, created_at, updated_at, completed_at
            FROM oauth_transactions
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(Self::row_to_transaction(&row)?)))
    }

    async fn get_transaction_by_state(&self, state: &str) -> Result<Option<OAuthTransaction>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, organization_id, mcp_namespace, provider_key,
                   status, authorization_url, code_verifier, code_challenge, state,
                   scopes, upstream_metadata, error, created_at, updated_at, completed_at
            FROM oauth_transactions
            WHERE state = $1
            ",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(Self::row_to_transaction(&row)?)))
    }

    async fn update_transaction(&self, id: &str, update: &TransactionUpdate) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE oauth_transactions
            SET status = $2, error = $3, updated_at = $4, completed_at = $4
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(
            update
                .error
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn store_grant(&self, token: &OAuthToken) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r"
            UPDATE oauth_transactions
            SET status = $2, updated_at = $3, completed_at = $3
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(&token.transaction_id)
        .bind(TransactionStatus::Authorized.as_str())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_token(&mut *tx, token).await?;
        tx.commit().await?;

        Ok(true)
    }

    async fn create_token(&self, token: &OAuthToken) -> Result<()> {
        Self::insert_token(&self.pool, token).await
    }

    async fn get_token(&self, id: &str) -> Result<Option<OAuthToken>> {
        let row = sqlx::query(
            r"
            SELECT id, transaction_id, user_id, organization_id, mcp_namespace,
                   provider_key, access_token, refresh_token, token_type, scope,
                   expires_at, issued_at, upstream_response
            FROM oauth_tokens
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map_or_else(|| Ok(None), |row| Ok(Some(Self::row_to_token(&row)?)))
    }

    async fn get_latest_token(
        &self,
        mcp_namespace: &str,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
    ) -> Result<Option<OAuthToken>> {
        let row = match (user_id, organization_id) {
            (Some(user), Some(org)) => {
                sqlx::query(
                    r"
                    SELECT id, transaction_id, user_id, organization_id, mcp_namespace,
                           provider_key, access_token, refresh_token, token_type, scope,
                           expires_at, issued_at, upstream_response
                    FROM oauth_tokens
                    WHERE mcp_namespace = $1 AND user_id = $2 AND organization_id = $3
                    ORDER BY issued_at DESC
                    LIMIT 1
                    ",
                )
                .bind(mcp_namespace)
                .bind(user.to_string())
                .bind(org.to_string())
                .fetch_optional(&self.pool)
                .await?
            }
            (Some(user), None) => {
                sqlx::query(
                    r"
                    SELECT id, transaction_id, user_id, organization_id, mcp_namespace,
                           provider_key, access_token, refresh_token, token_type, scope,
                           expires_at, issued_at, upstream_response
                    FROM oauth_tokens
                    WHERE mcp_namespace = $1 AND user_id = $2
                    ORDER BY issued_at DESC
                    LIMIT 1
                    ",
                )
                .bind(mcp_namespace)
                .bind(user.to_string())
                .fetch_optional(&self.pool)
                .await?
            }
            (None, Some(org)) => {
                sqlx::query(
                    r"
                    SELECT id, transaction_id, user_id, organization_id, mcp_namespace,
                           provider_key, access_token, refresh_token, token_type, scope,
                           expires_at, issued_at, upstream_response
                    FROM oauth_tokens
                    WHERE mcp_namespace = $1 AND organization_id = $2
                    ORDER BY issued_at DESC
                    LIMIT 1
                    ",
                )
                .bind(mcp_namespace)
                .bind(org.to_string())
                .fetch_optional(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query(
                    r"
                    SELECT id, transaction_id, user_id, organization_id, mcp_namespace,
                           provider_key, access_token, refresh_token, token_type, scope,
                           expires_at, issued_at, upstream_response
                    FROM oauth_tokens
                    WHERE mcp_namespace = $1
                    ORDER BY issued_at DESC
                    LIMIT 1
                    ",
                )
                .bind(mcp_namespace)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map_or_else(|| Ok(None), |row| Ok(Some(Self::row_to_token(&row)?)))
    }
}
