use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{AuthTokenRepo, LockedTokens},
    },
    models::{StoredTokens, TokenPair},
};

const TOKEN_SELECT: &str = r#"
    SELECT user_id, idp, access_token, refresh_token, access_token_expires_at,
           refresh_token_expires_at, updated_at
    FROM auth_tokens
    WHERE user_id = ? AND idp = ?
"#;

fn tokens_from_row(row: &SqliteRow) -> DbResult<StoredTokens> {
    Ok(StoredTokens {
        user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
        idp: row.get("idp"),
        tokens: TokenPair {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            access_token_expires_at: row.get("access_token_expires_at"),
            refresh_token_expires_at: row.get("refresh_token_expires_at"),
        },
        updated_at: row.get("updated_at"),
    })
}

pub struct SqliteAuthTokenRepo {
    pool: SqlitePool,
}

impl SqliteAuthTokenRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Holds an open write transaction. SQLite has no row locks, so the
/// transaction's RESERVED lock serializes concurrent refreshes instead.
///
/// That lock covers the whole database file, not just this token row: every
/// other writer in the process waits (up to `database.busy_timeout_ms`) until the guard
/// commits or is dropped. Keep the held section short; the provider request
/// made under it is bounded by `OAuthProviderConfig::timeout_secs`.
struct SqliteLockedTokens {
    tx: Transaction<'static, Sqlite>,
    current: StoredTokens,
}

#[async_trait]
impl LockedTokens for SqliteLockedTokens {
    fn current(&self) -> &StoredTokens {
        &self.current
    }

    async fn store(mut self: Box<Self>, tokens: &TokenPair) -> DbResult<StoredTokens> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE auth_tokens
            SET access_token = ?, refresh_token = ?, access_token_expires_at = ?,
                refresh_token_expires_at = ?, updated_at = ?
            WHERE user_id = ? AND idp = ?
            "#,
        )
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.access_token_expires_at)
        .bind(tokens.refresh_token_expires_at)
        .bind(now)
        .bind(self.current.user_id.to_string())
        .bind(&self.current.idp)
        .execute(&mut *self.tx)
        .await?;

        let Self { tx, current } = *self;
        tx.commit().await?;

        Ok(StoredTokens {
            tokens: tokens.clone(),
            updated_at: now,
            ..current
        })
    }

    async fn release(self: Box<Self>) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl AuthTokenRepo for SqliteAuthTokenRepo {
    async fn get(&self, user_id: Uuid, idp: &str) -> DbResult<Option<StoredTokens>> {
        let row = sqlx::query(TOKEN_SELECT)
            .bind(user_id.to_string())
            .bind(idp)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(tokens_from_row).transpose()
    }

    async fn upsert(
        &self,
        user_id: Uuid,
        idp: &str,
        tokens: &TokenPair,
    ) -> DbResult<StoredTokens> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO auth_tokens (
                user_id, idp, access_token, refresh_token,
                access_token_expires_at, refresh_token_expires_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, idp) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                access_token_expires_at = excluded.access_token_expires_at,
                refresh_token_expires_at = excluded.refresh_token_expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id.to_string())
        .bind(idp)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.access_token_expires_at)
        .bind(tokens.refresh_token_expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(StoredTokens {
            user_id,
            idp: idp.to_string(),
            tokens: tokens.clone(),
            updated_at: now,
        })
    }

    async fn lock(&self, user_id: Uuid, idp: &str) -> DbResult<Option<Box<dyn LockedTokens>>> {
        let mut tx = self.pool.begin().await?;

        // A no-op write upgrades the deferred transaction to a write lock
        let locked = sqlx::query("UPDATE auth_tokens SET id = id WHERE user_id = ? AND idp = ?")
            .bind(user_id.to_string())
            .bind(idp)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if locked == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(TOKEN_SELECT)
            .bind(user_id.to_string())
            .bind(idp)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;
        let current = tokens_from_row(&row)?;

        Ok(Some(Box::new(SqliteLockedTokens { tx, current })))
    }
}
