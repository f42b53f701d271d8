use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ConversationRepo,
    },
    models::{Conversation, CreateConversation},
};

const CONVERSATION_SELECT: &str = r#"
    SELECT cm.conversation_id, cmo.org_id, cmo.user_id, cm.title, cm.created_at, cm.last_updated_at
    FROM conversation_metadata cm
    JOIN conversation_metadata_org cmo ON cmo.conversation_id = cm.conversation_id
"#;

pub struct SqliteConversationRepo {
    pool: SqlitePool,
}

impl SqliteConversationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn conversation_from_row(row: &SqliteRow) -> DbResult<Conversation> {
        Ok(Conversation {
            id: parse_uuid(&row.get::<String, _>("conversation_id"))?,
            org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            title: row.get("title"),
            created_at: row.get("created_at"),
            last_updated_at: row.get("last_updated_at"),
        })
    }
}

#[async_trait]
impl ConversationRepo for SqliteConversationRepo {
    async fn create(&self, input: CreateConversation) -> DbResult<Conversation> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let last_updated_at = input.last_updated_at.unwrap_or(now);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conversation_metadata (conversation_id, title, created_at, last_updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.title)
        .bind(now)
        .bind(last_updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO conversation_metadata_org (conversation_id, org_id, user_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.org_id.to_string())
        .bind(input.user_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Conversation {
            id,
            org_id: input.org_id,
            user_id: input.user_id,
            title: input.title,
            created_at: now,
            last_updated_at,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Conversation>> {
        let query = format!("{} WHERE cm.conversation_id = ?", CONVERSATION_SELECT);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::conversation_from_row).transpose()
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE conversation_metadata SET last_updated_at = ? WHERE conversation_id = ?",
        )
        .bind(at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn count_by_org(&self, org_id: Uuid) -> DbResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM conversation_metadata_org WHERE org_id = ?",
        )
        .bind(org_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn count(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM conversation_metadata")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn list_expired(
        &self,
        org_id: Uuid,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<Conversation>> {
        let query = format!(
            "{} WHERE cmo.org_id = ? AND cm.last_updated_at < ? \
             ORDER BY cm.last_updated_at ASC LIMIT ?",
            CONVERSATION_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(org_id.to_string())
            .bind(cutoff)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::conversation_from_row).collect()
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;

        let primary = sqlx::query("DELETE FROM conversation_metadata WHERE conversation_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let shadow =
            sqlx::query("DELETE FROM conversation_metadata_org WHERE conversation_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        tx.commit().await?;
        Ok(primary + shadow > 0)
    }
}
