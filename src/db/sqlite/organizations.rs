use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::OrganizationRepo,
    },
    models::{CreateOrganization, OrgRole, Organization, UpdateOrganization},
};

const ORG_COLUMNS: &str = "id, name, contact_name, contact_email, conversation_expiration, \
     inactive_user_retention_days, inactive_user_grace_period_days, created_at, updated_at";

pub struct SqliteOrganizationRepo {
    pool: SqlitePool,
}

impl SqliteOrganizationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn org_from_row(row: &SqliteRow) -> DbResult<Organization> {
        Ok(Organization {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            name: row.get("name"),
            contact_name: row.get("contact_name"),
            contact_email: row.get("contact_email"),
            conversation_expiration: row.get("conversation_expiration"),
            inactive_user_retention_days: row.get("inactive_user_retention_days"),
            inactive_user_grace_period_days: row.get("inactive_user_grace_period_days"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn list_where(&self, condition: &str) -> DbResult<Vec<Organization>> {
        let query = format!(
            "SELECT {} FROM organizations WHERE {} ORDER BY created_at ASC, id ASC",
            ORG_COLUMNS, condition
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::org_from_row).collect()
    }
}

#[async_trait]
impl OrganizationRepo for SqliteOrganizationRepo {
    async fn create_with_owner(
        &self,
        input: CreateOrganization,
        owner_id: Uuid,
    ) -> DbResult<Organization> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let name = input.name.trim().to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (
                id, name, contact_name, contact_email, conversation_expiration,
                inactive_user_retention_days, inactive_user_grace_period_days,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&name)
        .bind(&input.contact_name)
        .bind(&input.contact_email)
        .bind(input.conversation_expiration)
        .bind(input.inactive_user_retention_days)
        .bind(input.inactive_user_grace_period_days)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Organization with name '{}' already exists", name))
            }
            _ => DbError::from(e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO org_members (org_id, user_id, role, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .bind(OrgRole::Owner.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Organization {
            id,
            name,
            contact_name: input.contact_name,
            contact_email: input.contact_email,
            conversation_expiration: input.conversation_expiration,
            inactive_user_retention_days: input.inactive_user_retention_days,
            inactive_user_grace_period_days: input.inactive_user_grace_period_days,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Organization>> {
        let query = format!("SELECT {} FROM organizations WHERE id = ?", ORG_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::org_from_row).transpose()
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Organization>> {
        let query = format!("SELECT {} FROM organizations WHERE name = ?", ORG_COLUMNS);
        let row = sqlx::query(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::org_from_row).transpose()
    }

    async fn count(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM organizations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count"))
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> DbResult<Organization> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE organizations
            SET contact_name = COALESCE(?, contact_name),
                contact_email = COALESCE(?, contact_email),
                conversation_expiration = COALESCE(?, conversation_expiration),
                inactive_user_retention_days = COALESCE(?, inactive_user_retention_days),
                inactive_user_grace_period_days = COALESCE(?, inactive_user_grace_period_days),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&input.contact_name)
        .bind(&input.contact_email)
        .bind(input.conversation_expiration)
        .bind(input.inactive_user_retention_days)
        .bind(input.inactive_user_grace_period_days)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    async fn delete_with_cleanup(&self, id: Uuid) -> DbResult<()> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM conversation_metadata
            WHERE conversation_id IN (
                SELECT conversation_id FROM conversation_metadata_org WHERE org_id = ?
            )
            "#,
        )
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM conversation_metadata_org WHERE org_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM org_members WHERE org_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM organizations WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_with_inactive_user_policy(&self) -> DbResult<Vec<Organization>> {
        self.list_where(
            "COALESCE(inactive_user_retention_days, 0) > 0 \
             OR COALESCE(inactive_user_grace_period_days, 0) > 0",
        )
        .await
    }

    async fn list_with_conversation_expiration(&self) -> DbResult<Vec<Organization>> {
        self.list_where("COALESCE(conversation_expiration, 0) > 0")
            .await
    }
}
