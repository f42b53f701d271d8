//! Test harness for database repository testing
//!
//! SQLite in-memory databases with the real migrations applied, plus a bundle
//! of repositories that shares one pool so tests can seed across tables.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::{
        repos::{
            AuthTokenRepo, ConversationRepo, OrgMemberRepo, OrganizationRepo,
            RetentionAuditLogRepo, TelemetryRepo, UserRepo,
        },
        sqlite::{
            SqliteAuthTokenRepo, SqliteConversationRepo, SqliteOrgMemberRepo,
            SqliteOrganizationRepo, SqliteRetentionAuditLogRepo, SqliteTelemetryRepo,
            SqliteUserRepo,
        },
    },
    models::{CreateOrganization, Organization},
};

/// Create an in-memory SQLite pool for testing
pub async fn create_sqlite_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Run SQLite migrations on the pool
///
/// Uses the actual migration files to ensure tests match production schema
pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}

/// Create a migrated pool
pub async fn create_migrated_pool() -> SqlitePool {
    let pool = create_sqlite_pool().await;
    run_sqlite_migrations(&pool).await;
    pool
}

/// All SQLite repositories over one migrated in-memory pool
pub struct TestRepos {
    pub organizations: SqliteOrganizationRepo,
    pub org_members: SqliteOrgMemberRepo,
    pub users: SqliteUserRepo,
    pub conversations: SqliteConversationRepo,
    pub retention_audit_logs: SqliteRetentionAuditLogRepo,
    pub auth_tokens: SqliteAuthTokenRepo,
    pub telemetry: SqliteTelemetryRepo,
}

impl TestRepos {
    pub async fn sqlite() -> Self {
        let pool = create_migrated_pool().await;
        Self {
            organizations: SqliteOrganizationRepo::new(pool.clone()),
            org_members: SqliteOrgMemberRepo::new(pool.clone()),
            users: SqliteUserRepo::new(pool.clone()),
            conversations: SqliteConversationRepo::new(pool.clone()),
            retention_audit_logs: SqliteRetentionAuditLogRepo::new(pool.clone()),
            auth_tokens: SqliteAuthTokenRepo::new(pool.clone()),
            telemetry: SqliteTelemetryRepo::new(pool),
        }
    }

    pub fn organizations(&self) -> &dyn OrganizationRepo {
        &self.organizations
    }

    pub fn org_members(&self) -> &dyn OrgMemberRepo {
        &self.org_members
    }

    pub fn users(&self) -> &dyn UserRepo {
        &self.users
    }

    pub fn conversations(&self) -> &dyn ConversationRepo {
        &self.conversations
    }

    pub fn retention_audit_logs(&self) -> &dyn RetentionAuditLogRepo {
        &self.retention_audit_logs
    }

    pub fn auth_tokens(&self) -> &dyn AuthTokenRepo {
        &self.auth_tokens
    }

    pub fn telemetry(&self) -> &dyn TelemetryRepo {
        &self.telemetry
    }

    /// Create an organization owned by a fresh user, returning both
    pub async fn create_org(&self, input: CreateOrganization) -> (Organization, Uuid) {
        let owner_id = Uuid::new_v4();
        let org = self
            .organizations
            .create_with_owner(input, owner_id)
            .await
            .expect("Failed to create test org");
        (org, owner_id)
    }
}
