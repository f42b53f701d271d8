mod error;
pub mod repos;
pub mod sqlite;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    organizations: Arc<dyn OrganizationRepo>,
    org_members: Arc<dyn OrgMemberRepo>,
    users: Arc<dyn UserRepo>,
    conversations: Arc<dyn ConversationRepo>,
    retention_audit_logs: Arc<dyn RetentionAuditLogRepo>,
    auth_tokens: Arc<dyn AuthTokenRepo>,
    telemetry: Arc<dyn TelemetryRepo>,
}

impl CachedRepos {
    fn sqlite(pool: &sqlx::SqlitePool) -> Self {
        Self {
            organizations: Arc::new(sqlite::SqliteOrganizationRepo::new(pool.clone())),
            org_members: Arc::new(sqlite::SqliteOrgMemberRepo::new(pool.clone())),
            users: Arc::new(sqlite::SqliteUserRepo::new(pool.clone())),
            conversations: Arc::new(sqlite::SqliteConversationRepo::new(pool.clone())),
            retention_audit_logs: Arc::new(sqlite::SqliteRetentionAuditLogRepo::new(
                pool.clone(),
            )),
            auth_tokens: Arc::new(sqlite::SqliteAuthTokenRepo::new(pool.clone())),
            telemetry: Arc::new(sqlite::SqliteTelemetryRepo::new(pool.clone())),
        }
    }
}

/// SQLite-backed database pool.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    pool: sqlx::SqlitePool,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos::sqlite(&pool);
        DbPool { pool, repos }
    }

    /// Create a database pool from configuration
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(config.create_if_missing)
                    .foreign_keys(true)
                    .journal_mode(if config.wal_mode {
                        sqlx::sqlite::SqliteJournalMode::Wal
                    } else {
                        sqlx::sqlite::SqliteJournalMode::Delete
                    })
                    .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)),
            )
            .await?;
        Ok(Self::from_sqlite(pool))
    }

    /// Run database migrations using sqlx's migration runner
    /// This automatically creates and manages a _sqlx_migrations table
    pub async fn run_migrations(&self) -> DbResult<()> {
        tracing::info!("Running SQLite migrations");
        sqlx::migrate!("./migrations_sqlx/sqlite")
            .run(&self.pool)
            .await?;
        tracing::info!("SQLite migrations completed successfully");
        Ok(())
    }

    /// Get organization repository
    pub fn organizations(&self) -> Arc<dyn OrganizationRepo> {
        Arc::clone(&self.repos.organizations)
    }

    /// Get organization membership repository
    pub fn org_members(&self) -> Arc<dyn OrgMemberRepo> {
        Arc::clone(&self.repos.org_members)
    }

    /// Get user repository
    pub fn users(&self) -> Arc<dyn UserRepo> {
        Arc::clone(&self.repos.users)
    }

    /// Get conversation repository
    pub fn conversations(&self) -> Arc<dyn ConversationRepo> {
        Arc::clone(&self.repos.conversations)
    }

    /// Get retention audit log repository
    pub fn retention_audit_logs(&self) -> Arc<dyn RetentionAuditLogRepo> {
        Arc::clone(&self.repos.retention_audit_logs)
    }

    /// Get third-party OAuth token repository
    pub fn auth_tokens(&self) -> Arc<dyn AuthTokenRepo> {
        Arc::clone(&self.repos.auth_tokens)
    }

    /// Get telemetry repository
    pub fn telemetry(&self) -> Arc<dyn TelemetryRepo> {
        Arc::clone(&self.repos.telemetry)
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
