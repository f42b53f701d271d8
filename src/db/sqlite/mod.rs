mod auth_tokens;
mod common;
mod conversations;
mod org_members;
mod organizations;
mod retention_audit_logs;
mod telemetry;
mod users;

pub use auth_tokens::SqliteAuthTokenRepo;
pub use conversations::SqliteConversationRepo;
pub use org_members::SqliteOrgMemberRepo;
pub use organizations::SqliteOrganizationRepo;
pub use retention_audit_logs::SqliteRetentionAuditLogRepo;
pub use telemetry::SqliteTelemetryRepo;
pub use users::SqliteUserRepo;
