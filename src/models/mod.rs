mod auth_token;
mod conversation;
mod org_member;
mod organization;
mod retention_audit_log;
mod telemetry;
mod user;
mod validators;

pub use auth_token::*;
pub use conversation::*;
pub use org_member::*;
pub use organization::*;
pub use retention_audit_log::*;
pub use telemetry::*;
pub use user::*;
