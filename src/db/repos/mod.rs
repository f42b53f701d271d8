mod auth_tokens;
mod conversations;
mod org_members;
mod organizations;
mod retention_audit_logs;
mod telemetry;
mod users;

pub use auth_tokens::*;
pub use conversations::*;
pub use org_members::*;
pub use organizations::*;
pub use retention_audit_logs::*;
pub use telemetry::*;
pub use users::*;

/// Result of an offset-paginated list query.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    /// The items returned for this page.
    pub items: Vec<T>,
    /// Whether there are more items after this page.
    pub has_more: bool,
}

impl<T> ListResult<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }
}
