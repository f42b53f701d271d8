use async_trait::async_trait;
use uuid::Uuid;

use crate::{db::error::DbResult, models::User};

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert the user or update their email if they already exist.
    async fn upsert(&self, id: Uuid, email: &str) -> DbResult<User>;
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<User>>;

    /// The earliest-created user, used as the fallback telemetry contact.
    async fn first_created(&self) -> DbResult<Option<User>>;
}
