mod organizations;

use std::sync::Arc;

pub use organizations::OrganizationService;

use crate::db::DbPool;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub organizations: OrganizationService,
}

impl Services {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self {
            organizations: OrganizationService::new(db),
        }
    }
}
