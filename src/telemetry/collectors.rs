use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use super::TelemetryError;
use crate::{db::DbPool, models::RetentionStatus};

/// One named value produced by a collector.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub key: String,
    pub value: JsonValue,
}

impl MetricResult {
    pub fn new(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Source of aggregate usage metrics.
///
/// Collectors must only report counts, never identifying data.
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Collectors can opt out of a round, e.g. when their feature is disabled.
    fn should_collect(&self) -> bool {
        true
    }

    async fn collect(&self, db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError>;
}

#[derive(Clone, Default)]
pub struct CollectorRegistry {
    collectors: Vec<Arc<dyn MetricsCollector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in organization, member and conversation collectors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OrganizationCollector));
        registry.register(Arc::new(MemberCollector));
        registry.register(Arc::new(ConversationCollector));
        registry
    }

    pub fn register(&mut self, collector: Arc<dyn MetricsCollector>) {
        self.collectors.push(collector);
    }

    pub fn collectors(&self) -> &[Arc<dyn MetricsCollector>] {
        &self.collectors
    }
}

pub struct OrganizationCollector;

#[async_trait]
impl MetricsCollector for OrganizationCollector {
    fn name(&self) -> &'static str {
        "organizations"
    }

    async fn collect(&self, db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError> {
        let count = db.organizations().count().await?;
        Ok(vec![MetricResult::new("total_organizations", count)])
    }
}

/// Member totals, broken down by retention status.
pub struct MemberCollector;

#[async_trait]
impl MetricsCollector for MemberCollector {
    fn name(&self) -> &'static str {
        "members"
    }

    async fn collect(&self, db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError> {
        let counts = db.org_members().count_by_retention_status().await?;
        let count_for = |status: RetentionStatus| {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, n)| *n)
                .sum::<i64>()
        };

        let total: i64 = counts.iter().map(|(_, n)| n).sum();
        Ok(vec![
            MetricResult::new("total_members", total),
            MetricResult::new("active_members", count_for(RetentionStatus::Active)),
            MetricResult::new(
                "retention_pending_members",
                count_for(RetentionStatus::RetentionPending),
            ),
            MetricResult::new(
                "retention_deleted_members",
                count_for(RetentionStatus::RetentionDeleted),
            ),
        ])
    }
}

pub struct ConversationCollector;

#[async_trait]
impl MetricsCollector for ConversationCollector {
    fn name(&self) -> &'static str {
        "conversations"
    }

    async fn collect(&self, db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError> {
        let count = db.conversations().count().await?;
        Ok(vec![MetricResult {
            key: "total_conversations".to_string(),
            value: json!(count),
        }])
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        db::tests::harness::create_migrated_pool,
        models::{CreateConversation, CreateOrganization},
    };

    #[tokio::test]
    async fn test_default_collectors_count_rows() {
        let db = DbPool::from_sqlite(create_migrated_pool().await);
        let owner = Uuid::new_v4();
        let org = db
            .organizations()
            .create_with_owner(CreateOrganization::named("Acme"), owner)
            .await
            .unwrap();
        db.conversations()
            .create(CreateConversation {
                org_id: org.id,
                user_id: owner,
                title: None,
                last_updated_at: None,
            })
            .await
            .unwrap();

        let registry = CollectorRegistry::with_defaults();
        let names: Vec<_> = registry.collectors().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["organizations", "members", "conversations"]);

        let mut all = Vec::new();
        for collector in registry.collectors() {
            all.extend(collector.collect(&db).await.unwrap());
        }

        assert!(all.contains(&MetricResult::new("total_organizations", 1)));
        assert!(all.contains(&MetricResult::new("total_members", 1)));
        assert!(all.contains(&MetricResult::new("active_members", 1)));
        assert!(all.contains(&MetricResult::new("retention_pending_members", 0)));
        assert!(all.contains(&MetricResult::new("total_conversations", 1)));
    }
}
