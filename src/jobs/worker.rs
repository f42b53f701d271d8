//! Maintenance worker that runs retention processors on a schedule.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::{MaintenanceTask, MaintenanceTaskProcessor};
use crate::{
    config::RetentionConfig,
    db::DbPool,
    retention::{ConversationExpirationProcessor, InactiveUserRetentionProcessor},
};

/// Build the processors enabled by configuration, in execution order.
pub fn build_processors(
    db: Arc<DbPool>,
    config: &RetentionConfig,
) -> Vec<Arc<dyn MaintenanceTaskProcessor>> {
    let mut processors: Vec<Arc<dyn MaintenanceTaskProcessor>> = Vec::new();

    if config.inactive_users.enabled {
        processors.push(Arc::new(InactiveUserRetentionProcessor::new(
            db.clone(),
            config.inactive_users.batch_size,
        )));
    }
    if config.conversation_expiration.enabled {
        processors.push(Arc::new(ConversationExpirationProcessor::new(
            db,
            config.conversation_expiration.batch_size,
        )));
    }

    processors
}

/// Run a single processor once by name.
///
/// Returns `None` if no processor with that name is registered.
pub async fn run_task(
    processors: &[Arc<dyn MaintenanceTaskProcessor>],
    name: &str,
) -> Option<serde_json::Value> {
    let processor = processors.iter().find(|p| p.name() == name)?;
    let task = MaintenanceTask::new(name);
    Some(processor.process(&task).await)
}

/// Starts the maintenance worker as a background task.
///
/// Each tick runs every processor sequentially, so runs never overlap. The
/// worker exits when `shutdown` is cancelled, finishing the processor that is
/// currently running first.
pub async fn start_maintenance_worker(
    processors: Vec<Arc<dyn MaintenanceTaskProcessor>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    if processors.is_empty() {
        tracing::info!("Maintenance worker has no processors enabled");
        return;
    }

    tracing::info!(
        interval_secs = interval.as_secs(),
        processors = ?processors.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "Starting maintenance worker"
    );

    loop {
        for processor in &processors {
            if shutdown.is_cancelled() {
                break;
            }

            let task = MaintenanceTask::new(processor.name());
            let summary = processor.process(&task).await;
            let status = summary
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");

            if status == "completed" {
                tracing::debug!(task = processor.name(), %summary, "Maintenance task finished");
            } else {
                tracing::warn!(
                    task = processor.name(),
                    status,
                    %summary,
                    "Maintenance task finished with errors"
                );
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Maintenance worker shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{config::RetentionConfig, db::tests::harness::create_migrated_pool};

    struct CountingProcessor {
        name: &'static str,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MaintenanceTaskProcessor for CountingProcessor {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(&self, task: &MaintenanceTask) -> serde_json::Value {
            self.runs.fetch_add(1, Ordering::SeqCst);
            serde_json::json!({ "status": "completed", "task": task.name })
        }
    }

    fn counting(name: &'static str) -> (Arc<dyn MaintenanceTaskProcessor>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let processor = Arc::new(CountingProcessor {
            name,
            runs: runs.clone(),
        });
        (processor, runs)
    }

    #[tokio::test]
    async fn test_build_processors_respects_config() {
        let db = Arc::new(DbPool::from_sqlite(create_migrated_pool().await));
        let mut config = RetentionConfig::default();

        let names: Vec<_> = build_processors(db.clone(), &config)
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["inactive_user_retention", "conversation_expiration"]);

        config.inactive_users.enabled = false;
        let names: Vec<_> = build_processors(db, &config)
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["conversation_expiration"]);
    }

    #[tokio::test]
    async fn test_run_task_by_name() {
        let (processor, runs) = counting("alpha");
        let processors = vec![processor];

        let summary = run_task(&processors, "alpha").await.unwrap();
        assert_eq!(summary["task"], "alpha");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert!(run_task(&processors, "missing").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_runs_each_tick_until_cancelled() {
        let (first, first_runs) = counting("first");
        let (second, second_runs) = counting("second");
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(start_maintenance_worker(
            vec![first, second],
            Duration::from_secs(60),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(150)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // Ticks at 0s, 60s and 120s
        assert_eq!(first_runs.load(Ordering::SeqCst), 3);
        assert_eq!(second_runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_worker_without_processors_returns() {
        start_maintenance_worker(Vec::new(), Duration::from_secs(1), CancellationToken::new()).await;
    }
}
