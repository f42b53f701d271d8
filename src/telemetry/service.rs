use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Map;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{CollectorRegistry, TelemetryError, TelemetryUploader};
use crate::{
    config::TelemetryConfig,
    db::DbPool,
    models::{TelemetryIdentity, TelemetryMetrics},
    observability::metrics,
};

/// Whether the admin UI should nag about stale license telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseWarningStatus {
    pub should_warn: bool,
    pub days_since_upload: Option<i64>,
    pub message: String,
}

/// Result of one upload round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    /// Snapshots whose metrics were all accepted
    pub uploaded: usize,
    /// Snapshots with at least one rejected metric
    pub failed: usize,
}

struct RunningLoops {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct TelemetryService {
    db: Arc<DbPool>,
    config: TelemetryConfig,
    uploader: Option<Arc<dyn TelemetryUploader>>,
    registry: CollectorRegistry,
    running: Mutex<Option<RunningLoops>>,
}

impl TelemetryService {
    pub fn new(
        db: Arc<DbPool>,
        config: TelemetryConfig,
        uploader: Option<Arc<dyn TelemetryUploader>>,
    ) -> Self {
        Self {
            db,
            config,
            uploader,
            registry: CollectorRegistry::with_defaults(),
            running: Mutex::new(None),
        }
    }

    pub fn with_registry(mut self, registry: CollectorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Spawn the collection and upload loops. Calling this while the loops are
    /// already running leaves them untouched.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("Telemetry service already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let handles = vec![
            tokio::spawn(Arc::clone(self).collection_loop(shutdown.clone())),
            tokio::spawn(Arc::clone(self).upload_loop(shutdown.clone())),
        ];
        *running = Some(RunningLoops { shutdown, handles });

        tracing::info!(
            collection_interval_days = self.config.collection_interval_days,
            upload_interval_hours = self.config.upload_interval_hours,
            uploader = self.uploader.is_some(),
            "Telemetry service started"
        );
    }

    /// Cancel both loops and wait for them to exit.
    pub async fn stop(&self) {
        let Some(loops) = self.running.lock().await.take() else {
            return;
        };

        loops.shutdown.cancel();
        for handle in loops.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Telemetry loop ended abnormally");
            }
        }
        tracing::info!("Telemetry service stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn collection_loop(self: Arc<Self>, shutdown: CancellationToken) {
        self.initial_collection_check().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.normal_check_interval()) => {}
            }

            if self.should_collect().await
                && let Err(e) = self.collect_now().await
            {
                tracing::error!(error = %e, "Telemetry collection failed");
            }
        }
    }

    async fn upload_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            // Check often until the backend knows this installation
            let interval = if self.identity_established().await {
                self.config.normal_check_interval()
            } else {
                self.config.bootstrap_check_interval()
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if self.should_upload().await
                && let Err(e) = self.upload_pending().await
            {
                tracing::error!(error = %e, "Telemetry upload failed");
            }
        }
    }

    async fn initial_collection_check(&self) {
        match self.db.telemetry().count_metrics().await {
            Ok(0) => {
                tracing::info!("No telemetry collected yet, collecting now");
                if let Err(e) = self.collect_now().await {
                    tracing::error!(error = %e, "Initial telemetry collection failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Initial telemetry check failed"),
        }
    }

    async fn identity_established(&self) -> bool {
        match self.db.telemetry().get_identity().await {
            Ok(identity) => identity.is_some_and(|i| i.is_established()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load telemetry identity");
                false
            }
        }
    }

    /// True when nothing has been collected or the newest snapshot is older
    /// than the collection interval. Database errors count as "no".
    pub async fn should_collect(&self) -> bool {
        self.should_collect_at(Utc::now()).await
    }

    async fn should_collect_at(&self, now: DateTime<Utc>) -> bool {
        match self.db.telemetry().latest_collected_at().await {
            Ok(None) => true,
            Ok(Some(last)) => now - last >= self.config.collection_interval(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check telemetry collection state");
                false
            }
        }
    }

    /// True when snapshots are pending and no upload happened within the
    /// upload interval. Database errors count as "no".
    pub async fn should_upload(&self) -> bool {
        let telemetry = self.db.telemetry();
        let pending = match telemetry.list_pending_upload().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check pending telemetry");
                return false;
            }
        };
        if pending.is_empty() {
            return false;
        }

        match telemetry.latest_uploaded_at().await {
            Ok(None) => true,
            Ok(Some(last)) => Utc::now() - last >= self.config.upload_interval(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to check telemetry upload state");
                false
            }
        }
    }

    /// Run every collector and store one snapshot.
    ///
    /// A failing collector is logged and left out; the snapshot is stored with
    /// whatever the others produced.
    pub async fn collect_now(&self) -> Result<TelemetryMetrics, TelemetryError> {
        let mut data = Map::new();

        for collector in self.registry.collectors() {
            if !collector.should_collect() {
                tracing::debug!(collector = collector.name(), "Skipping telemetry collector");
                continue;
            }
            match collector.collect(&self.db).await {
                Ok(results) => {
                    for result in results {
                        data.insert(result.key, result.value);
                    }
                }
                Err(e) => {
                    tracing::warn!(collector = collector.name(), error = %e, "Telemetry collector failed");
                }
            }
        }

        let stored = self.db.telemetry().record_metrics(Utc::now(), data).await;
        match &stored {
            Ok(snapshot) => {
                metrics::record_telemetry_operation("collect", "success");
                tracing::info!(
                    id = %snapshot.id,
                    metric_count = snapshot.metrics_data.len(),
                    "Collected telemetry snapshot"
                );
            }
            Err(_) => metrics::record_telemetry_operation("collect", "error"),
        }
        Ok(stored?)
    }

    /// Upload every pending snapshot, one metric at a time.
    ///
    /// A snapshot is marked uploaded only when all of its metrics were
    /// accepted; otherwise the failures are recorded on the row. Either way the
    /// attempt is counted.
    pub async fn upload_pending(&self) -> Result<UploadSummary, TelemetryError> {
        let Some(uploader) = &self.uploader else {
            tracing::debug!("No telemetry uploader configured, skipping upload");
            return Ok(UploadSummary::default());
        };

        let telemetry = self.db.telemetry();
        let pending = telemetry.list_pending_upload().await?;
        if pending.is_empty() {
            return Ok(UploadSummary::default());
        }

        let Some(admin_email) = self.admin_email().await? else {
            tracing::warn!("No admin email available, skipping telemetry upload");
            return Ok(UploadSummary::default());
        };

        let identity = self.get_or_create_identity(uploader.as_ref(), &admin_email).await?;

        let mut summary = UploadSummary::default();
        for snapshot in pending {
            let mut failures = Vec::new();
            for (key, value) in &snapshot.metrics_data {
                if let Err(e) = uploader.send_metric(&identity, key, value).await {
                    failures.push(format!("{}: {}", key, e));
                }
            }

            if failures.is_empty() {
                telemetry.mark_uploaded(snapshot.id, Utc::now()).await?;
                summary.uploaded += 1;
            } else {
                let error = failures.join("; ");
                tracing::warn!(id = %snapshot.id, error = %error, "Telemetry snapshot upload failed");
                telemetry.record_upload_failure(snapshot.id, &error).await?;
                summary.failed += 1;
            }
        }

        metrics::record_telemetry_operation(
            "upload",
            if summary.failed == 0 { "success" } else { "error" },
        );
        tracing::info!(
            uploaded = summary.uploaded,
            failed = summary.failed,
            "Telemetry upload finished"
        );
        Ok(summary)
    }

    /// Configured admin email, else the first user's.
    async fn admin_email(&self) -> Result<Option<String>, TelemetryError> {
        if let Some(email) = &self.config.admin_email {
            return Ok(Some(email.clone()));
        }
        Ok(self.db.users().first_created().await?.map(|u| u.email))
    }

    async fn get_or_create_identity(
        &self,
        uploader: &dyn TelemetryUploader,
        admin_email: &str,
    ) -> Result<TelemetryIdentity, TelemetryError> {
        let telemetry = self.db.telemetry();
        let existing = telemetry.get_identity().await?.unwrap_or_default();
        if existing.is_established() {
            return Ok(existing);
        }

        let identity = match uploader.register_instance(admin_email).await {
            Ok(registered) if registered.is_established() => registered,
            Ok(_) => Self::fallback_identity(existing, admin_email),
            Err(e) => {
                tracing::warn!(error = %e, "Instance registration failed, using local identity");
                Self::fallback_identity(existing, admin_email)
            }
        };

        telemetry.save_identity(&identity).await?;
        Ok(identity)
    }

    fn fallback_identity(existing: TelemetryIdentity, admin_email: &str) -> TelemetryIdentity {
        TelemetryIdentity {
            customer_id: existing.customer_id.or_else(|| Some(admin_email.to_string())),
            instance_id: existing
                .instance_id
                .or_else(|| Some(Uuid::new_v4().to_string())),
        }
    }

    pub async fn license_warning_status(&self) -> LicenseWarningStatus {
        self.license_warning_status_at(Utc::now()).await
    }

    async fn license_warning_status_at(&self, now: DateTime<Utc>) -> LicenseWarningStatus {
        match self.db.telemetry().latest_uploaded_at().await {
            Ok(None) => LicenseWarningStatus {
                should_warn: false,
                days_since_upload: None,
                message: "No uploads yet".to_string(),
            },
            Ok(Some(last)) => {
                let days = (now - last).num_days();
                let should_warn = days > self.config.license_warning_threshold_days;
                let message = if should_warn {
                    format!(
                        "Usage data has not been reported for {} days. Check network access \
                         to the telemetry endpoint to keep your license in good standing.",
                        days
                    )
                } else {
                    format!("Last upload {} days ago", days)
                };
                LicenseWarningStatus {
                    should_warn,
                    days_since_upload: Some(days),
                    message,
                }
            }
            Err(e) => LicenseWarningStatus {
                should_warn: false,
                days_since_upload: None,
                message: format!("Unable to determine upload status: {}", e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex as StdMutex};

    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::{Value as JsonValue, json};
    use sqlx::SqlitePool;

    use super::*;
    use crate::{
        db::tests::harness::create_migrated_pool,
        telemetry::{MetricResult, MetricsCollector},
    };

    #[derive(Default)]
    struct RecordingUploader {
        register_fails: bool,
        failing_keys: HashSet<&'static str>,
        registrations: StdMutex<Vec<String>>,
        sent: StdMutex<Vec<(String, JsonValue)>>,
    }

    #[async_trait]
    impl TelemetryUploader for RecordingUploader {
        async fn register_instance(
            &self,
            admin_email: &str,
        ) -> Result<TelemetryIdentity, TelemetryError> {
            self.registrations.lock().unwrap().push(admin_email.to_string());
            if self.register_fails {
                return Err(TelemetryError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(TelemetryIdentity {
                customer_id: Some("cust-123".into()),
                instance_id: Some("inst-456".into()),
            })
        }

        async fn send_metric(
            &self,
            _identity: &TelemetryIdentity,
            key: &str,
            value: &JsonValue,
        ) -> Result<(), TelemetryError> {
            if self.failing_keys.contains(key) {
                return Err(TelemetryError::Rejected {
                    status: 500,
                    body: "Upload error".into(),
                });
            }
            self.sent.lock().unwrap().push((key.to_string(), value.clone()));
            Ok(())
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl MetricsCollector for FailingCollector {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn collect(&self, _db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError> {
            Err(TelemetryError::Collector {
                collector: "failing",
                message: "Collection error".into(),
            })
        }
    }

    struct DisabledCollector;

    #[async_trait]
    impl MetricsCollector for DisabledCollector {
        fn name(&self) -> &'static str {
            "disabled"
        }

        fn should_collect(&self) -> bool {
            false
        }

        async fn collect(&self, _db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError> {
            panic!("disabled collector must not run");
        }
    }

    struct StaticCollector;

    #[async_trait]
    impl MetricsCollector for StaticCollector {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn collect(&self, _db: &DbPool) -> Result<Vec<MetricResult>, TelemetryError> {
            Ok(vec![
                MetricResult::new("metric1", 100),
                MetricResult::new("metric2", 200),
            ])
        }
    }

    async fn setup(
        config: TelemetryConfig,
        uploader: Option<Arc<dyn TelemetryUploader>>,
    ) -> (SqlitePool, Arc<DbPool>, TelemetryService) {
        let pool = create_migrated_pool().await;
        let db = Arc::new(DbPool::from_sqlite(pool.clone()));
        let service = TelemetryService::new(db.clone(), config, uploader);
        (pool, db, service)
    }

    fn admin_config() -> TelemetryConfig {
        TelemetryConfig {
            admin_email: Some("admin@example.com".into()),
            ..Default::default()
        }
    }

    async fn snapshot(db: &DbPool, collected_at: DateTime<Utc>, data: JsonValue) -> TelemetryMetrics {
        let JsonValue::Object(map) = data else {
            panic!("metrics must be an object");
        };
        db.telemetry().record_metrics(collected_at, map).await.unwrap()
    }

    async fn uploaded_snapshot(db: &DbPool, uploaded_ago: Duration) {
        let now = Utc::now();
        let row = snapshot(db, now - uploaded_ago, json!({"m": 1})).await;
        db.telemetry()
            .mark_uploaded(row.id, now - uploaded_ago)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_should_collect() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;
        assert!(service.should_collect().await);

        snapshot(&db, Utc::now() - Duration::days(8), json!({})).await;
        assert!(service.should_collect().await);

        snapshot(&db, Utc::now() - Duration::days(1), json!({})).await;
        assert!(!service.should_collect().await);
    }

    #[tokio::test]
    async fn test_should_collect_false_on_database_error() {
        let (pool, _db, service) = setup(TelemetryConfig::default(), None).await;
        sqlx::query("DROP TABLE telemetry_metrics")
            .execute(&pool)
            .await
            .unwrap();

        assert!(!service.should_collect().await);
        assert!(!service.should_upload().await);
    }

    #[tokio::test]
    async fn test_should_upload() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;
        // Nothing pending
        assert!(!service.should_upload().await);

        snapshot(&db, Utc::now(), json!({"m": 1})).await;
        // Pending and never uploaded
        assert!(service.should_upload().await);

        uploaded_snapshot(&db, Duration::hours(12)).await;
        assert!(!service.should_upload().await);
    }

    #[tokio::test]
    async fn test_should_upload_after_interval() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;
        uploaded_snapshot(&db, Duration::hours(25)).await;
        snapshot(&db, Utc::now(), json!({"m": 1})).await;

        assert!(service.should_upload().await);
    }

    #[tokio::test]
    async fn test_license_warning_status() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;

        let status = service.license_warning_status().await;
        assert!(!status.should_warn);
        assert_eq!(status.days_since_upload, None);
        assert!(status.message.contains("No uploads yet"));

        uploaded_snapshot(&db, Duration::days(2) + Duration::hours(1)).await;
        let status = service.license_warning_status().await;
        assert!(!status.should_warn);
        assert_eq!(status.days_since_upload, Some(2));
    }

    #[tokio::test]
    async fn test_license_warning_when_upload_is_stale() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;
        uploaded_snapshot(&db, Duration::days(5) + Duration::hours(1)).await;

        let status = service.license_warning_status().await;
        assert!(status.should_warn);
        assert_eq!(status.days_since_upload, Some(5));
    }

    #[tokio::test]
    async fn test_license_warning_on_database_error() {
        let (pool, _db, service) = setup(TelemetryConfig::default(), None).await;
        sqlx::query("DROP TABLE telemetry_metrics")
            .execute(&pool)
            .await
            .unwrap();

        let status = service.license_warning_status().await;
        assert!(!status.should_warn);
        assert!(status.message.contains("Unable to determine upload status"));
    }

    #[tokio::test]
    async fn test_collect_skips_failing_and_disabled_collectors() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;
        let mut registry = CollectorRegistry::new();
        registry.register(Arc::new(StaticCollector));
        registry.register(Arc::new(FailingCollector));
        registry.register(Arc::new(DisabledCollector));
        let service = service.with_registry(registry);

        let stored = service.collect_now().await.unwrap();

        assert_eq!(stored.metrics_data.len(), 2);
        assert_eq!(stored.metrics_data["metric1"], json!(100));
        assert_eq!(db.telemetry().count_metrics().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_collect_with_default_collectors() {
        let (_pool, _db, service) = setup(TelemetryConfig::default(), None).await;

        let stored = service.collect_now().await.unwrap();

        assert_eq!(stored.metrics_data["total_organizations"], json!(0));
        assert_eq!(stored.metrics_data["total_conversations"], json!(0));
    }

    #[tokio::test]
    async fn test_upload_without_uploader_is_skipped() {
        let (_pool, db, service) = setup(admin_config(), None).await;
        snapshot(&db, Utc::now(), json!({"m": 1})).await;

        assert_eq!(service.upload_pending().await.unwrap(), UploadSummary::default());
        assert_eq!(db.telemetry().list_pending_upload().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_without_admin_email_is_skipped() {
        let uploader = Arc::new(RecordingUploader::default());
        let (_pool, db, service) =
            setup(TelemetryConfig::default(), Some(uploader.clone())).await;
        snapshot(&db, Utc::now(), json!({"m": 1})).await;

        assert_eq!(service.upload_pending().await.unwrap(), UploadSummary::default());
        assert!(uploader.registrations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_uses_first_user_email() {
        let uploader = Arc::new(RecordingUploader::default());
        let (_pool, db, service) =
            setup(TelemetryConfig::default(), Some(uploader.clone())).await;
        db.users().upsert(Uuid::new_v4(), "first@example.com").await.unwrap();
        snapshot(&db, Utc::now(), json!({"m": 1})).await;

        service.upload_pending().await.unwrap();

        assert_eq!(
            *uploader.registrations.lock().unwrap(),
            vec!["first@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_upload_success() {
        let uploader = Arc::new(RecordingUploader::default());
        let (_pool, db, service) = setup(admin_config(), Some(uploader.clone())).await;
        snapshot(&db, Utc::now(), json!({"metric1": 100, "metric2": 200})).await;

        let summary = service.upload_pending().await.unwrap();

        assert_eq!(summary, UploadSummary { uploaded: 1, failed: 0 });
        assert_eq!(uploader.sent.lock().unwrap().len(), 2);
        assert!(db.telemetry().list_pending_upload().await.unwrap().is_empty());

        let identity = db.telemetry().get_identity().await.unwrap().unwrap();
        assert_eq!(identity.customer_id.as_deref(), Some("cust-123"));
        assert_eq!(identity.instance_id.as_deref(), Some("inst-456"));

        assert!(db.telemetry().latest_uploaded_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upload_partial_failure() {
        let uploader = Arc::new(RecordingUploader {
            failing_keys: HashSet::from(["metric2"]),
            ..Default::default()
        });
        let (_pool, db, service) = setup(admin_config(), Some(uploader.clone())).await;
        snapshot(&db, Utc::now() - Duration::minutes(2), json!({"metric1": 100})).await;
        let bad = snapshot(&db, Utc::now() - Duration::minutes(1), json!({"metric2": 200})).await;

        let summary = service.upload_pending().await.unwrap();
        assert_eq!(summary, UploadSummary { uploaded: 1, failed: 1 });

        let pending = db.telemetry().list_pending_upload().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, bad.id);
        assert_eq!(pending[0].upload_attempts, 1);
        let error = pending[0].last_upload_error.as_deref().unwrap();
        assert!(error.starts_with("metric2: "));
    }

    #[tokio::test]
    async fn test_registration_failure_falls_back_to_local_identity() {
        let uploader = Arc::new(RecordingUploader {
            register_fails: true,
            ..Default::default()
        });
        let (_pool, db, service) = setup(admin_config(), Some(uploader.clone())).await;
        snapshot(&db, Utc::now(), json!({"m": 1})).await;

        service.upload_pending().await.unwrap();

        let identity = db.telemetry().get_identity().await.unwrap().unwrap();
        assert_eq!(identity.customer_id.as_deref(), Some("admin@example.com"));
        let instance_id = identity.instance_id.unwrap();
        assert!(Uuid::parse_str(&instance_id).is_ok());

        // An established identity is reused without registering again
        snapshot(&db, Utc::now(), json!({"m": 2})).await;
        service.upload_pending().await.unwrap();
        assert_eq!(uploader.registrations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_cancels() {
        let (_pool, db, service) = setup(TelemetryConfig::default(), None).await;
        let service = Arc::new(service);

        service.start().await;
        service.start().await;
        assert!(service.is_running().await);

        service.stop().await;
        assert!(!service.is_running().await);
        // The initial check runs to completion before the loop sees cancellation
        assert_eq!(db.telemetry().count_metrics().await.unwrap(), 1);

        // Stopping again is a no-op
        service.stop().await;
    }
}
