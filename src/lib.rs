//! Steward: enterprise maintenance service.
//!
//! Enforces per-organization data retention (inactive members and idle
//! conversations), keeps third-party OAuth tokens fresh, ingests Jira
//! webhooks, and reports usage telemetry.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod db;
pub mod integrations;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod retention;
pub mod routes;
pub mod services;
pub mod telemetry;

use crate::{
    auth::{OAuthTokenRefresher, TokenRefresher},
    config::StewardConfig,
    db::{DbError, DbPool},
    integrations::RuntimeWaitLimiter,
    services::Services,
    telemetry::{HttpTelemetryUploader, TelemetryService, TelemetryUploader},
};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub http_client: reqwest::Client,
    pub config: Arc<StewardConfig>,
    pub db: Arc<DbPool>,
    pub services: Services,
    /// Bounds concurrent waits on conversation runtimes
    pub runtime_waits: Arc<RuntimeWaitLimiter>,
    pub telemetry: Arc<TelemetryService>,
    pub token_refresher: Arc<dyn TokenRefresher>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Database initialization failed: {0}")]
    Database(#[from] DbError),

    #[error("HTTP client initialization failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl AppState {
    /// Connect to the database, run migrations if configured, and wire up services.
    pub async fn new(config: StewardConfig) -> Result<Self, StartupError> {
        let db = DbPool::from_config(&config.database).await?;
        if config.database.run_migrations {
            db.run_migrations().await?;
        }

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("steward/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::from_parts(config, Arc::new(db), http_client))
    }

    /// Build state around an existing database pool.
    pub fn from_parts(config: StewardConfig, db: Arc<DbPool>, http_client: reqwest::Client) -> Self {
        let uploader = config.telemetry.upload.as_ref().map(|upload| {
            Arc::new(HttpTelemetryUploader::new(http_client.clone(), upload))
                as Arc<dyn TelemetryUploader>
        });
        let telemetry = Arc::new(TelemetryService::new(
            db.clone(),
            config.telemetry.clone(),
            uploader,
        ));
        let token_refresher = Arc::new(OAuthTokenRefresher::new(
            http_client.clone(),
            config.auth.providers.clone(),
        ));

        Self {
            runtime_waits: Arc::new(RuntimeWaitLimiter::new(
                config.integrations.runtime_wait.max_concurrent,
            )),
            services: Services::new(db.clone()),
            config: Arc::new(config),
            db,
            telemetry,
            token_refresher,
            http_client,
        }
    }
}

/// Assemble the HTTP application.
pub fn build_app(config: &StewardConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness));

    if config.observability.metrics.enabled {
        app = app.route(&config.observability.metrics.path, get(routes::health::metrics));
    }

    if config.integrations.jira.enabled {
        app = app.route("/integrations/jira/events", post(routes::jira::events));
    }

    let api_routes = Router::new()
        .route("/organizations", post(routes::organizations::create))
        .route(
            "/organizations/{org_id}",
            get(routes::organizations::get)
                .patch(routes::organizations::update)
                .delete(routes::organizations::delete),
        )
        .route(
            "/organizations/{org_id}/retention-audit-logs",
            get(routes::organizations::list_retention_audit_logs),
        )
        .route(
            "/user/provider-tokens/{idp}",
            get(routes::tokens::get_provider_token),
        )
        .route(
            "/telemetry/license-status",
            get(routes::telemetry::license_status),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::identity_middleware,
        ));

    app.nest("/api", api_routes)
        .layer(axum::middleware::from_fn(routes::http_metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
