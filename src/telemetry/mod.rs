//! Usage telemetry for licensed installations.
//!
//! [`TelemetryService`] periodically snapshots aggregate counts through the
//! [`CollectorRegistry`] and ships pending snapshots with a
//! [`TelemetryUploader`]. Nothing is global: the server constructs one service,
//! starts it, and stops it on shutdown.

mod collectors;
mod error;
mod service;
mod uploader;

pub use collectors::{
    CollectorRegistry, ConversationCollector, MemberCollector, MetricResult, MetricsCollector,
    OrganizationCollector,
};
pub use error::TelemetryError;
pub use service::{LicenseWarningStatus, TelemetryService, UploadSummary};
pub use uploader::{HttpTelemetryUploader, TelemetryUploader};
