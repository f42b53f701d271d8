//! Console logging setup.

use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingConfig};

/// Crates that are noisy at `info` and rarely useful to operators.
const QUIET_DEPENDENCIES: &str = "hyper=warn,h2=warn,sqlx=warn,reqwest=warn";

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, replaces the configured level and filter entirely.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(fmt_layer(logging))
        .with(build_env_filter(logging))
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))
}

fn fmt_layer(logging: &LoggingConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = tracing_subscriber::fmt::layer()
        .with_file(logging.source_location)
        .with_line_number(logging.source_location);

    match (logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Json, true) => base.json().with_current_span(true).boxed(),
        (LogFormat::Json, false) => base.json().with_current_span(true).without_time().boxed(),
    }
}

fn build_env_filter(logging: &LoggingConfig) -> EnvFilter {
    let level = logging.level.as_directive();

    if let Ok(directives) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(level));
    }

    let directives = match &logging.filter {
        Some(extra) => format!("{level},{extra}"),
        None => format!("{level},{QUIET_DEPENDENCIES}"),
    };
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(level))
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        temp_env::with_var("RUST_LOG", Some("steward=trace"), || {
            let config = LoggingConfig {
                filter: Some("sqlx=debug".to_string()),
                ..Default::default()
            };
            assert_eq!(build_env_filter(&config).to_string(), "steward=trace");
        });
    }

    #[test]
    #[serial]
    fn test_config_filter_combined_with_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = LoggingConfig {
                level: LogLevel::Debug,
                filter: Some("sqlx=info".to_string()),
                ..Default::default()
            };
            let rendered = build_env_filter(&config).to_string();
            assert!(rendered.contains("debug"));
            assert!(rendered.contains("sqlx=info"));
        });
    }

    #[test]
    #[serial]
    fn test_default_filter_quiets_dependencies() {
        temp_env::with_var_unset("RUST_LOG", || {
            let rendered = build_env_filter(&LoggingConfig::default()).to_string();
            assert!(rendered.contains("sqlx=warn"));
        });
    }
}
