use std::path::{Path, PathBuf};

use clap::Parser;
use steward::{AppState, build_app, config::StewardConfig, db::DbPool, jobs, observability};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_PATH: &str = "steward.toml";

/// CLI arguments for the Steward maintenance service
#[derive(Parser, Debug)]
#[command(version, about = "Steward maintenance service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./steward.toml if it exists,
    /// otherwise built-in defaults are used)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server and background workers (default)
    Serve,
    /// Run database migrations and exit
    ///
    /// Useful for Kubernetes init containers or CI/CD pipelines.
    Migrate,
    /// Run one maintenance task immediately and print its summary
    RunTask {
        /// Task name: `inactive_user_retention` or `conversation_expiration`
        name: String,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    observability::init_tracing(&config.observability.logging)
        .expect("Failed to initialize tracing");

    match args.command {
        Some(Command::Migrate) => run_migrate(config).await,
        Some(Command::RunTask { name }) => run_task(config, &name).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(PathBuf::from(path)),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        }
    }
}

fn load_config(explicit_path: Option<&str>) -> StewardConfig {
    let Some(path) = resolve_config_path(explicit_path) else {
        return StewardConfig::default();
    };

    match StewardConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

async fn run_server(config: StewardConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    let state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application state");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();

    let worker = if config.retention.enabled {
        let processors = jobs::build_processors(state.db.clone(), &config.retention);
        Some(tokio::spawn(jobs::start_maintenance_worker(
            processors,
            config.retention.interval(),
            shutdown.clone(),
        )))
    } else {
        tracing::info!("Retention maintenance is disabled");
        None
    };

    if config.telemetry.enabled {
        state.telemetry.start().await;
    }

    let telemetry = state.telemetry.clone();
    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    shutdown.cancel();
    let drain = async {
        telemetry.stop().await;
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "Maintenance worker panicked");
        }
    };

    if tokio::time::timeout(config.server.shutdown_timeout(), drain)
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.server.shutdown_timeout_secs,
            "Background tasks did not stop before the shutdown timeout"
        );
    }

    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping background tasks...");
}

async fn connect(config: &StewardConfig) -> DbPool {
    match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(config: StewardConfig) {
    let db = connect(&config).await;
    match db.run_migrations().await {
        Ok(()) => println!("Migrations complete"),
        Err(e) => {
            eprintln!("Migration failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_task(config: StewardConfig, name: &str) {
    let db = connect(&config).await;
    if config.database.run_migrations
        && let Err(e) = db.run_migrations().await
    {
        eprintln!("Migration failed: {}", e);
        std::process::exit(1);
    }

    let processors = jobs::build_processors(std::sync::Arc::new(db), &config.retention);
    match jobs::run_task(&processors, name).await {
        Some(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to render summary: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            let known: Vec<_> = processors.iter().map(|p| p.name()).collect();
            eprintln!(
                "Unknown or disabled task '{}'. Available: {}",
                name,
                known.join(", ")
            );
            std::process::exit(1);
        }
    }
}
