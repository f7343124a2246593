use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use license_sentry::config::Config;
use license_sentry::db::{create_pool, ensure_schema};
use license_sentry::handlers::{self, admin};
use license_sentry::middleware::license_gate;
use license_sentry::scheduler::{spawn_license_task, ExpiryWarner, LogNotifier};
use license_sentry::service::{AppState, LicenseService};
use license_sentry::validator::HttpValidator;

#[derive(Parser, Debug)]
#[command(name = "license-sentry")]
#[command(about = "License validation service with offline resilience")]
struct Cli {
    /// Run a single license check, print the verdict, and exit.
    /// Exit code 0 when the license is valid, 1 otherwise.
    #[arg(long)]
    check: bool,
}

fn build_state(config: &Config) -> AppState {
    let db = create_pool(&config.database_path).expect("Failed to create database pool");
    ensure_schema(&db).expect("Failed to migrate database");

    let validator = HttpValidator::new(&config.license_server_url, config.validation_timeout)
        .expect("Failed to build validation client");

    let license = Arc::new(LicenseService::new(db.clone(), Arc::new(validator), config));

    AppState {
        db,
        license,
        exempt_paths: Arc::new(config.exempt_paths()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "license_sentry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let state = build_state(&config);

    if cli.check {
        let status = state.license.current_status().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&status).expect("Failed to serialize status")
        );
        std::process::exit(if status.valid { 0 } else { 1 });
    }

    // Scheduler: immediate post-startup check, then daily at the configured
    // local hour. Shares no lock with request-path checks.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let warner = Arc::new(ExpiryWarner::new(
        Arc::new(LogNotifier),
        config.expiry_warn_days,
    ));
    spawn_license_task(
        state.license.clone(),
        warner,
        config.check_hour,
        shutdown_rx,
    );

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/license",
            get(admin::get_license_status)
                .put(admin::set_license)
                .delete(admin::remove_license),
        )
        .route("/license/recheck", post(admin::recheck_license))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            license_gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    tracing::info!("license-sentry listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("Shutdown signal received, stopping server...");
    let _ = shutdown_tx.send(true);
}
