use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storyboard_api::config::ServerConfig;
use storyboard_api::router::build_app_router;
use storyboard_api::state::AppState;
use storyboard_core::settings::Settings;
use storyboard_db::ProjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storyboard_api=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let settings = Settings::from_env();
    let mut report = settings.validate(settings.strict);
    report.errors.extend(config.validate().errors);
    for warning in &report.warnings {
        tracing::warn!(%warning, "Configuration warning");
    }
    for error in &report.errors {
        tracing::error!(%error, "Configuration error");
    }
    if settings.strict && !report.is_ok() {
        anyhow::bail!("invalid configuration ({} errors)", report.errors.len());
    }

    settings
        .ensure_directories()
        .with_context(|| format!("creating data directories under {}", settings.base_dir.display()))?;
    tracing::info!(base_dir = %settings.base_dir.display(), "Data directories ready");

    // --- Project store ---
    let (store, load) = ProjectStore::open(
        settings.projects_dir(),
        &settings.outputs_dir(),
        Duration::from_secs(settings.batch_threshold_secs),
    )
    .await
    .context("opening project store")?;
    tracing::info!(
        loaded = load.loaded,
        skipped = load.skipped.len(),
        relinked = load.relinked,
        "Projects loaded"
    );

    let state = AppState::from_settings(store, settings, config.clone());
    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().context("invalid HOST address")?,
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    // In-flight requests get a bounded drain after the signal.
    let signalled = Arc::new(Notify::new());
    let notify = signalled.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            notify.notify_one();
        })
        .into_future();
    let drain_limit = Duration::from_secs(config.shutdown_timeout_secs);

    tokio::select! {
        result = server => result.context("server error")?,
        () = async {
            signalled.notified().await;
            tokio::time::sleep(drain_limit).await;
        } => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "Shutdown drain timed out, dropping open connections"
            );
        }
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
