/*
 * Responsibility
 * - Load Config → build services → assemble the Router
 * - Apply middleware (HTTP layers, publish gate on the upload route)
 * - axum::serve() with graceful shutdown so in-flight uploads finish
 */
use std::{panic, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::signal;
use tower_http::services::ServeDir;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::Config;
use crate::middleware;
use crate::services::{auth::build_gateway, storage::UploadStore};
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins when set, e.g. RUST_LOG=info,tavern=debug,tower_http=debug
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");
        default_hook(info);
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    init_panic_hook();

    let config = Config::from_env()?;

    let store = Arc::new(UploadStore::new(&config.uploads_path));
    store
        .ensure_root()
        .await
        .context("creating uploads directory")?;

    let gateway = build_gateway(&config).context("building publish gateway")?;
    let uploads_root = store.root().display().to_string();
    let state = AppState::new(gateway, store);
    let app = build_router(state, &config);

    info!("serving on: {}", config.addr);
    if let Some(limit) = config.max_body_bytes {
        info!(limit, "request bodies capped");
    }
    info!("uploads directory: {}", uploads_root);
    if config.allowed_issuers.is_empty() {
        info!("accepting tokens from any issuer");
    } else {
        info!(allowed = ?config.allowed_issuers, "accepting tokens from allowed issuers only");
    }

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .nest("/v1", api::v1::routes(state.clone()))
        .with_state(state);

    if config.serve_uploads {
        router = router.fallback_service(ServeDir::new(&config.uploads_path));
    }

    middleware::http::apply(router, config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested, draining in-flight requests");
}
