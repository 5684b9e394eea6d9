//! Wootrico - WhatsApp gateway ↔ helpdesk bridge
//!
//! Ingests gateway webhooks and helpdesk callbacks through a durable queue,
//! reconciles identity on both sides, and suppresses the echo loops a
//! bidirectional bridge would otherwise feed itself.

#![forbid(unsafe_code)]

mod api;
mod processor;
mod queue;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wootrico_core::{CreditLedger, MessageMap};

use queue::Queue;
use server::config::AppConfig;
use server::registry::TenantRegistry;
use server::{background, AppState};

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wootrico=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wootrico v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env().context("failed to load configuration")?;

    // A registry with zero tenants is the only fatal bootstrap condition;
    // individual tenant failures were already logged and skipped.
    let registry = TenantRegistry::load(&config)
        .await
        .context("tenant registry failed to load")?;

    let queue = Queue::connect(&config.nats_url).await?;
    let mapping = Arc::new(MessageMap::new());
    let ledger = Arc::new(CreditLedger::new());

    let state = Arc::new(AppState {
        config: config.clone(),
        registry,
        mapping: mapping.clone(),
        ledger: ledger.clone(),
        queue,
    });

    background::start_eviction_task(mapping, ledger, background::EVICTION_INTERVAL);
    processor::start(state.clone());

    let app = api::routes(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid server address")?;

    info!("HTTP server listening on http://{addr}");
    info!(
        principal = %config.principal_url(),
        callback = %config.callback_url(),
        "webhook endpoints advertised"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("wootrico shutdown complete");
    Ok(())
}
