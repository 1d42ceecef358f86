//! # social-graph
//!
//! Assembles the service from settings and compile-time features, then
//! serves the dispatchers over HTTP.

mod wiring;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::handlers::{dispatchers, ServiceSet};
use api_adapters::web::{router, AppState, HttpLimits};
use api_adapters::Metrics;
use configs::{LogSettings, Settings};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Settings and logging
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);

    // 2. Adapters
    let store = wiring::document_store(&settings.store).await?;
    let objects = wiring::object_store(&settings.media).await?;
    let verifier = wiring::identity_verifier(&settings.auth)?;

    // 3. Services and dispatchers
    let services = ServiceSet::new(store, objects);
    let metrics = Arc::new(Metrics::new());
    let dispatchers = dispatchers(&services, verifier, metrics.clone(), |service| {
        settings.services.public_operations(service)
    });

    // 4. HTTP
    let limits = HttpLimits {
        request_timeout: Duration::from_secs(settings.server.request_timeout_secs),
        body_limit_bytes: settings.server.body_limit_bytes,
    };
    let app = router(AppState::new(dispatchers, metrics), limits);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("server.host / server.port do not form a socket address")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
