//! Footprint aggregation service. Binary entrypoint.
//! Boots the Axum HTTP server, wiring config, shared state and metrics.

use std::sync::Arc;

use footprint_aggregator::airports::ChainedResolver;
use footprint_aggregator::api::{self, AppState};
use footprint_aggregator::config::AppConfig;
use footprint_aggregator::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str =
    "footprint_aggregator=info,aggregate=info,airports=info,store=info,api=info,directory=info,warn";

/// Compact logs by default, JSON lines when `FOOTPRINT_LOG_JSON=1`.
/// A no-op if a global subscriber is already installed.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("FOOTPRINT_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    let resolver = ChainedResolver::from_config(&cfg.airports)?;
    let metrics = Metrics::init(resolver.table().len())?;

    let state = AppState::from_config(&cfg.store, Arc::new(resolver));
    let router = api::router(state).merge(metrics.router());

    info!(target: "api", routes = api::ROUTES.len(), "footprint aggregator ready");
    Ok(router.into())
}
