//! Real-estate ingestion service: binary entrypoint.
//! Loads the source config, starts the per-category schedulers and serves
//! the HTTP surface.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use realty_ingest::api::{self, AppState};
use realty_ingest::ingest::config::IngestConfig;
use realty_ingest::ingest::coordinator::IngestionCoordinator;
use realty_ingest::ingest::registry::{start_config_reload_thread, RegistryHandle, SourceRegistry};
use realty_ingest::ingest::repository::MemoryRepository;
use realty_ingest::ingest::scheduler::Scheduler;
use realty_ingest::metrics::Metrics;

/// Compact logs filtered by `RUST_LOG`. Shuttle may have installed a
/// subscriber already, in which case this is a no-op.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("realty_ingest=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let (cfg, path) = IngestConfig::load_default().context("loading ingest config")?;
    let handle = RegistryHandle::new(SourceRegistry::from_config(&cfg));
    tracing::info!(
        sources = handle.snapshot().len(),
        from = ?path,
        "source registry ready"
    );
    if let Some(path) = path {
        start_config_reload_thread(handle.clone(), path);
    }

    let coordinator = Arc::new(IngestionCoordinator::new(
        handle,
        Arc::new(MemoryRepository::new()),
        cfg.fetch.clone(),
        cfg.run.clone(),
    ));
    let scheduler = Scheduler::new(coordinator);
    scheduler.spawn_all(&cfg.intervals);

    let mut router = api::router(AppState::new(scheduler));
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "metrics endpoint disabled"),
    }

    Ok(router.into())
}
