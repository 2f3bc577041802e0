pub mod adapters;
pub mod aggregator;
pub mod clock;
pub mod commands;
pub mod dashboard;
pub mod db;
pub mod delta;
pub mod fetcher;
pub mod migrations;
pub mod scheduler;
pub mod store;
pub mod types;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::Aggregator;
use crate::clock::{Clock, SystemClock};
use crate::dashboard::Dashboard;
use crate::db::DbPool;
use crate::fetcher::{FetchCache, Fetcher, ReqwestTransport};
use crate::scheduler::TracingSink;
use crate::store::{KvStore, MemoryKvStore, SnapshotStore, SqliteKvStore};
use crate::types::config::PipelineConfig;

/// Initialize structured logging with tracing.
/// Respects RUST_LOG env var; defaults to `info` level for the tezpulse crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tezpulse=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn open_database() -> Result<DbPool, Box<dyn std::error::Error>> {
    let db_path = db::tezpulse_data_dir().join("state").join("tezpulse.sqlite");
    let pool = db::create_pool(&db_path)?;
    db::init_db(&pool)?;
    let applied = migrations::run_pending(&pool)?;
    if !applied.is_empty() {
        info!(?applied, "Applied migrations");
    }
    Ok(pool)
}

/// Wire the pipeline from `config`. Without a database, snapshots live in
/// memory and source health is not persisted.
pub fn build_dashboard(
    config: &PipelineConfig,
    pool: Option<DbPool>,
) -> Result<Dashboard, fetcher::FetchError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
    let fetcher = Fetcher::new(transport, Arc::new(FetchCache::new(config.fetch_ttl())))
        .with_retry(config.max_attempts, config.retry_backoff());
    let aggregator = Aggregator::new(fetcher, config.endpoints(), clock.clone());

    let kv: Arc<dyn KvStore> = match &pool {
        Some(pool) => Arc::new(SqliteKvStore::new(pool.clone())),
        None => Arc::new(MemoryKvStore::new()),
    };
    let store = SnapshotStore::new(
        kv,
        clock.clone(),
        config.snapshot_ttl(),
        config.visit_min_gap(),
    );

    let dashboard = Dashboard::new(aggregator, store, Arc::new(TracingSink), clock, config);
    Ok(match pool {
        Some(pool) => dashboard.with_health_pool(pool),
        None => dashboard,
    })
}

pub fn run() {
    dotenvy::dotenv().ok();
    init_tracing();

    let pool = match open_database() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, "Database unavailable, running without persistence");
            None
        }
    };
    let config = match &pool {
        Some(pool) => commands::config::load_config(pool),
        None => commands::config::apply_env_overrides(PipelineConfig::default(), |key| {
            std::env::var(key).ok()
        }),
    };
    info!(tzkt = %config.tzkt_url, rpc = %config.rpc_url, "Starting tezpulse");

    let dashboard = build_dashboard(&config, pool).expect("Failed to build HTTP client");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to start tokio runtime");

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Ctrl-C handler unavailable");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        dashboard.start();
        dashboard.poll(shutdown_rx).await;
    });
}
