//! Polyflow service binary
//!
//! Serves a cached view of one account-activity feed:
//! - Opens (or creates) the SQLite cache
//! - Builds the retrying upstream source and the sync engine
//! - Spawns the retention sweep task
//! - Serves the HTTP API
//!
//! Usage:
//!   cargo run --release --bin polyflow
//!
//! Environment variables: see `Config::from_env` (all optional).

use polyflow::config::Config;
use polyflow::server::{router, AppState};
use polyflow::sync::query::QueryService;
use polyflow::sync::source::RemoteActivitySource;
use polyflow::sync::store::SqliteActivityStore;
use polyflow::sync::sweeper::retention_sweep_task;
use polyflow::sync::trace::{FetchTrace, FileDumpTrace, NoopTrace};
use polyflow::sync::SyncEngine;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = Config::from_env();
    log::info!("🚀 Starting polyflow...");
    log::info!("📊 Configuration:");
    log::info!("   Upstream: {}", config.base_url);
    log::info!("   Database: {}", config.db_path);
    log::info!(
        "   Window: {} days, refresh floor: {}, batch: {}",
        config.retention_days,
        config.refresh_floor,
        config.batch_size
    );

    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let store = Arc::new(SqliteActivityStore::open(&config.db_path)?);

    let trace: Arc<dyn FetchTrace> = match &config.trace_dump_dir {
        Some(dir) => {
            log::info!("   First-page dumps: {}", dir);
            Arc::new(FileDumpTrace::new(dir.clone()))
        }
        None => Arc::new(NoopTrace),
    };

    let source = Arc::new(
        RemoteActivitySource::new(&config.base_url, config.backoff_policy())?.with_trace(trace),
    );

    let engine = Arc::new(SyncEngine::new(
        source,
        store.clone(),
        config.sync_settings(),
    ));
    let query = Arc::new(QueryService::new(engine, config.batch_size));

    // Background eviction of rows past the retention window
    let sweep_store = store.clone();
    let sweep_config = config.sweep_config();
    tokio::spawn(async move {
        retention_sweep_task(sweep_store, sweep_config).await;
    });

    let state = AppState::new(query, &config.base_url);
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    log::info!("✅ Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
