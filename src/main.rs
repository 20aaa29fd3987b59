//! LMS: Last Man Standing football pool
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the database, seeds the administrator, and runs the adaptive
//! fixture scheduler until Ctrl+C.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use lms::clock::{Clock, SystemClock};
use lms::config::AppConfig;
use lms::data::football_data::FootballDataClient;
use lms::engine::competition::Competition;
use lms::engine::scheduler::Scheduler;
use lms::engine::sync::SyncEngine;
use lms::storage::{Store, Upserted};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    info!(
        pool = %cfg.pool.name,
        competition = %cfg.fixture_source.competition,
        "LMS starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = Store::connect(&cfg.database.url, cfg.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database: {}", cfg.database.url))?;

    let api_key = match AppConfig::resolve_env(&cfg.fixture_source.api_key_env) {
        Ok(key) => Some(SecretString::new(key)),
        Err(e) => {
            warn!(error = %e, "Fixture API key missing; syncs will fail until it is set");
            None
        }
    };
    let source = FootballDataClient::new(
        &cfg.fixture_source.base_url,
        &cfg.fixture_source.competition,
        api_key,
        cfg.fixture_source.timeout(),
    )?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sync = Arc::new(SyncEngine::new(Arc::new(source), cfg.fixture_source.timeout()));
    let competition = Competition::new(store.clone(), Arc::clone(&sync), Arc::clone(&clock));

    match competition.ensure_admin(&cfg.pool.admin_name).await? {
        Upserted::Created(admin) => info!(user = admin.id, "Administrator created"),
        Upserted::Existing(admin) => info!(user = admin.id, "Administrator present"),
    }

    // -- Scheduler loop --------------------------------------------------

    let scheduler = Scheduler::new(sync, store, clock, cfg.scheduler.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    info!("Scheduler running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    handle.await.context("Scheduler task panicked")?;

    info!("LMS shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lms=info"));

    let json_logging = std::env::var("LMS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
