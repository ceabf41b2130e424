//! Parley Daemon
//!
//! Hosts the negotiation engine for agent-to-agent negotiations and runs the
//! two collaborators the engine relies on but does not own:
//!
//! - the **scheduler**, which sweeps expired sessions and evicts old resolved
//!   ones on a fixed interval
//! - the **dispatcher**, which drains the event outbox and hands each event
//!   to the notification log
//!
//! # Usage
//!
//! ```bash
//! # In-memory ledgers
//! parley-daemon
//!
//! # Durable ledgers
//! parley-daemon --database-url sqlite://parley.db?mode=rwc
//!
//! # Environment overrides
//! PARLEY__NEGOTIATION__MAX_ROUNDS=6 parley-daemon
//! ```

mod config;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley_ledger::{InMemoryStore, LedgerStore, SqliteStore};
use parley_negotiation::{AgentDirectory, InMemoryDirectory, NegotiationEngine, OpenDirectory};
use parley_settlement::{EventOutbox, OutboxReceiver, SettlementCoordinator};

use crate::config::DaemonConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Parley Daemon - negotiation and settlement engine
#[derive(Parser, Debug)]
#[command(name = "parley-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PARLEY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "PARLEY_LOG_FORMAT")]
    log_format: Option<String>,

    /// SQLite connection URL; in-memory ledgers when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Seconds between expiry sweeps
    #[arg(long, env = "PARLEY_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut daemon_config = DaemonConfig::load(args.config.as_deref())?;
    apply_overrides(&mut daemon_config, args);

    init_logging(&daemon_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Parley daemon"
    );

    daemon_config.validate()?;

    let store = init_store(&daemon_config.store).await?;
    let (outbox, receiver) = EventOutbox::channel();
    let coordinator = Arc::new(SettlementCoordinator::new(
        store,
        daemon_config.scoring.clone(),
        outbox.clone(),
    ));
    let engine = Arc::new(NegotiationEngine::new(
        daemon_config.negotiation.clone(),
        init_directory(&daemon_config.directory),
        coordinator,
        outbox,
    ));

    tracing::info!(
        max_rounds = daemon_config.negotiation.max_rounds,
        max_open_sessions_per_agent = daemon_config.negotiation.max_open_sessions_per_agent,
        half_life_secs = daemon_config.scoring.half_life_secs,
        "Negotiation engine ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(run_dispatcher(receiver));
    let scheduler = spawn_scheduler(engine.clone(), &daemon_config, shutdown_rx);

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task failed");
    }

    // Dropping the engine closes the outbox, which lets the dispatcher finish
    drop(engine);
    let timeout = daemon_config.scheduler.shutdown_timeout();
    match tokio::time::timeout(timeout, dispatcher).await {
        Ok(Ok(dispatched)) => tracing::info!(dispatched, "Dispatcher drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "Dispatcher task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Dispatcher did not drain before timeout"
        ),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut DaemonConfig, args: Args) {
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(url) = args.database_url {
        config.store.database_url = Some(url);
    }
    if let Some(secs) = args.sweep_interval_secs {
        config.scheduler.sweep_interval_secs = secs;
    }
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level")?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }

    Ok(())
}

/// Open the ledger store named by the configuration
async fn init_store(config: &config::StoreConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to ledger database...");
            let store = SqliteStore::connect(url, config.max_connections)
                .await
                .context("failed to open ledger database")?;
            tracing::info!(max_connections = config.max_connections, "Ledger database ready");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("No database URL configured, ledgers are held in memory");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn init_directory(config: &config::DirectoryConfig) -> Arc<dyn AgentDirectory> {
    if config.agents.is_empty() {
        tracing::info!("Agent directory open to all agents");
        Arc::new(OpenDirectory)
    } else {
        tracing::info!(agents = config.agents.len(), "Agent directory loaded");
        Arc::new(config.agents.iter().copied().collect::<InMemoryDirectory>())
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

/// Periodically expire stale sessions and evict old resolved ones
fn spawn_scheduler(
    engine: Arc<NegotiationEngine>,
    config: &DaemonConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let scheduler = config.scheduler.clone();
    let interval = scheduler.sweep_interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = engine.sweep_expired().await;
                    if report.failed > 0 {
                        tracing::warn!(failed = report.failed, "Some expired sessions remain open");
                    }

                    let Some(cutoff) = scheduler.eviction_cutoff(Utc::now()) else {
                        continue;
                    };
                    for session in engine.evict_resolved(cutoff).await {
                        match serde_json::to_string(&session) {
                            Ok(json) => tracing::debug!(session_id = %session.session_id, archived = %json, "Session archived"),
                            Err(e) => tracing::warn!(session_id = %session.session_id, error = %e, "Failed to serialize evicted session"),
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
            }
        }
    })
}

/// Drain the outbox until every sender is gone; returns the number of events
async fn run_dispatcher(mut receiver: OutboxReceiver) -> u64 {
    let mut dispatched = 0u64;
    while let Some(envelope) = receiver.recv().await {
        match serde_json::to_string(&envelope) {
            Ok(payload) => tracing::info!(
                event_id = %envelope.event_id,
                event = envelope.event.name(),
                session_id = %envelope.event.session_id(),
                payload = %payload,
                "Event dispatched"
            ),
            Err(e) => tracing::warn!(event_id = %envelope.event_id, error = %e, "Failed to serialize event"),
        }
        dispatched += 1;
    }
    dispatched
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_settlement::ScoringPolicy;
    use parley_types::{AgentId, Amount, OfferDraft, Terms};

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["parley-daemon", "--sweep-interval-secs", "5", "--log-format", "json"]);
        let mut config = DaemonConfig::default();
        apply_overrides(&mut config, args);
        assert_eq!(config.scheduler.sweep_interval_secs, 5);
        assert_eq!(config.logging.format, "json");
        assert!(config.store.database_url.is_none());
    }

    #[tokio::test]
    async fn test_dispatcher_drains_until_senders_close() {
        let (outbox, receiver) = EventOutbox::channel();
        let coordinator = Arc::new(SettlementCoordinator::new(
            Arc::new(InMemoryStore::new()),
            ScoringPolicy::default(),
            outbox.clone(),
        ));
        let engine = NegotiationEngine::new(
            Default::default(),
            Arc::new(OpenDirectory),
            coordinator,
            outbox,
        );
        let dispatcher = tokio::spawn(run_dispatcher(receiver));

        let (a, b) = (AgentId::new(), AgentId::new());
        let terms = Terms::new().with("price", 0i64);
        let session = engine
            .open_session(a, b, OfferDraft::propose(terms.clone(), Amount::zero()), Default::default())
            .await
            .unwrap();
        engine
            .submit_offer(session.session_id, b, OfferDraft::propose(terms, Amount::zero()))
            .await
            .unwrap();

        drop(engine);
        // SessionResolved + SettlementCompleted
        assert_eq!(dispatcher.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_survives_extreme_eviction_age() {
        let (outbox, _receiver) = EventOutbox::channel();
        let coordinator = Arc::new(SettlementCoordinator::new(
            Arc::new(InMemoryStore::new()),
            ScoringPolicy::default(),
            outbox.clone(),
        ));
        let engine = Arc::new(NegotiationEngine::new(
            Default::default(),
            Arc::new(OpenDirectory),
            coordinator,
            outbox,
        ));
        let mut config = DaemonConfig::default();
        config.scheduler.eviction_age_secs = 10_000_000_000_000;

        let (tx, rx) = watch::channel(false);
        let handle = spawn_scheduler(engine, &config, rx);
        tokio::time::sleep(std::time::Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_shutdown() {
        let (outbox, _receiver) = EventOutbox::channel();
        let coordinator = Arc::new(SettlementCoordinator::new(
            Arc::new(InMemoryStore::new()),
            ScoringPolicy::default(),
            outbox.clone(),
        ));
        let engine = Arc::new(NegotiationEngine::new(
            Default::default(),
            Arc::new(OpenDirectory),
            coordinator,
            outbox,
        ));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_scheduler(engine, &DaemonConfig::default(), rx);

        tokio::time::sleep(std::time::Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
