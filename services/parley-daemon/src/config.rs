//! Daemon Configuration
//!
//! Configuration management for the Parley daemon.
//! Supports environment variables, config files, and CLI arguments.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parley_negotiation::NegotiationPolicy;
use parley_settlement::ScoringPolicy;
use parley_types::AgentId;
use serde::{Deserialize, Serialize};

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Ledger store
    #[serde(default)]
    pub store: StoreConfig,

    /// Negotiation limits
    #[serde(default)]
    pub negotiation: NegotiationPolicy,

    /// Influence scoring constants
    #[serde(default)]
    pub scoring: ScoringPolicy,

    /// Expiry sweep and eviction
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Agents admitted to negotiations
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite connection URL. Without one, ledgers live in memory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// Longest eviction age accepted by validation (100 years)
const MAX_EVICTION_AGE_SECS: u64 = 100 * 365 * 86_400;

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Resolved sessions older than this are evicted from the registry
    #[serde(default = "default_eviction_age")]
    pub eviction_age_secs: u64,

    /// Time allowed for the dispatcher to drain on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            eviction_age_secs: default_eviction_age(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn eviction_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.eviction_age_secs.min(MAX_EVICTION_AGE_SECS) as i64)
    }

    /// Resolution time before which sessions are evicted, if representable
    pub fn eviction_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.eviction_age())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Agent directory settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Registered agents. Empty admits every agent.
    #[serde(default)]
    pub agents: Vec<AgentId>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_max_connections() -> u32 {
    5
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_eviction_age() -> u64 {
    7 * 86_400 // 7 days
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl DaemonConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // Environment variables with PARLEY__ prefix, e.g. PARLEY__NEGOTIATION__MAX_ROUNDS
        builder = builder.add_source(
            config::Environment::with_prefix("PARLEY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to read configuration")?;
        config
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.negotiation
            .validate()
            .map_err(|e| anyhow::anyhow!("negotiation: {e}"))?;
        self.scoring
            .validate()
            .map_err(|e| anyhow::anyhow!("scoring: {e}"))?;

        if self.scheduler.sweep_interval_secs == 0 {
            anyhow::bail!("scheduler: sweep_interval_secs must be positive");
        }
        if self.scheduler.eviction_age_secs > MAX_EVICTION_AGE_SECS {
            anyhow::bail!(
                "scheduler: eviction_age_secs must be at most {}",
                MAX_EVICTION_AGE_SECS
            );
        }
        if self.store.max_connections == 0 {
            anyhow::bail!("store: max_connections must be positive");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!("logging: unknown format {:?}", self.logging.format);
        }
        Ok(())
    }
}
