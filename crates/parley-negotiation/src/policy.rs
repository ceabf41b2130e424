//! Engine-wide negotiation policy

use serde::{Deserialize, Serialize};

/// Global limits enforced by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationPolicy {
    /// Concurrent OPEN sessions any one agent may take part in
    #[serde(default = "default_max_open_sessions_per_agent")]
    pub max_open_sessions_per_agent: usize,

    /// Round cap; reaching it without agreement rejects the session
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Session lifetime when the opener does not ask for one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default)]
    pub min_offer_value: u64,

    #[serde(default = "default_max_offer_value")]
    pub max_offer_value: u64,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            max_open_sessions_per_agent: default_max_open_sessions_per_agent(),
            max_rounds: default_max_rounds(),
            default_ttl_secs: default_ttl_secs(),
            min_offer_value: 0,
            max_offer_value: default_max_offer_value(),
        }
    }
}

fn default_max_open_sessions_per_agent() -> usize {
    8
}

fn default_max_rounds() -> u32 {
    10
}

fn default_ttl_secs() -> u64 {
    86_400
}

fn default_max_offer_value() -> u64 {
    10_000_000
}

impl NegotiationPolicy {
    /// Smallest usable round cap: an opening offer plus one answer
    pub const MIN_ROUNDS: u32 = 2;

    pub fn validate(&self) -> Result<(), String> {
        if self.max_rounds < Self::MIN_ROUNDS {
            return Err(format!("max_rounds must be at least {}", Self::MIN_ROUNDS));
        }
        if self.max_open_sessions_per_agent == 0 {
            return Err("max_open_sessions_per_agent must be positive".to_string());
        }
        if self.default_ttl_secs == 0 {
            return Err("default_ttl_secs must be positive".to_string());
        }
        if self.min_offer_value > self.max_offer_value {
            return Err("min_offer_value exceeds max_offer_value".to_string());
        }
        Ok(())
    }
}

/// Per-session overrides supplied when opening
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Lifetime in seconds; falls back to the policy default
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    /// May lower the policy round cap, never raise it
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

impl SessionOptions {
    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }
}
