//! Influence deltas for resolved sessions

use chrono::{DateTime, Utc};
use parley_types::{AgentId, Amount, InfluenceEvent, InfluenceReason, SessionId};
use serde::{Deserialize, Serialize};

/// Scoring constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Time constant of the exponential decay, in seconds
    #[serde(default = "default_half_life_secs")]
    pub half_life_secs: f64,

    /// Bonus for any completed deal
    #[serde(default = "default_fair_deal_base")]
    pub fair_deal_base: f64,

    /// Additional bonus per unit of settled value
    #[serde(default = "default_fair_deal_per_unit")]
    pub fair_deal_per_unit: f64,

    /// Upper bound on the magnitude of any single event
    #[serde(default = "default_max_event_delta")]
    pub max_event_delta: f64,

    /// Magnitude of the penalty for stalling a session into expiry
    #[serde(default = "default_timeout_penalty")]
    pub timeout_penalty: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            half_life_secs: default_half_life_secs(),
            fair_deal_base: default_fair_deal_base(),
            fair_deal_per_unit: default_fair_deal_per_unit(),
            max_event_delta: default_max_event_delta(),
            timeout_penalty: default_timeout_penalty(),
        }
    }
}

fn default_half_life_secs() -> f64 {
    2_592_000.0 // 30 days
}

fn default_fair_deal_base() -> f64 {
    1.0
}

fn default_fair_deal_per_unit() -> f64 {
    0.01
}

fn default_max_event_delta() -> f64 {
    10.0
}

fn default_timeout_penalty() -> f64 {
    5.0
}

impl ScoringPolicy {
    /// Check the constants are usable
    pub fn validate(&self) -> Result<(), String> {
        if !(self.half_life_secs.is_finite() && self.half_life_secs > 0.0) {
            return Err("half_life_secs must be positive".to_string());
        }
        if self.fair_deal_base < 0.0 || self.fair_deal_per_unit < 0.0 || self.timeout_penalty < 0.0 {
            return Err("scoring magnitudes must not be negative".to_string());
        }
        if self.max_event_delta < self.fair_deal_base {
            return Err("max_event_delta must be at least fair_deal_base".to_string());
        }
        Ok(())
    }

    /// Bonus each participant receives for a settled deal of `value`
    pub fn fair_deal_bonus(&self, value: Amount) -> f64 {
        (self.fair_deal_base + self.fair_deal_per_unit * value.as_f64()).min(self.max_event_delta)
    }

    /// Signed delta applied to the stalling party
    pub fn timeout_penalty_delta(&self) -> f64 {
        -self.timeout_penalty.min(self.max_event_delta)
    }

    /// One equal FAIR_DEAL_BONUS per participant
    pub fn acceptance_events(
        &self,
        session_id: SessionId,
        participants: [AgentId; 2],
        value: Amount,
        at: DateTime<Utc>,
    ) -> Vec<InfluenceEvent> {
        let bonus = self.fair_deal_bonus(value);
        participants
            .into_iter()
            .map(|agent| InfluenceEvent::new(agent, bonus, InfluenceReason::FairDealBonus, session_id, at))
            .collect()
    }

    pub fn expiry_event(&self, session_id: SessionId, stalled: AgentId, at: DateTime<Utc>) -> InfluenceEvent {
        InfluenceEvent::new(
            stalled,
            self.timeout_penalty_delta(),
            InfluenceReason::TimeoutPenalty,
            session_id,
            at,
        )
    }
}
