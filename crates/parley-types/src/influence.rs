//! Influence events
//!
//! An agent's influence score is never stored; it is a decayed fold over the
//! agent's append-only events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AgentId, InfluenceEventId, SessionId};

/// Why an influence delta was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfluenceReason {
    NegotiationWon,
    NegotiationLost,
    FairDealBonus,
    TimeoutPenalty,
}

impl InfluenceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NegotiationWon => "NEGOTIATION_WON",
            Self::NegotiationLost => "NEGOTIATION_LOST",
            Self::FairDealBonus => "FAIR_DEAL_BONUS",
            Self::TimeoutPenalty => "TIMEOUT_PENALTY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEGOTIATION_WON" => Some(Self::NegotiationWon),
            "NEGOTIATION_LOST" => Some(Self::NegotiationLost),
            "FAIR_DEAL_BONUS" => Some(Self::FairDealBonus),
            "TIMEOUT_PENALTY" => Some(Self::TimeoutPenalty),
            _ => None,
        }
    }
}

impl fmt::Display for InfluenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single signed influence delta, causally linked to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluenceEvent {
    pub event_id: InfluenceEventId,
    pub agent_id: AgentId,
    pub delta: f64,
    pub reason: InfluenceReason,
    pub session_id: SessionId,
    pub recorded_at: DateTime<Utc>,
}

impl InfluenceEvent {
    pub fn new(
        agent_id: AgentId,
        delta: f64,
        reason: InfluenceReason,
        session_id: SessionId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: InfluenceEventId::new(),
            agent_id,
            delta,
            reason,
            session_id,
            recorded_at,
        }
    }
}
