//! Settlement types
//!
//! A resolved session produces at most one ledger transfer and the influence
//! events for its participants. The settlement record is the idempotency key:
//! one per session, written in the same transaction as its effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AgentId, Amount, InfluenceEvent, ParleyError, SessionId, TransferId};

/// A committed movement of value between two agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransfer {
    pub transfer_id: TransferId,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    /// Always positive
    pub amount: Amount,
    pub session_id: SessionId,
    pub committed_at: DateTime<Utc>,
}

/// Settlement outcome, separate from the negotiation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Completed,
    /// Settlement could not be applied; the negotiation still stands
    Failed,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which terminal outcome a ledger commit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    /// Value transfer plus fair-deal bonuses for an ACCEPTED session
    Acceptance,
    /// Timeout penalty for an EXPIRED session
    Expiry,
}

impl CommitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acceptance => "acceptance",
            Self::Expiry => "expiry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "acceptance" => Some(Self::Acceptance),
            "expiry" => Some(Self::Expiry),
            _ => None,
        }
    }
}

/// Why a settlement was recorded FAILED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementFailure {
    InsufficientFunds {
        agent_id: AgentId,
        requested: Amount,
        available: Amount,
    },
}

impl SettlementFailure {
    pub fn to_error(&self) -> ParleyError {
        match self {
            Self::InsufficientFunds {
                agent_id,
                requested,
                available,
            } => ParleyError::InsufficientFunds {
                agent_id: *agent_id,
                requested: *requested,
                available: *available,
            },
        }
    }
}

impl fmt::Display for SettlementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// Durable result of settling one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub session_id: SessionId,
    pub kind: CommitKind,
    pub status: SettlementStatus,
    pub transfer: Option<LedgerTransfer>,
    pub influence: Vec<InfluenceEvent>,
    /// Set when `status == Failed`
    pub failure: Option<SettlementFailure>,
    /// Number of attempts that produced this record (remediation retries increment it)
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn is_completed(&self) -> bool {
        self.status == SettlementStatus::Completed
    }

    /// The resource error behind a FAILED record, if any
    pub fn error(&self) -> Option<ParleyError> {
        self.failure.as_ref().map(SettlementFailure::to_error)
    }
}
