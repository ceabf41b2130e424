//! Error types for Parley
//!
//! Every failure is explicit and falls into one of four categories that tell
//! the caller what to do next.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AgentId, Amount, SessionId, SessionState};

/// Result type for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;

/// Caller-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected synchronously, nothing mutated; retry with corrected input
    Validation,
    /// Rejected synchronously; terminal for the caller, do not retry
    Conflict,
    /// Outcome preserved, effect recorded as failed; remediate out of band
    Resource,
    /// Transaction aborted; retry the whole (idempotent) operation
    Storage,
}

/// Parley error types
#[derive(Debug, Clone, Error)]
pub enum ParleyError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Both participants are the same agent
    #[error("Invalid participants: agent {agent_id} cannot negotiate with itself")]
    InvalidParticipants { agent_id: AgentId },

    /// Agent unknown to the agent directory
    #[error("Agent {agent_id} is not known to the agent directory")]
    UnknownAgent { agent_id: AgentId },

    /// Session not in the registry
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: SessionId },

    /// Caller is not one of the session's participants
    #[error("Agent {agent_id} is not a participant of session {session_id}")]
    NotAParticipant {
        session_id: SessionId,
        agent_id: AgentId,
    },

    /// Round cap reached, or a requested cap outside policy (no session yet)
    #[error(
        "Round limit exceeded{} (max {max_rounds})",
        .session_id.as_ref().map(|id| format!(" in session {id}")).unwrap_or_default()
    )]
    RoundLimitExceeded {
        session_id: Option<SessionId>,
        max_rounds: u32,
    },

    /// Agent already holds the maximum number of open sessions
    #[error("Agent {agent_id} already holds {limit} open sessions")]
    CapacityExceeded { agent_id: AgentId, limit: usize },

    /// Offer rejected before reaching the state machine
    #[error("Invalid offer: {reason}")]
    InvalidOffer { reason: String },

    /// Amount rejected by the ledger
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // ========================================================================
    // Conflict Errors
    // ========================================================================

    /// Session already left OPEN
    #[error("Session {session_id} is closed (state: {state})")]
    SessionClosed {
        session_id: SessionId,
        state: SessionState,
    },

    /// Settlement requested for a session in the wrong state
    #[error("Session {session_id} cannot be settled: {reason}")]
    SettlementConflict {
        session_id: SessionId,
        reason: String,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================

    /// Payer cannot cover the agreed value
    #[error("Insufficient funds for agent {agent_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        agent_id: AgentId,
        requested: Amount,
        available: Amount,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================

    /// Durable store failed; the transaction was rolled back
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl ParleyError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an invalid offer error
    pub fn invalid_offer(reason: impl Into<String>) -> Self {
        Self::InvalidOffer {
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidParticipants { .. }
            | Self::UnknownAgent { .. }
            | Self::SessionNotFound { .. }
            | Self::NotAParticipant { .. }
            | Self::RoundLimitExceeded { .. }
            | Self::CapacityExceeded { .. }
            | Self::InvalidOffer { .. }
            | Self::InvalidAmount { .. } => ErrorCategory::Validation,
            Self::SessionClosed { .. } | Self::SettlementConflict { .. } => ErrorCategory::Conflict,
            Self::InsufficientFunds { .. } => ErrorCategory::Resource,
            Self::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Only storage failures are safe to retry as-is
    pub fn is_retriable(&self) -> bool {
        self.category() == ErrorCategory::Storage
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidParticipants { .. } => "INVALID_PARTICIPANTS",
            Self::UnknownAgent { .. } => "UNKNOWN_AGENT",
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::NotAParticipant { .. } => "NOT_A_PARTICIPANT",
            Self::RoundLimitExceeded { .. } => "ROUND_LIMIT_EXCEEDED",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::InvalidOffer { .. } => "INVALID_OFFER",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::SessionClosed { .. } => "SESSION_CLOSED",
            Self::SettlementConflict { .. } => "SETTLEMENT_CONFLICT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::Storage { .. } => "STORAGE_ERROR",
        }
    }
}
