//! Domain events handed to the external notification dispatcher
//!
//! The core's contract ends at enqueue. Delivery is at-least-once, so each
//! event travels inside an envelope with a monotonic id for de-duplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{LedgerTransfer, Resolution, SessionId};

/// Events emitted by the engine and the settlement coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A session reached a terminal state
    SessionResolved {
        session_id: SessionId,
        resolution: Resolution,
    },

    /// Ledger effects of a resolution were committed. `transfer` is `None` for
    /// zero-value deals and for timeout penalties.
    SettlementCompleted {
        session_id: SessionId,
        transfer: Option<LedgerTransfer>,
    },

    /// Settlement could not be applied and needs remediation
    SettlementFailed {
        session_id: SessionId,
        reason: String,
    },
}

impl DomainEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::SessionResolved { session_id, .. }
            | Self::SettlementCompleted { session_id, .. }
            | Self::SettlementFailed { session_id, .. } => *session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionResolved { .. } => "SessionResolved",
            Self::SettlementCompleted { .. } => "SettlementCompleted",
            Self::SettlementFailed { .. } => "SettlementFailed",
        }
    }
}

/// Envelope placed on the outbound queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event_id: Ulid,
    pub enqueued_at: DateTime<Utc>,
    pub event: DomainEvent,
}

impl OutboundEvent {
    pub fn new(event_id: Ulid, event: DomainEvent) -> Self {
        Self {
            event_id,
            enqueued_at: Utc::now(),
            event,
        }
    }
}
