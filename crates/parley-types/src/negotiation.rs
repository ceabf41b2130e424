//! Negotiation types
//!
//! Offers, session states and resolutions. The state machine itself lives in
//! `parley-negotiation`; these are the values it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AgentId, Amount, Terms};

/// What an offer asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    /// A proposal (or counter-proposal) of terms and value
    #[default]
    Propose,
    /// Reserved withdraw marker: the submitter walks away
    Withdraw,
}

/// An offer as submitted by a participant, before the engine records it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDraft {
    pub terms: Terms,
    pub value_proposed: Amount,
    #[serde(default)]
    pub kind: OfferKind,
}

impl OfferDraft {
    pub fn propose(terms: Terms, value_proposed: Amount) -> Self {
        Self {
            terms,
            value_proposed,
            kind: OfferKind::Propose,
        }
    }

    pub fn withdraw() -> Self {
        Self {
            terms: Terms::new(),
            value_proposed: Amount::zero(),
            kind: OfferKind::Withdraw,
        }
    }

    pub fn is_withdrawal(&self) -> bool {
        self.kind == OfferKind::Withdraw
    }
}

/// A recorded round. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub round_index: u32,
    pub submitter_id: AgentId,
    pub terms: Terms,
    pub value_proposed: Amount,
    pub kind: OfferKind,
    pub timestamp: DateTime<Utc>,
}

/// Protocol state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Open,
    Accepted,
    Rejected,
    Expired,
    Cancelled,
}

impl SessionState {
    /// All states except OPEN are terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Why a session ended REJECTED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// A participant submitted the withdraw marker
    Withdrawn { by: AgentId },
    /// The round cap was reached without agreement. No fault is attributed.
    Exhausted { rounds: u32 },
}

/// Terminal outcome of a session. Set exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Accepted {
        terms: Terms,
        value: Amount,
        /// Submitter of the matched offer; receives the value
        proposer: AgentId,
        /// Submitter of the matching offer; pays the value
        acceptor: AgentId,
    },
    Rejected {
        reason: RejectionReason,
    },
    Expired {
        /// Party that did not answer the last offer, if any
        stalled: Option<AgentId>,
    },
    Cancelled {
        by: AgentId,
    },
}

impl Resolution {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Accepted { .. } => SessionState::Accepted,
            Self::Rejected { .. } => SessionState::Rejected,
            Self::Expired { .. } => SessionState::Expired,
            Self::Cancelled { .. } => SessionState::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_open_is_live() {
        assert!(!SessionState::Open.is_terminal());
        for s in [
            SessionState::Accepted,
            SessionState::Rejected,
            SessionState::Expired,
            SessionState::Cancelled,
        ] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn test_resolution_maps_to_state() {
        let by = AgentId::new();
        assert_eq!(Resolution::Cancelled { by }.state(), SessionState::Cancelled);
        assert_eq!(
            Resolution::Rejected {
                reason: RejectionReason::Exhausted { rounds: 5 }
            }
            .state(),
            SessionState::Rejected
        );
    }

    #[test]
    fn test_draft_defaults_to_propose_when_kind_missing() {
        let draft: OfferDraft =
            serde_json::from_str(r#"{"terms":{"price":{"number":"50"}},"value_proposed":50}"#).unwrap();
        assert_eq!(draft.kind, OfferKind::Propose);
        assert_eq!(draft.value_proposed, Amount::new(50));
    }
}
