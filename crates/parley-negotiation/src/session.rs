//! Two-party negotiation state machine
//!
//! ```text
//!          ┌──────────── matching terms ───────────► ACCEPTED
//!          │
//!  OPEN ───┼──── withdraw marker / round cap ──────► REJECTED
//!          │
//!          ├──── swept past expires_at ────────────► EXPIRED
//!          │
//!          └──── participant cancels ──────────────► CANCELLED
//! ```
//!
//! The session has no execution context of its own. Time only matters when
//! the engine asks; every method takes the evaluation instant explicitly.

use chrono::{DateTime, Utc};
use parley_types::{
    AgentId, Offer, OfferDraft, OfferKind, ParleyError, RejectionReason, Resolution, Result,
    SessionId, SessionState,
};
use serde::{Deserialize, Serialize};

/// Effect of a submitted offer
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Round recorded, session still OPEN
    Continued,
    /// Round recorded and the session reached a terminal state
    Resolved(Resolution),
}

/// One negotiation between exactly two agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub session_id: SessionId,
    pub participants: [AgentId; 2],
    pub state: SessionState,
    pub rounds: Vec<Offer>,
    pub max_rounds: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolution: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl NegotiationSession {
    /// Open a session with `opener`'s offer as round 0
    pub fn open(
        session_id: SessionId,
        opener: AgentId,
        counterpart: AgentId,
        initial: OfferDraft,
        max_rounds: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self> {
        if opener == counterpart {
            return Err(ParleyError::InvalidParticipants { agent_id: opener });
        }
        if initial.is_withdrawal() {
            return Err(ParleyError::invalid_offer("a session cannot open with a withdrawal"));
        }

        Ok(Self {
            session_id,
            participants: [opener, counterpart],
            state: SessionState::Open,
            rounds: vec![Offer {
                round_index: 0,
                submitter_id: opener,
                terms: initial.terms,
                value_proposed: initial.value_proposed,
                kind: OfferKind::Propose,
                timestamp: created_at,
            }],
            max_rounds,
            created_at,
            expires_at,
            resolution: None,
            resolved_at: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn is_participant(&self, agent: &AgentId) -> bool {
        self.participants.contains(agent)
    }

    /// The other participant
    pub fn counterpart(&self, agent: &AgentId) -> Option<AgentId> {
        match self.participants {
            [a, b] if a == *agent => Some(b),
            [a, b] if b == *agent => Some(a),
            _ => None,
        }
    }

    pub fn last_offer(&self) -> Option<&Offer> {
        self.rounds.last()
    }

    /// OPEN and at or past its deadline
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now >= self.expires_at
    }

    /// Participant who did not submit the most recent offer.
    /// `None` when no round has been recorded.
    pub fn stalled_party(&self) -> Option<AgentId> {
        self.last_offer()
            .and_then(|offer| self.counterpart(&offer.submitter_id))
    }

    fn ensure_participant(&self, agent: &AgentId) -> Result<()> {
        if self.is_participant(agent) {
            Ok(())
        } else {
            Err(ParleyError::NotAParticipant {
                session_id: self.session_id,
                agent_id: *agent,
            })
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ParleyError::SessionClosed {
                session_id: self.session_id,
                state: self.state,
            })
        }
    }

    /// Record `draft` as the next round and evaluate termination
    ///
    /// An offer whose terms equal the preceding offer from the other
    /// participant is an acceptance of that offer. A participant may re-offer
    /// after their own offer; that is a revision, never an acceptance.
    pub fn submit(&mut self, agent: AgentId, draft: OfferDraft, at: DateTime<Utc>) -> Result<Transition> {
        self.ensure_participant(&agent)?;
        self.ensure_open()?;
        if self.rounds.len() >= self.max_rounds as usize {
            return Err(ParleyError::RoundLimitExceeded {
                session_id: Some(self.session_id),
                max_rounds: self.max_rounds,
            });
        }

        let accepted = match self.last_offer() {
            Some(previous) if !draft.is_withdrawal() => {
                previous.submitter_id != agent
                    && previous.kind == OfferKind::Propose
                    && previous.terms == draft.terms
            }
            _ => false,
        };
        let matched = self
            .last_offer()
            .filter(|_| accepted)
            .map(|previous| (previous.submitter_id, previous.value_proposed));

        let kind = draft.kind;
        self.rounds.push(Offer {
            round_index: self.rounds.len() as u32,
            submitter_id: agent,
            terms: draft.terms,
            value_proposed: draft.value_proposed,
            kind,
            timestamp: at,
        });

        let resolution = if let Some((proposer, value)) = matched {
            Resolution::Accepted {
                terms: self.rounds[self.rounds.len() - 1].terms.clone(),
                value,
                proposer,
                acceptor: agent,
            }
        } else if kind == OfferKind::Withdraw {
            Resolution::Rejected {
                reason: RejectionReason::Withdrawn { by: agent },
            }
        } else if self.rounds.len() >= self.max_rounds as usize {
            Resolution::Rejected {
                reason: RejectionReason::Exhausted {
                    rounds: self.rounds.len() as u32,
                },
            }
        } else {
            return Ok(Transition::Continued);
        };

        self.resolve(resolution.clone(), at);
        Ok(Transition::Resolved(resolution))
    }

    /// Either participant may cancel while OPEN
    pub fn cancel(&mut self, agent: AgentId, at: DateTime<Utc>) -> Result<Resolution> {
        self.ensure_participant(&agent)?;
        self.ensure_open()?;
        let resolution = Resolution::Cancelled { by: agent };
        self.resolve(resolution.clone(), at);
        Ok(resolution)
    }

    /// Move an OPEN session to EXPIRED. The caller decides whether it is due.
    pub fn expire(&mut self, at: DateTime<Utc>) -> Result<Resolution> {
        self.ensure_open()?;
        let resolution = Resolution::Expired {
            stalled: self.stalled_party(),
        };
        self.resolve(resolution.clone(), at);
        Ok(resolution)
    }

    fn resolve(&mut self, resolution: Resolution, at: DateTime<Utc>) {
        debug_assert!(self.resolution.is_none());
        self.state = resolution.state();
        self.resolution = Some(resolution);
        self.resolved_at = Some(at);
    }
}
