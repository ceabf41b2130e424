//! Settlement coordinator
//!
//! Owns the path from a resolved session to committed ledger state. Every
//! settlement goes through [`LedgerStore::commit`] so the value transfer and
//! the influence deltas land together or not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_ledger::{CommitMode, InfluenceLedger, LedgerStore, LedgerUnit, TransferIntent};
use parley_types::{
    AgentId, Amount, CommitKind, DomainEvent, ParleyError, Result, SessionId, SettlementRecord,
};
use tracing::{debug, info, warn};

use crate::{EventOutbox, ScoringPolicy};

/// An accepted deal ready to settle. `from_agent` pays `to_agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementRequest {
    pub session_id: SessionId,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub amount: Amount,
}

/// Applies resolutions to the value and influence ledgers
pub struct SettlementCoordinator {
    store: Arc<dyn LedgerStore>,
    influence: Arc<InfluenceLedger>,
    scoring: ScoringPolicy,
    outbox: EventOutbox,
}

impl SettlementCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, scoring: ScoringPolicy, outbox: EventOutbox) -> Self {
        let influence = Arc::new(InfluenceLedger::new(store.clone(), scoring.half_life_secs));
        Self {
            store,
            influence,
            scoring,
            outbox,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn influence(&self) -> &Arc<InfluenceLedger> {
        &self.influence
    }

    pub fn scoring(&self) -> &ScoringPolicy {
        &self.scoring
    }

    /// Settle an accepted deal
    ///
    /// Idempotent per session: a second call returns the recorded result,
    /// writes nothing and emits nothing. A FAILED result is returned as a
    /// record, not an error; callers inspect [`SettlementRecord::error`].
    pub async fn settle(&self, request: &SettlementRequest) -> Result<SettlementRecord> {
        self.settle_with(request, CommitMode::FirstAttempt, Utc::now()).await
    }

    /// Re-attempt a FAILED settlement, typically after the payer was funded
    ///
    /// A COMPLETED record is returned unchanged. Asking to retry a session
    /// that never attempted settlement is a conflict.
    pub async fn retry_failed(&self, request: &SettlementRequest) -> Result<SettlementRecord> {
        match self.store.settlement(&request.session_id).await? {
            None => Err(ParleyError::SettlementConflict {
                session_id: request.session_id,
                reason: "no settlement has been attempted".to_string(),
            }),
            Some(record) if record.is_completed() => Ok(record),
            Some(record) if record.kind != CommitKind::Acceptance => Err(ParleyError::SettlementConflict {
                session_id: request.session_id,
                reason: format!("recorded settlement is a {} commit", record.kind.as_str()),
            }),
            Some(_) => self.settle_with(request, CommitMode::Remediation, Utc::now()).await,
        }
    }

    async fn settle_with(
        &self,
        request: &SettlementRequest,
        mode: CommitMode,
        at: DateTime<Utc>,
    ) -> Result<SettlementRecord> {
        if request.from_agent == request.to_agent {
            return Err(ParleyError::InvalidParticipants {
                agent_id: request.from_agent,
            });
        }

        let transfer = (!request.amount.is_zero()).then_some(TransferIntent {
            from: request.from_agent,
            to: request.to_agent,
            amount: request.amount,
        });
        let unit = LedgerUnit {
            session_id: request.session_id,
            kind: CommitKind::Acceptance,
            transfer,
            influence: self.scoring.acceptance_events(
                request.session_id,
                [request.from_agent, request.to_agent],
                request.amount,
                at,
            ),
            at,
        };

        let outcome = self.store.commit(unit, mode).await?;
        let record = outcome.record;
        if outcome.replayed {
            debug!(session_id = %request.session_id, status = record.status.as_str(), "Settlement replayed");
            return Ok(record);
        }

        if record.is_completed() {
            self.influence.invalidate([&request.from_agent, &request.to_agent]);
            info!(
                session_id = %request.session_id,
                from = %request.from_agent,
                to = %request.to_agent,
                amount = %request.amount,
                attempts = record.attempts,
                "Settlement completed"
            );
            self.outbox.enqueue(DomainEvent::SettlementCompleted {
                session_id: request.session_id,
                transfer: record.transfer.clone(),
            });
        } else {
            let reason = record
                .failure
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "settlement failed".to_string());
            warn!(
                session_id = %request.session_id,
                attempts = record.attempts,
                reason = %reason,
                "Settlement failed"
            );
            self.outbox.enqueue(DomainEvent::SettlementFailed {
                session_id: request.session_id,
                reason,
            });
        }
        Ok(record)
    }

    /// Record the timeout penalty for an expired session
    ///
    /// Goes through the same idempotent commit path as acceptance, so a sweep
    /// that races with another sweep applies the penalty once.
    pub async fn penalize_timeout(&self, session_id: SessionId, stalled: AgentId) -> Result<SettlementRecord> {
        let at = Utc::now();
        let unit = LedgerUnit {
            session_id,
            kind: CommitKind::Expiry,
            transfer: None,
            influence: vec![self.scoring.expiry_event(session_id, stalled, at)],
            at,
        };

        let outcome = self.store.commit(unit, CommitMode::FirstAttempt).await?;
        if !outcome.replayed {
            self.influence.invalidate([&stalled]);
            info!(%session_id, agent_id = %stalled, "Timeout penalty recorded");
        }
        Ok(outcome.record)
    }

    /// Recorded settlement for a session, if any
    pub async fn status(&self, session_id: &SessionId) -> Result<Option<SettlementRecord>> {
        Ok(self.store.settlement(session_id).await?)
    }
}
