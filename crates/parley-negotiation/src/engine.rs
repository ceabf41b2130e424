//! Negotiation engine
//!
//! Owns the registry of sessions and the global policy. Each session sits
//! behind its own async mutex, so operations on one session run one at a
//! time while different sessions proceed in parallel. The registry map and
//! the per-agent open counts are guarded by short synchronous locks that are
//! never held across an await.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use parley_ledger::{InfluenceBreakdown, JournalEntry};
use parley_settlement::{EventOutbox, SettlementCoordinator, SettlementRequest};
use parley_types::{
    AgentId, Amount, DomainEvent, InfluenceEvent, OfferDraft, ParleyError, Resolution, Result,
    SessionId, SessionState, SettlementRecord,
};
use tokio::sync::Mutex as SessionLock;
use tracing::{debug, info, warn};

use crate::{AgentDirectory, NegotiationPolicy, NegotiationSession, SessionOptions, Transition};

type SessionHandle = Arc<SessionLock<NegotiationSession>>;

/// Longest accepted session lifetime (100 years)
const MAX_TTL_SECS: u64 = 100 * 365 * 86_400;

/// What happened to settlement as a consequence of an offer
#[derive(Debug, Clone)]
pub enum SettlementProgress {
    /// The offer did not accept the session
    NotApplicable,
    /// Settlement ran; the record may be COMPLETED or FAILED
    Settled(SettlementRecord),
    /// The store failed before anything was written. The session stays
    /// ACCEPTED; call [`NegotiationEngine::settle`] to try again.
    Deferred(ParleyError),
}

/// Result of [`NegotiationEngine::submit_offer`]
#[derive(Debug, Clone)]
pub struct OfferOutcome {
    /// Snapshot after the offer was recorded
    pub session: NegotiationSession,
    pub settlement: SettlementProgress,
}

/// Result of one expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions moved to EXPIRED
    pub expired: Vec<SessionId>,
    /// Sessions busy with another operation; picked up next sweep
    pub skipped: usize,
    /// Sessions left OPEN because the penalty could not be committed
    pub failed: usize,
}

/// Orchestrates concurrent negotiation sessions
pub struct NegotiationEngine {
    policy: NegotiationPolicy,
    directory: Arc<dyn AgentDirectory>,
    coordinator: Arc<SettlementCoordinator>,
    outbox: EventOutbox,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    open_counts: Mutex<HashMap<AgentId, usize>>,
}

impl NegotiationEngine {
    pub fn new(
        policy: NegotiationPolicy,
        directory: Arc<dyn AgentDirectory>,
        coordinator: Arc<SettlementCoordinator>,
        outbox: EventOutbox,
    ) -> Self {
        Self {
            policy,
            directory,
            coordinator,
            outbox,
            sessions: RwLock::new(HashMap::new()),
            open_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &NegotiationPolicy {
        &self.policy
    }

    pub fn coordinator(&self) -> &Arc<SettlementCoordinator> {
        &self.coordinator
    }

    // ------------------------------------------------------------------
    // Protocol operations
    // ------------------------------------------------------------------

    /// Open a session between `opener` and `counterpart` with `initial` as round 0
    pub async fn open_session(
        &self,
        opener: AgentId,
        counterpart: AgentId,
        initial: OfferDraft,
        options: SessionOptions,
    ) -> Result<NegotiationSession> {
        if opener == counterpart {
            return Err(ParleyError::InvalidParticipants { agent_id: opener });
        }
        self.validate_value(&initial)?;

        let max_rounds = options.max_rounds.unwrap_or(self.policy.max_rounds);
        if max_rounds > self.policy.max_rounds || max_rounds < NegotiationPolicy::MIN_ROUNDS {
            return Err(ParleyError::RoundLimitExceeded {
                session_id: None,
                max_rounds: self.policy.max_rounds,
            });
        }

        for agent in [opener, counterpart] {
            if !self.directory.agent_exists(&agent).await? {
                return Err(ParleyError::UnknownAgent { agent_id: agent });
            }
        }

        let session_id = SessionId::new();
        let created_at = Utc::now();
        let ttl_secs = options.ttl_secs.unwrap_or(self.policy.default_ttl_secs);
        let expires_at = created_at + Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64);
        let session = NegotiationSession::open(
            session_id,
            opener,
            counterpart,
            initial,
            max_rounds,
            created_at,
            expires_at,
        )?;

        self.reserve(&[opener, counterpart])?;
        self.sessions
            .write()
            .insert(session_id, Arc::new(SessionLock::new(session.clone())));

        info!(
            %session_id,
            %opener,
            %counterpart,
            max_rounds,
            %expires_at,
            "Session opened"
        );
        Ok(session)
    }

    /// Route an offer to its session and apply the resulting transition
    ///
    /// An offer that accepts the session also triggers settlement. Settlement
    /// problems never undo the acceptance; see [`SettlementProgress`].
    pub async fn submit_offer(
        &self,
        session_id: SessionId,
        agent: AgentId,
        draft: OfferDraft,
    ) -> Result<OfferOutcome> {
        if !draft.is_withdrawal() {
            self.validate_value(&draft)?;
        }
        let handle = self.handle(&session_id)?;

        let mut session = handle.lock().await;
        let now = Utc::now();
        if session.is_participant(&agent) && session.is_expired_at(now) {
            self.expire_locked(&mut session, now).await?;
        }

        let transition = session.submit(agent, draft, now)?;
        let snapshot = session.clone();
        debug!(
            %session_id,
            %agent,
            round = snapshot.rounds.len() - 1,
            "Offer admitted"
        );

        let resolution = match transition {
            Transition::Continued => {
                return Ok(OfferOutcome {
                    session: snapshot,
                    settlement: SettlementProgress::NotApplicable,
                })
            }
            Transition::Resolved(resolution) => resolution,
        };
        self.on_resolved(&snapshot, &resolution);
        drop(session);

        let settlement = match settlement_request(session_id, &resolution) {
            None => SettlementProgress::NotApplicable,
            Some(request) => match self.coordinator.settle(&request).await {
                Ok(record) => SettlementProgress::Settled(record),
                Err(err) => {
                    warn!(%session_id, error = %err, "Settlement deferred");
                    SettlementProgress::Deferred(err)
                }
            },
        };

        Ok(OfferOutcome {
            session: snapshot,
            settlement,
        })
    }

    /// Cancel an OPEN session on behalf of a participant
    pub async fn cancel(&self, session_id: SessionId, agent: AgentId) -> Result<NegotiationSession> {
        let handle = self.handle(&session_id)?;
        let mut session = handle.lock().await;
        let now = Utc::now();
        if session.is_participant(&agent) && session.is_expired_at(now) {
            self.expire_locked(&mut session, now).await?;
        }

        let resolution = session.cancel(agent, now)?;
        self.on_resolved(&session, &resolution);
        Ok(session.clone())
    }

    /// Expire every OPEN session past its deadline
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Expire every OPEN session whose deadline is at or before `now`
    ///
    /// Sessions in the middle of another operation are skipped rather than
    /// waited on; the next sweep picks them up.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let handles: Vec<(SessionId, SessionHandle)> = self
            .sessions
            .read()
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();

        let mut report = SweepReport::default();
        for (session_id, handle) in handles {
            let Ok(mut session) = handle.try_lock() else {
                report.skipped += 1;
                continue;
            };
            if !session.is_expired_at(now) {
                continue;
            }
            match self.expire_locked(&mut session, now).await {
                Ok(_) => report.expired.push(session_id),
                Err(err) => {
                    warn!(%session_id, error = %err, "Expiry deferred, penalty not committed");
                    report.failed += 1;
                }
            }
        }

        if !report.expired.is_empty() || report.skipped > 0 || report.failed > 0 {
            info!(
                expired = report.expired.len(),
                skipped = report.skipped,
                failed = report.failed,
                "Expiry sweep finished"
            );
        }
        report
    }

    /// Settle an ACCEPTED session. Idempotent; returns the recorded result
    /// when settlement already ran.
    pub async fn settle(&self, session_id: SessionId) -> Result<SettlementRecord> {
        let request = self.accepted_request(&session_id).await?;
        self.coordinator.settle(&request).await
    }

    /// Re-attempt a FAILED settlement after the payer has been funded
    pub async fn retry_settlement(&self, session_id: SessionId) -> Result<SettlementRecord> {
        let request = self.accepted_request(&session_id).await?;
        self.coordinator.retry_failed(&request).await
    }

    /// Remove resolved sessions whose resolution is older than `older_than`
    ///
    /// Returns the evicted sessions for archival. Sessions locked by a
    /// concurrent reader are left for a later call, and so are ACCEPTED
    /// sessions whose settlement has not completed: `settle` and
    /// `retry_settlement` need them in the registry.
    pub async fn evict_resolved(&self, older_than: DateTime<Utc>) -> Vec<NegotiationSession> {
        let candidates: Vec<NegotiationSession> = self
            .sessions
            .read()
            .values()
            .filter_map(|handle| {
                let session = handle.try_lock().ok()?;
                match session.resolved_at {
                    Some(resolved_at) if resolved_at < older_than => Some(session.clone()),
                    _ => None,
                }
            })
            .collect();

        let mut evictable = Vec::with_capacity(candidates.len());
        let mut unsettled = 0usize;
        for session in candidates {
            if session.state == SessionState::Accepted && !self.is_settled(&session.session_id).await {
                unsettled += 1;
                continue;
            }
            evictable.push(session);
        }

        // Resolved sessions never change, so the snapshots are still current
        let evicted: Vec<NegotiationSession> = {
            let mut sessions = self.sessions.write();
            evictable
                .into_iter()
                .filter(|session| sessions.remove(&session.session_id).is_some())
                .collect()
        };

        if unsettled > 0 {
            debug!(unsettled, "Kept accepted sessions awaiting settlement");
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), %older_than, "Evicted resolved sessions");
        }
        evicted
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Snapshot of a session, live or resolved
    pub async fn get_session(&self, session_id: SessionId) -> Result<NegotiationSession> {
        let handle = self.handle(&session_id)?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Every registered session the agent takes part in, oldest first
    pub async fn sessions_for_agent(&self, agent: &AgentId) -> Vec<NegotiationSession> {
        let handles: Vec<SessionHandle> = self.sessions.read().values().cloned().collect();
        let mut found = Vec::new();
        for handle in handles {
            let session = handle.lock().await;
            if session.is_participant(agent) {
                found.push(session.clone());
            }
        }
        found.sort_by_key(|s| s.created_at);
        found
    }

    pub fn open_session_count(&self, agent: &AgentId) -> usize {
        self.open_counts.lock().get(agent).copied().unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub async fn settlement_status(&self, session_id: &SessionId) -> Result<Option<SettlementRecord>> {
        self.coordinator.status(session_id).await
    }

    // ------------------------------------------------------------------
    // Ledger access
    // ------------------------------------------------------------------

    /// Credit an agent from outside the system. The only way value is created.
    pub async fn fund(&self, agent: &AgentId, amount: Amount) -> Result<Amount> {
        let balance = self.coordinator.store().fund(agent, amount, Utc::now()).await?;
        info!(agent_id = %agent, %amount, %balance, "Account funded");
        Ok(balance)
    }

    pub async fn balance(&self, agent: &AgentId) -> Result<Amount> {
        Ok(self.coordinator.store().balance(agent).await?)
    }

    /// Sum of all balances; changes only through funding
    pub async fn total_balance(&self) -> Result<u128> {
        Ok(self.coordinator.store().total_balance().await?)
    }

    pub async fn journal(&self, agent: &AgentId) -> Result<Vec<JournalEntry>> {
        Ok(self.coordinator.store().journal(agent).await?)
    }

    /// Ledger postings made by a session's settlement
    pub async fn session_journal(&self, session_id: &SessionId) -> Result<Vec<JournalEntry>> {
        Ok(self.coordinator.store().session_journal(session_id).await?)
    }

    pub async fn influence_score(&self, agent: &AgentId) -> Result<f64> {
        Ok(self.coordinator.influence().score(agent).await?)
    }

    pub async fn influence_score_at(&self, agent: &AgentId, at: DateTime<Utc>) -> Result<f64> {
        Ok(self.coordinator.influence().score_at(agent, at).await?)
    }

    pub async fn influence_breakdown(&self, agent: &AgentId, at: DateTime<Utc>) -> Result<InfluenceBreakdown> {
        Ok(self.coordinator.influence().breakdown_at(agent, at).await?)
    }

    pub async fn influence_history(&self, agent: &AgentId) -> Result<Vec<InfluenceEvent>> {
        let history = self.coordinator.influence().history(agent).await?;
        Ok((*history).clone())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn handle(&self, session_id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or(ParleyError::SessionNotFound {
                session_id: *session_id,
            })
    }

    fn validate_value(&self, draft: &OfferDraft) -> Result<()> {
        let value = draft.value_proposed.0;
        if value < self.policy.min_offer_value || value > self.policy.max_offer_value {
            return Err(ParleyError::invalid_offer(format!(
                "value {} outside [{}, {}]",
                value, self.policy.min_offer_value, self.policy.max_offer_value
            )));
        }
        Ok(())
    }

    /// Count a new OPEN session against both participants, or neither
    fn reserve(&self, participants: &[AgentId; 2]) -> Result<()> {
        let mut counts = self.open_counts.lock();
        for agent in participants {
            if counts.get(agent).copied().unwrap_or(0) >= self.policy.max_open_sessions_per_agent {
                return Err(ParleyError::CapacityExceeded {
                    agent_id: *agent,
                    limit: self.policy.max_open_sessions_per_agent,
                });
            }
        }
        for agent in participants {
            *counts.entry(*agent).or_insert(0) += 1;
        }
        Ok(())
    }

    fn release(&self, participants: &[AgentId; 2]) {
        let mut counts = self.open_counts.lock();
        for agent in participants {
            if let Some(count) = counts.get_mut(agent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(agent);
                }
            }
        }
    }

    async fn is_settled(&self, session_id: &SessionId) -> bool {
        match self.coordinator.status(session_id).await {
            Ok(Some(record)) => record.is_completed(),
            Ok(None) => false,
            Err(err) => {
                warn!(%session_id, error = %err, "Settlement status unavailable");
                false
            }
        }
    }

    /// Bookkeeping shared by every terminal transition
    fn on_resolved(&self, session: &NegotiationSession, resolution: &Resolution) {
        self.release(&session.participants);
        info!(
            session_id = %session.session_id,
            state = %session.state,
            rounds = session.rounds.len(),
            "Session resolved"
        );
        self.outbox.enqueue(DomainEvent::SessionResolved {
            session_id: session.session_id,
            resolution: resolution.clone(),
        });
    }

    /// Commit the timeout penalty, then move the session to EXPIRED.
    ///
    /// The penalty is keyed by session, so a retry after a failed state
    /// change cannot double-apply it. If the commit fails the session stays
    /// OPEN.
    async fn expire_locked(&self, session: &mut NegotiationSession, now: DateTime<Utc>) -> Result<Resolution> {
        if let Some(stalled) = session.stalled_party() {
            self.coordinator
                .penalize_timeout(session.session_id, stalled)
                .await?;
        }
        let resolution = session.expire(now)?;
        self.on_resolved(session, &resolution);
        Ok(resolution)
    }

    async fn accepted_request(&self, session_id: &SessionId) -> Result<SettlementRequest> {
        let handle = self.handle(session_id)?;
        let session = handle.lock().await;
        session
            .resolution
            .as_ref()
            .and_then(|resolution| settlement_request(*session_id, resolution))
            .ok_or_else(|| ParleyError::SettlementConflict {
                session_id: *session_id,
                reason: format!("session is {}, not ACCEPTED", session.state),
            })
    }
}

/// Acceptor pays proposer the matched value
fn settlement_request(session_id: SessionId, resolution: &Resolution) -> Option<SettlementRequest> {
    match resolution {
        Resolution::Accepted {
            value,
            proposer,
            acceptor,
            ..
        } => Some(SettlementRequest {
            session_id,
            from_agent: *acceptor,
            to_agent: *proposer,
            amount: *value,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDirectory;
    use parley_ledger::InMemoryStore;
    use parley_settlement::{OutboxReceiver, ScoringPolicy};
    use parley_types::{SessionState, Terms};

    fn engine_with(policy: NegotiationPolicy) -> (NegotiationEngine, OutboxReceiver, AgentId, AgentId) {
        let (a, b) = (AgentId::new(), AgentId::new());
        let directory = Arc::new(InMemoryDirectory::from_iter([a, b]));
        let (outbox, rx) = EventOutbox::channel();
        let coordinator = Arc::new(SettlementCoordinator::new(
            Arc::new(InMemoryStore::new()),
            ScoringPolicy::default(),
            outbox.clone(),
        ));
        (NegotiationEngine::new(policy, directory, coordinator, outbox), rx, a, b)
    }

    fn offer(price: i64) -> OfferDraft {
        OfferDraft::propose(Terms::new().with("price", price), Amount::new(price as u64))
    }

    #[tokio::test]
    async fn test_open_counts_against_both_agents() {
        let (engine, _rx, a, b) = engine_with(NegotiationPolicy::default());
        engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        assert_eq!(engine.open_session_count(&a), 1);
        assert_eq!(engine.open_session_count(&b), 1);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let policy = NegotiationPolicy {
            max_open_sessions_per_agent: 2,
            ..Default::default()
        };
        let (engine, _rx, a, b) = engine_with(policy);
        for _ in 0..2 {
            engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        }
        let err = engine
            .open_session(b, a, offer(10), SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::CapacityExceeded { limit: 2, .. }));
        assert_eq!(engine.session_count(), 2);
    }

    #[tokio::test]
    async fn test_resolution_frees_capacity() {
        let policy = NegotiationPolicy {
            max_open_sessions_per_agent: 1,
            ..Default::default()
        };
        let (engine, _rx, a, b) = engine_with(policy);
        let s = engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        engine.cancel(s.session_id, b).await.unwrap();
        assert_eq!(engine.open_session_count(&a), 0);
        engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_agent_rejected() {
        let (engine, _rx, a, _) = engine_with(NegotiationPolicy::default());
        let stranger = AgentId::new();
        let err = engine
            .open_session(a, stranger, offer(10), SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::UnknownAgent { agent_id } if agent_id == stranger));
        assert_eq!(engine.open_session_count(&a), 0);
    }

    #[tokio::test]
    async fn test_offer_value_bounds() {
        let policy = NegotiationPolicy {
            max_offer_value: 100,
            ..Default::default()
        };
        let (engine, _rx, a, b) = engine_with(policy);
        let err = engine
            .open_session(a, b, offer(101), SessionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OFFER");

        let s = engine.open_session(a, b, offer(100), SessionOptions::default()).await.unwrap();
        assert!(engine.submit_offer(s.session_id, b, offer(500)).await.is_err());
        // Withdrawal carries no value and bypasses the bounds
        let outcome = engine
            .submit_offer(s.session_id, b, OfferDraft::withdraw())
            .await
            .unwrap();
        assert_eq!(outcome.session.state, SessionState::Rejected);
    }

    #[tokio::test]
    async fn test_round_cap_cannot_exceed_policy() {
        let (engine, _rx, a, b) = engine_with(NegotiationPolicy::default());
        let err = engine
            .open_session(a, b, offer(1), SessionOptions::default().with_max_rounds(11))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParleyError::RoundLimitExceeded { session_id: None, max_rounds: 10 }
        ));
        assert_eq!(err.to_string(), "Round limit exceeded (max 10)");
        assert_eq!(engine.session_count(), 0);
        assert!(engine
            .open_session(a, b, offer(1), SessionOptions::default().with_max_rounds(1))
            .await
            .is_err());
        let s = engine
            .open_session(a, b, offer(1), SessionOptions::default().with_max_rounds(4))
            .await
            .unwrap();
        assert_eq!(s.max_rounds, 4);
    }

    #[tokio::test]
    async fn test_double_cancel_is_conflict() {
        let (engine, mut rx, a, b) = engine_with(NegotiationPolicy::default());
        let s = engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        engine.cancel(s.session_id, a).await.unwrap();
        let err = engine.cancel(s.session_id, b).await.unwrap_err();
        assert_eq!(err.category(), parley_types::ErrorCategory::Conflict);

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].event,
            DomainEvent::SessionResolved {
                resolution: Resolution::Cancelled { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_session() {
        let (engine, _rx, a, _) = engine_with(NegotiationPolicy::default());
        let err = engine.submit_offer(SessionId::new(), a, offer(1)).await.unwrap_err();
        assert!(matches!(err, ParleyError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_settle_requires_acceptance() {
        let (engine, _rx, a, b) = engine_with(NegotiationPolicy::default());
        let s = engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        let err = engine.settle(s.session_id).await.unwrap_err();
        assert!(matches!(err, ParleyError::SettlementConflict { .. }));
    }

    #[tokio::test]
    async fn test_sweep_skips_busy_sessions() {
        let (engine, _rx, a, b) = engine_with(NegotiationPolicy::default());
        let s = engine
            .open_session(a, b, offer(10), SessionOptions::default().with_ttl_secs(0))
            .await
            .unwrap();
        let due = s.expires_at + Duration::seconds(1);

        let handle = engine.handle(&s.session_id).unwrap();
        let guard = handle.lock().await;
        let report = engine.sweep_expired_at(due).await;
        assert_eq!(report.skipped, 1);
        assert!(report.expired.is_empty());
        drop(guard);

        assert_eq!(engine.sweep_expired_at(due).await.expired, vec![s.session_id]);
    }

    #[tokio::test]
    async fn test_evict_only_old_resolved_sessions() {
        let (engine, _rx, a, b) = engine_with(NegotiationPolicy::default());
        let live = engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        let done = engine.open_session(a, b, offer(10), SessionOptions::default()).await.unwrap();
        engine.cancel(done.session_id, a).await.unwrap();

        assert!(engine.evict_resolved(Utc::now() - Duration::hours(1)).await.is_empty());
        let evicted = engine.evict_resolved(Utc::now() + Duration::seconds(1)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].session_id, done.session_id);
        assert!(engine.get_session(live.session_id).await.is_ok());
        assert!(engine.get_session(done.session_id).await.is_err());
    }
}
