//! In-memory ledger store
//!
//! All state sits behind one `RwLock`; a commit holds the write guard for the
//! whole unit, so readers never observe a partial settlement.

use std::collections::HashMap;
#[cfg(feature = "fault-injection")]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_types::{AgentId, Amount, EntryId, InfluenceEvent, SessionId, SettlementRecord};
use tokio::sync::RwLock;

use crate::store::{plan_commit, validate_unit, CommitPlan};
use crate::{
    CommitMode, CommitOutcome, EntryReason, EntryType, JournalEntry, LedgerStore, LedgerUnit,
    StoreError, StoreResult,
};

#[derive(Debug, Default)]
struct StoreState {
    balances: HashMap<AgentId, Amount>,
    /// All entries (append-only)
    journal: Vec<JournalEntry>,
    /// Influence events per agent (append-only)
    influence: HashMap<AgentId, Vec<InfluenceEvent>>,
    settlements: HashMap<SessionId, SettlementRecord>,
}

impl StoreState {
    fn balance(&self, agent: &AgentId) -> Amount {
        self.balances.get(agent).copied().unwrap_or_default()
    }

    /// Append a journal entry and update the account. Caller has already
    /// checked that the new balance is representable and non-negative.
    fn post(
        &mut self,
        account: AgentId,
        entry_type: EntryType,
        amount: Amount,
        balance_after: Amount,
        reason: EntryReason,
        at: DateTime<Utc>,
    ) {
        self.balances.insert(account, balance_after);
        self.journal.push(JournalEntry {
            entry_id: EntryId::new(),
            account,
            entry_type,
            amount,
            balance_after,
            reason,
            created_at: at,
        });
    }
}

/// The in-memory Parley ledger store
///
/// Thread-safe and cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    #[cfg(feature = "fault-injection")]
    fail_next: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with a database error before writing anything
    #[cfg(feature = "fault-injection")]
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Total number of journal entries
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.journal.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn balance(&self, agent: &AgentId) -> StoreResult<Amount> {
        Ok(self.state.read().await.balance(agent))
    }

    async fn total_balance(&self) -> StoreResult<u128> {
        let state = self.state.read().await;
        Ok(state.balances.values().map(|b| b.0 as u128).sum())
    }

    async fn fund(&self, agent: &AgentId, amount: Amount, at: DateTime<Utc>) -> StoreResult<Amount> {
        if amount.is_zero() {
            return Err(StoreError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let new_balance = state
            .balance(agent)
            .checked_add(amount)
            .ok_or_else(|| StoreError::InvalidAmount {
                message: "Balance overflow".to_string(),
            })?;
        state.post(*agent, EntryType::Credit, amount, new_balance, EntryReason::Funding, at);
        Ok(new_balance)
    }

    async fn commit(&self, unit: LedgerUnit, mode: CommitMode) -> StoreResult<CommitOutcome> {
        validate_unit(&unit)?;

        #[cfg(feature = "fault-injection")]
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database {
                message: "injected commit failure".to_string(),
            });
        }

        let mut state = self.state.write().await;

        let existing = state.settlements.get(&unit.session_id).cloned();
        let payer_balance = unit
            .transfer
            .map(|t| state.balance(&t.from))
            .unwrap_or_default();

        match plan_commit(&unit, mode, existing, payer_balance) {
            CommitPlan::Replay(record) => Ok(CommitOutcome {
                record,
                replayed: true,
            }),
            CommitPlan::Fail(record) => {
                state.settlements.insert(unit.session_id, record.clone());
                Ok(CommitOutcome {
                    record,
                    replayed: false,
                })
            }
            CommitPlan::Apply(record) => {
                // Stage every balance change first so nothing is mutated on overflow
                if let Some(t) = &record.transfer {
                    let debit_after = payer_balance
                        .checked_sub(t.amount)
                        .ok_or_else(|| StoreError::InvalidAmount {
                            message: "Balance underflow".to_string(),
                        })?;
                    let credit_after = state
                        .balance(&t.to_agent)
                        .checked_add(t.amount)
                        .ok_or_else(|| StoreError::InvalidAmount {
                            message: "Balance overflow".to_string(),
                        })?;
                    let reason = EntryReason::Settlement {
                        session_id: unit.session_id,
                    };
                    state.post(t.from_agent, EntryType::Debit, t.amount, debit_after, reason, unit.at);
                    state.post(t.to_agent, EntryType::Credit, t.amount, credit_after, reason, unit.at);
                }

                for event in &record.influence {
                    state
                        .influence
                        .entry(event.agent_id)
                        .or_default()
                        .push(event.clone());
                }

                state.settlements.insert(unit.session_id, record.clone());
                Ok(CommitOutcome {
                    record,
                    replayed: false,
                })
            }
        }
    }

    async fn settlement(&self, session_id: &SessionId) -> StoreResult<Option<SettlementRecord>> {
        Ok(self.state.read().await.settlements.get(session_id).cloned())
    }

    async fn influence_events(&self, agent: &AgentId) -> StoreResult<Vec<InfluenceEvent>> {
        Ok(self
            .state
            .read()
            .await
            .influence
            .get(agent)
            .cloned()
            .unwrap_or_default())
    }

    async fn journal(&self, agent: &AgentId) -> StoreResult<Vec<JournalEntry>> {
        let state = self.state.read().await;
        Ok(state
            .journal
            .iter()
            .filter(|e| &e.account == agent)
            .cloned()
            .collect())
    }

    async fn session_journal(&self, session_id: &SessionId) -> StoreResult<Vec<JournalEntry>> {
        let state = self.state.read().await;
        Ok(state
            .journal
            .iter()
            .filter(|e| e.reason.session_id().as_ref() == Some(session_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransferIntent;
    use parley_types::{CommitKind, InfluenceReason, SettlementStatus};

    fn unit(session_id: SessionId, from: AgentId, to: AgentId, amount: u64) -> LedgerUnit {
        let at = Utc::now();
        LedgerUnit {
            session_id,
            kind: CommitKind::Acceptance,
            transfer: Some(TransferIntent {
                from,
                to,
                amount: Amount::new(amount),
            }),
            influence: vec![
                InfluenceEvent::new(from, 1.5, InfluenceReason::FairDealBonus, session_id, at),
                InfluenceEvent::new(to, 1.5, InfluenceReason::FairDealBonus, session_id, at),
            ],
            at,
        }
    }

    #[tokio::test]
    async fn test_fund_and_balance() {
        let store = InMemoryStore::new();
        let agent = AgentId::new();

        assert_eq!(store.balance(&agent).await.unwrap(), Amount::zero());
        let balance = store.fund(&agent, Amount::new(1000), Utc::now()).await.unwrap();
        assert_eq!(balance, Amount::new(1000));
        assert_eq!(store.balance(&agent).await.unwrap(), Amount::new(1000));
    }

    #[tokio::test]
    async fn test_zero_funding_rejected() {
        let store = InMemoryStore::new();
        let result = store.fund(&AgentId::new(), Amount::zero(), Utc::now()).await;
        assert!(matches!(result, Err(StoreError::InvalidAmount { .. })));
    }

    #[tokio::test]
    async fn test_commit_applies_transfer_and_events() {
        let store = InMemoryStore::new();
        let (a, b) = (AgentId::new(), AgentId::new());
        store.fund(&a, Amount::new(100), Utc::now()).await.unwrap();

        let session = SessionId::new();
        let outcome = store
            .commit(unit(session, a, b, 40), CommitMode::FirstAttempt)
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.record.status, SettlementStatus::Completed);
        assert_eq!(store.balance(&a).await.unwrap(), Amount::new(60));
        assert_eq!(store.balance(&b).await.unwrap(), Amount::new(40));
        assert_eq!(store.influence_events(&a).await.unwrap().len(), 1);
        assert_eq!(store.influence_events(&b).await.unwrap().len(), 1);
        // funding + debit + credit
        assert_eq!(store.entry_count().await, 3);
    }

    #[tokio::test]
    async fn test_insufficient_funds_writes_only_failed_record() {
        let store = InMemoryStore::new();
        let (a, b) = (AgentId::new(), AgentId::new());

        let session = SessionId::new();
        let outcome = store
            .commit(unit(session, a, b, 50), CommitMode::FirstAttempt)
            .await
            .unwrap();

        assert_eq!(outcome.record.status, SettlementStatus::Failed);
        assert!(outcome.record.transfer.is_none());
        assert!(store.influence_events(&a).await.unwrap().is_empty());
        assert_eq!(store.entry_count().await, 0);
        assert_eq!(
            store.settlement(&session).await.unwrap().unwrap().status,
            SettlementStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_replay_is_a_no_op() {
        let store = InMemoryStore::new();
        let (a, b) = (AgentId::new(), AgentId::new());
        store.fund(&a, Amount::new(100), Utc::now()).await.unwrap();

        let session = SessionId::new();
        let first = store
            .commit(unit(session, a, b, 40), CommitMode::FirstAttempt)
            .await
            .unwrap();
        let second = store
            .commit(unit(session, a, b, 40), CommitMode::FirstAttempt)
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(first.record, second.record);
        assert_eq!(store.balance(&a).await.unwrap(), Amount::new(60));
        assert_eq!(store.influence_events(&b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remediation_replaces_failed_record() {
        let store = InMemoryStore::new();
        let (a, b) = (AgentId::new(), AgentId::new());
        let session = SessionId::new();

        store
            .commit(unit(session, a, b, 50), CommitMode::FirstAttempt)
            .await
            .unwrap();
        store.fund(&a, Amount::new(50), Utc::now()).await.unwrap();

        // A plain replay still returns the failure
        let replay = store
            .commit(unit(session, a, b, 50), CommitMode::FirstAttempt)
            .await
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.record.status, SettlementStatus::Failed);

        let retried = store
            .commit(unit(session, a, b, 50), CommitMode::Remediation)
            .await
            .unwrap();
        assert_eq!(retried.record.status, SettlementStatus::Completed);
        assert_eq!(retried.record.attempts, 2);
        assert_eq!(store.balance(&b).await.unwrap(), Amount::new(50));
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let store = InMemoryStore::new();
        let a = AgentId::new();
        let result = store
            .commit(unit(SessionId::new(), a, a, 10), CommitMode::FirstAttempt)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidAmount { .. })));
    }

    #[tokio::test]
    async fn test_journal_is_double_entry() {
        let store = InMemoryStore::new();
        let (a, b) = (AgentId::new(), AgentId::new());
        store.fund(&a, Amount::new(100), Utc::now()).await.unwrap();
        let session = SessionId::new();
        store
            .commit(unit(session, a, b, 30), CommitMode::FirstAttempt)
            .await
            .unwrap();

        let a_entries = store.journal(&a).await.unwrap();
        let b_entries = store.journal(&b).await.unwrap();
        assert_eq!(a_entries.len(), 2);
        assert_eq!(a_entries[1].entry_type, EntryType::Debit);
        assert_eq!(a_entries[1].balance_after, Amount::new(70));
        assert_eq!(b_entries.len(), 1);
        assert_eq!(b_entries[0].entry_type, EntryType::Credit);
        assert_eq!(b_entries[0].reason.session_id(), Some(session));
    }
}
