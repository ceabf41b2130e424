//! The durable transactional store behind both ledgers
//!
//! Settlement never issues independent writes. It hands the store a
//! [`LedgerUnit`] and the store applies it inside one transaction: the
//! settlement record, the optional transfer (two journal entries) and the
//! influence events are all written, or none are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_types::{
    AgentId, Amount, CommitKind, InfluenceEvent, SessionId, SettlementRecord,
};

use crate::{JournalEntry, StoreResult};

/// Value movement requested by a settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferIntent {
    pub from: AgentId,
    pub to: AgentId,
    pub amount: Amount,
}

/// Everything one resolved session does to the ledgers
#[derive(Debug, Clone)]
pub struct LedgerUnit {
    pub session_id: SessionId,
    pub kind: CommitKind,
    pub transfer: Option<TransferIntent>,
    pub influence: Vec<InfluenceEvent>,
    pub at: DateTime<Utc>,
}

/// How to treat an existing settlement record for the same session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Any existing record wins; the call is a replay
    FirstAttempt,
    /// A FAILED record may be replaced by a new attempt; COMPLETED still wins
    Remediation,
}

/// Result of [`LedgerStore::commit`]
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub record: SettlementRecord,
    /// True when an existing record was returned and nothing was written
    pub replayed: bool,
}

/// Transactional store backing the value and influence ledgers
///
/// Implementations must make `commit` atomic and isolated: readers observe
/// either none or all of a unit's effects, and two commits for the same
/// session never both apply.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance (zero for unknown agents)
    async fn balance(&self, agent: &AgentId) -> StoreResult<Amount>;

    /// Sum of all balances, for conservation audits
    async fn total_balance(&self) -> StoreResult<u128>;

    /// Credit an agent from outside the system. Returns the new balance.
    async fn fund(&self, agent: &AgentId, amount: Amount, at: DateTime<Utc>) -> StoreResult<Amount>;

    /// Apply a settlement unit atomically and idempotently per session
    async fn commit(&self, unit: LedgerUnit, mode: CommitMode) -> StoreResult<CommitOutcome>;

    /// Settlement record for a session, if any
    async fn settlement(&self, session_id: &SessionId) -> StoreResult<Option<SettlementRecord>>;

    /// All influence events of an agent, oldest first
    async fn influence_events(&self, agent: &AgentId) -> StoreResult<Vec<InfluenceEvent>>;

    /// Journal entries of an agent, oldest first
    async fn journal(&self, agent: &AgentId) -> StoreResult<Vec<JournalEntry>>;

    /// Journal entries posted by one settlement, oldest first
    async fn session_journal(&self, session_id: &SessionId) -> StoreResult<Vec<JournalEntry>>;
}

/// What a commit will do, decided from the state read inside the transaction
#[derive(Debug)]
pub(crate) enum CommitPlan {
    /// Return the existing record, write nothing
    Replay(SettlementRecord),
    /// Write only the FAILED record
    Fail(SettlementRecord),
    /// Write the record and all effects
    Apply(SettlementRecord),
}

/// Validate a unit before any state is read
pub(crate) fn validate_unit(unit: &LedgerUnit) -> StoreResult<()> {
    if let Some(t) = &unit.transfer {
        if t.amount.is_zero() {
            return Err(crate::StoreError::InvalidAmount {
                message: "Transfer amount must be greater than zero".to_string(),
            });
        }
        if t.from == t.to {
            return Err(crate::StoreError::InvalidAmount {
                message: format!("Transfer from {} to itself", t.from),
            });
        }
    }
    Ok(())
}

/// Decide the outcome of a commit
///
/// `payer_balance` is the payer's balance read in the same transaction; it is
/// ignored when the unit carries no transfer.
pub(crate) fn plan_commit(
    unit: &LedgerUnit,
    mode: CommitMode,
    existing: Option<SettlementRecord>,
    payer_balance: Amount,
) -> CommitPlan {
    use parley_types::{LedgerTransfer, SettlementFailure, SettlementStatus, TransferId};

    let attempts = match existing {
        Some(record) => {
            let replace = mode == CommitMode::Remediation
                && record.status == SettlementStatus::Failed;
            if !replace {
                return CommitPlan::Replay(record);
            }
            record.attempts + 1
        }
        None => 1,
    };

    if let Some(t) = &unit.transfer {
        if payer_balance < t.amount {
            return CommitPlan::Fail(SettlementRecord {
                session_id: unit.session_id,
                kind: unit.kind,
                status: SettlementStatus::Failed,
                transfer: None,
                influence: Vec::new(),
                failure: Some(SettlementFailure::InsufficientFunds {
                    agent_id: t.from,
                    requested: t.amount,
                    available: payer_balance,
                }),
                attempts,
                recorded_at: unit.at,
            });
        }
    }

    CommitPlan::Apply(SettlementRecord {
        session_id: unit.session_id,
        kind: unit.kind,
        status: SettlementStatus::Completed,
        transfer: unit.transfer.map(|t| LedgerTransfer {
            transfer_id: TransferId::new(),
            from_agent: t.from,
            to_agent: t.to,
            amount: t.amount,
            session_id: unit.session_id,
            committed_at: unit.at,
        }),
        influence: unit.influence.clone(),
        failure: None,
        attempts,
        recorded_at: unit.at,
    })
}
