//! Double-entry value journal

use chrono::{DateTime, Utc};
use parley_types::{AgentId, Amount, EntryId, SessionId};
use serde::{Deserialize, Serialize};

/// Type of journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Credit (increase) to an account
    Credit,
    /// Debit (decrease) from an account
    Debit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }
}

/// Reason for a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryReason {
    /// External funding (mint). The only way value enters the ledger.
    Funding,
    /// One side of a settlement transfer
    Settlement { session_id: SessionId },
}

impl EntryReason {
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Funding => None,
            Self::Settlement { session_id } => Some(*session_id),
        }
    }
}

/// A single journal entry (one side of a double-entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: EntryId,
    pub account: AgentId,
    pub entry_type: EntryType,
    pub amount: Amount,
    pub balance_after: Amount,
    pub reason: EntryReason,
    pub created_at: DateTime<Utc>,
}
