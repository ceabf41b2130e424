//! Parley Ledger - Value and influence ledgers for agent negotiation
//!
//! Both ledgers live behind one transactional store so that a settlement
//! (transfer + influence events + settlement record) is a single atomic unit.
//!
//! The value ledger is:
//! - Account-keyed by AgentId
//! - Double-entry (every debit has a matching credit)
//! - Append-only (journal entries are never mutated)
//!
//! The influence ledger is an append-only event log; scores are a decayed
//! fold over it and are never stored.
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. Transfers conserve value; only funding creates it
//! 3. At most one settlement record per session, written with its effects
//! 4. No partial commit is ever visible to a reader

pub mod error;
pub mod journal;
pub mod store;
pub mod memory;
pub mod sqlite;
pub mod influence;

pub use error::{StoreError, StoreResult};
pub use journal::{EntryReason, EntryType, JournalEntry};
pub use store::{CommitMode, CommitOutcome, LedgerStore, LedgerUnit, TransferIntent};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use influence::{decay, decayed_score, InfluenceBreakdown, InfluenceLedger};
