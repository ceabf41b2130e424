//! Parley Settlement - Atomic settlement of resolved negotiations
//!
//! The coordinator turns an ACCEPTED resolution into ledger state: the agreed
//! transfer and both participants' fair-deal bonuses are handed to the store
//! as one unit. Settlement is idempotent per session; replays return the
//! recorded result and emit nothing.
//!
//! Events are enqueued on the [`EventOutbox`]; delivery is somebody else's job.

pub mod scoring;
pub mod outbox;
pub mod coordinator;

pub use scoring::ScoringPolicy;
pub use outbox::{EventOutbox, OutboxReceiver, OutboxStats};
pub use coordinator::{SettlementCoordinator, SettlementRequest};
