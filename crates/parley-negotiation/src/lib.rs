//! Parley Negotiation - Session state machine and engine
//!
//! # Architecture
//!
//! Every offer follows the same path:
//! 1. **Admission**: the engine validates the offer and routes it to its session
//! 2. **Transition**: the session state machine records the round and checks
//!    for acceptance, withdrawal or exhaustion
//! 3. **Resolution**: a terminal transition emits `SessionResolved`
//! 4. **Settlement**: an ACCEPTED resolution is handed to the
//!    [`SettlementCoordinator`](parley_settlement::SettlementCoordinator)
//!
//! # Components
//!
//! - `NegotiationSession`: two-party state machine, one per session
//! - `NegotiationEngine`: session registry, global policy and expiry sweep
//! - `AgentDirectory`: external lookup of known agents
//!
//! Operations on one session are serialized by that session's lock. The
//! registry lock is held only for map updates.

pub mod policy;
pub mod directory;
pub mod session;
pub mod engine;

pub use policy::{NegotiationPolicy, SessionOptions};
pub use directory::{AgentDirectory, InMemoryDirectory, OpenDirectory};
pub use session::{NegotiationSession, Transition};
pub use engine::{NegotiationEngine, OfferOutcome, SettlementProgress, SweepReport};
