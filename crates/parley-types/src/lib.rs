//! Parley Types - Canonical domain types for agent negotiation and settlement
//!
//! This crate contains the foundational types shared by every Parley crate,
//! with zero dependencies on other parley crates:
//!
//! - Identity types (AgentId, SessionId, TransferId, ...)
//! - Value amounts in minor units
//! - Opaque negotiable terms and offers
//! - Session states and resolutions
//! - Influence events and ledger transfers
//! - Domain events handed to the notification dispatcher
//! - The error taxonomy
//!
//! # Invariants
//!
//! 1. A session resolution is set exactly once and never altered
//! 2. Terms are compared only by structural equality
//! 3. Influence events and ledger transfers are append-only
//! 4. Transfers conserve value; only funding creates it

pub mod identity;
pub mod amount;
pub mod terms;
pub mod negotiation;
pub mod influence;
pub mod settlement;
pub mod event;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use terms::*;
pub use negotiation::*;
pub use influence::*;
pub use settlement::*;
pub use event::*;
pub use error::*;

/// Version of the Parley types schema
pub const TYPES_VERSION: &str = "0.1.0";
