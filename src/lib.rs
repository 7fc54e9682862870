//! Trade Escrow
//!
//! Bilateral negotiation and atomic settlement of currency and item trades
//! between two actors.
//!
//! - [`negotiation`]: sessions, the one-session-per-actor registry and the
//!   [`TradeEngine`] facade
//! - [`settlement`]: commit-time validation, ordered execution and compensation
//! - [`sweeper`]: background expiry of abandoned negotiations
//! - [`collaborators`]: the ledger, inventory, liveness and recorder interfaces
//! - [`memory`]: in-memory implementations of those interfaces

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod negotiation;
pub mod settlement;
pub mod sweeper;
pub mod types;

#[cfg(test)]
mod testkit;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{Result, TradeError};
pub use events::{EventBus, EventReceiver, TradeEvent};
pub use negotiation::{
    Collaborators, OfferOp, SessionStatus, SessionView, SettlementOutcome, TradeEngine,
};
pub use settlement::{SettlementFailure, SettlementRecord};
pub use types::{ActorId, Amount, Asset, AssetRef, SessionId};
