//! Error types for the trade core

use crate::negotiation::SessionStatus;
use crate::types::{ActorId, SessionId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for trade operations
#[derive(Error, Debug)]
pub enum TradeError {
    // Session opening errors
    #[error("An actor cannot trade with itself")]
    SelfTrade,

    #[error("Actor already trading: {0}")]
    AlreadyTrading(ActorId),

    #[error("Actor unavailable: {0}")]
    ActorUnavailable(ActorId),

    // Negotiation errors
    #[error("Trade session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Actor {actor} is not a participant of {session}")]
    NotParticipant { session: SessionId, actor: ActorId },

    #[error("Invalid session state: {0}")]
    InvalidSessionState(SessionStatus),

    #[error("Both offers must be ready before confirming")]
    NotBothReady,

    #[error("Offer is full: at most {max} asset lines")]
    OfferFull { max: usize },

    #[error("Currency amount must not be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Offer slot {0} is empty")]
    SlotEmpty(u32),

    #[error("Trade moves nothing on either side")]
    DegenerateTrade,

    // Settlement errors
    #[error("Fatal settlement inconsistency in {session}: {detail}")]
    FatalInconsistency { session: SessionId, detail: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for trade operations
pub type Result<T> = std::result::Result<T, TradeError>;
