//! Negotiation module: sessions, their registry and the public trade facade

pub mod engine;
pub mod registry;
pub mod session;
pub mod types;

pub use engine::{Collaborators, TradeEngine};
pub use registry::{SessionHandle, SessionRegistry};
pub use session::TradeSession;
pub use types::{Offer, OfferOp, SessionStatus, SessionView, SettlementOutcome, Side};
