//! Atomic settlement of agreed trades

pub mod engine;
pub mod plan;
pub mod record;

pub use engine::SettlementEngine;
pub use plan::{Journal, Step};
pub use record::{SettlementFailure, SettlementLeg, SettlementRecord};
