//! Capability interfaces the core consumes from the surrounding application
//!
//! The core owns no balances and no inventories. It reaches them only through
//! these narrow traits, so any storage backend can sit behind them. Mutating
//! calls must each be atomic on the implementor's side.

use crate::settlement::SettlementRecord;
use crate::types::{ActorId, Amount, Asset};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a ledger, inventory or recorder backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Insufficient funds for {0}")]
    InsufficientFunds(ActorId),

    #[error("Actor {0} does not hold the requested assets")]
    MissingAssets(ActorId),

    #[error("Actor {0} has no room for the assets")]
    NoCapacity(ActorId),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend rejected the operation: {0}")]
    Rejected(String),
}

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Currency balances
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance(&self, actor: &ActorId) -> CollaboratorResult<Amount>;
    async fn transfer(&self, from: &ActorId, to: &ActorId, amount: Amount)
        -> CollaboratorResult<()>;
}

/// Discrete asset holdings
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn has_assets(&self, actor: &ActorId, assets: &[Asset]) -> CollaboratorResult<bool>;
    async fn has_capacity_for(&self, actor: &ActorId, assets: &[Asset])
        -> CollaboratorResult<bool>;

    /// Room for `incoming` once `outgoing` has left the inventory.
    /// Backends that cannot net the two fall back to checking `incoming` alone.
    async fn has_capacity_after(
        &self,
        actor: &ActorId,
        _outgoing: &[Asset],
        incoming: &[Asset],
    ) -> CollaboratorResult<bool> {
        self.has_capacity_for(actor, incoming).await
    }
    async fn remove_assets(&self, actor: &ActorId, assets: &[Asset]) -> CollaboratorResult<()>;
    async fn add_assets(&self, actor: &ActorId, assets: &[Asset]) -> CollaboratorResult<()>;
}

/// Presence check used before opening a session
#[async_trait]
pub trait Liveness: Send + Sync {
    async fn is_reachable(&self, actor: &ActorId) -> bool;
}

/// Sink for completed settlements. Failures are logged, never rolled back.
#[async_trait]
pub trait SettlementRecorder: Send + Sync {
    async fn record(&self, record: &SettlementRecord) -> CollaboratorResult<()>;
}

/// Bound a collaborator call by `limit`, folding an elapsed timer into an error.
pub async fn bounded<T, F>(limit: Duration, call: F) -> CollaboratorResult<T>
where
    F: std::future::Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit)),
    }
}
