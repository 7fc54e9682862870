//! Shared fixture for engine-level tests

use crate::config::EngineConfig;
use crate::memory::{FaultInjector, MemoryInventory, MemoryLedger, MemoryPresence, MemoryRecorder};
use crate::negotiation::{Collaborators, TradeEngine};
use crate::types::{ActorId, Amount, Asset};
use rust_decimal::Decimal;
use std::sync::Arc;

pub(crate) struct Fixture {
    pub faults: Arc<FaultInjector>,
    pub ledger: Arc<MemoryLedger>,
    pub inventory: Arc<MemoryInventory>,
    pub presence: Arc<MemoryPresence>,
    pub recorder: Arc<MemoryRecorder>,
    pub engine: TradeEngine,
    pub a: ActorId,
    pub b: ActorId,
    pub c: ActorId,
}

/// Balances and holdings of the two main actors
#[derive(Debug, PartialEq)]
pub(crate) struct Snapshot {
    pub balance_a: Amount,
    pub balance_b: Amount,
    pub total_currency: Amount,
    pub assets_a: Vec<Asset>,
    pub assets_b: Vec<Asset>,
}

impl Snapshot {
    pub fn all_assets(&self) -> Vec<Asset> {
        sorted(self.assets_a.iter().chain(&self.assets_b).cloned().collect())
    }
}

fn sorted(mut assets: Vec<Asset>) -> Vec<Asset> {
    assets.sort_by(|x, y| (&x.kind, x.quantity, &x.metadata).cmp(&(&y.kind, y.quantity, &y.metadata)));
    assets
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    /// Three funded actors; A holds a sword and potions, B holds a shield
    pub async fn with_config(config: EngineConfig) -> Self {
        let faults = FaultInjector::new();
        let ledger = Arc::new(MemoryLedger::new(faults.clone()));
        let inventory = Arc::new(MemoryInventory::new(16, faults.clone()));
        let presence = Arc::new(MemoryPresence::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let (a, b, c) = (ActorId::generate(), ActorId::generate(), ActorId::generate());

        for actor in [a, b, c] {
            ledger.deposit(actor, Decimal::from(100)).await;
        }
        inventory.give(a, Asset::new("sword", 1)).await;
        inventory.give(a, Asset::new("potion", 3)).await;
        inventory.give(b, Asset::new("shield", 1)).await;

        let collaborators = Collaborators {
            ledger: ledger.clone(),
            inventory: inventory.clone(),
            liveness: presence.clone(),
            recorder: recorder.clone(),
        };
        let engine = TradeEngine::new(config, collaborators).expect("valid test config");

        Self {
            faults,
            ledger,
            inventory,
            presence,
            recorder,
            engine,
            a,
            b,
            c,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            ledger: self.ledger.clone(),
            inventory: self.inventory.clone(),
            liveness: self.presence.clone(),
            recorder: self.recorder.clone(),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        Snapshot {
            balance_a: self.ledger.balance_of(&self.a).await,
            balance_b: self.ledger.balance_of(&self.b).await,
            total_currency: self.ledger.total().await,
            assets_a: sorted(self.inventory.holdings(&self.a).await),
            assets_b: sorted(self.inventory.holdings(&self.b).await),
        }
    }
}
