//! In-memory collaborator backends
//!
//! Used by the CLI demo and the test suite. A shared [`FaultInjector`] lets
//! callers fail a chosen mutating call so the compensation path can be driven
//! deterministically.

use crate::collaborators::{
    CollaboratorError, CollaboratorResult, Inventory, Ledger, Liveness, SettlementRecorder,
};
use crate::settlement::SettlementRecord;
use crate::types::{ActorId, Amount, Asset};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Which mutating call (0-based, counted across every backend sharing the
/// injector) should fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPlan {
    Never,
    /// Fail only call `k`; later calls succeed
    FailAt(usize),
    /// Fail call `k` and every call after it
    FailFrom(usize),
}

/// Shared mutation counter with an optional planned failure
#[derive(Debug)]
pub struct FaultInjector {
    calls: AtomicUsize,
    plan: Mutex<FaultPlan>,
}

impl FaultInjector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            plan: Mutex::new(FaultPlan::Never),
        })
    }

    /// Install a plan and restart the call count
    pub async fn arm(&self, plan: FaultPlan) {
        *self.plan.lock().await = plan;
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Mutating calls observed since the last `arm`
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn check(&self, op: &str) -> CollaboratorResult<()> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = match *self.plan.lock().await {
            FaultPlan::Never => false,
            FaultPlan::FailAt(k) => index == k,
            FaultPlan::FailFrom(k) => index >= k,
        };
        if fail {
            tracing::debug!(call = index, op, "injected backend failure");
            return Err(CollaboratorError::Unavailable(format!(
                "injected failure on call {} ({})",
                index, op
            )));
        }
        Ok(())
    }
}

/// Balance table keyed by actor
pub struct MemoryLedger {
    balances: RwLock<HashMap<ActorId, Amount>>,
    faults: Arc<FaultInjector>,
}

impl MemoryLedger {
    pub fn new(faults: Arc<FaultInjector>) -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            faults,
        }
    }

    /// Credit an account outside of any trade
    pub async fn deposit(&self, actor: ActorId, amount: Amount) {
        *self.balances.write().await.entry(actor).or_default() += amount;
    }

    pub async fn balance_of(&self, actor: &ActorId) -> Amount {
        self.balances
            .read()
            .await
            .get(actor)
            .copied()
            .unwrap_or_default()
    }

    /// Sum over every account, escrow included
    pub async fn total(&self) -> Amount {
        self.balances.read().await.values().copied().sum()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn balance(&self, actor: &ActorId) -> CollaboratorResult<Amount> {
        Ok(self.balance_of(actor).await)
    }

    async fn transfer(
        &self,
        from: &ActorId,
        to: &ActorId,
        amount: Amount,
    ) -> CollaboratorResult<()> {
        self.faults.check("transfer").await?;
        if amount < Decimal::ZERO {
            return Err(CollaboratorError::Rejected(format!(
                "negative transfer {}",
                amount
            )));
        }

        let mut balances = self.balances.write().await;
        let available = balances.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(CollaboratorError::InsufficientFunds(*from));
        }
        *balances.entry(*from).or_default() -= amount;
        *balances.entry(*to).or_default() += amount;
        Ok(())
    }
}

/// Asset multisets keyed by actor, with a per-actor line capacity
pub struct MemoryInventory {
    holdings: RwLock<HashMap<ActorId, Vec<Asset>>>,
    capacity: RwLock<HashMap<ActorId, usize>>,
    default_capacity: usize,
    faults: Arc<FaultInjector>,
}

impl MemoryInventory {
    pub fn new(default_capacity: usize, faults: Arc<FaultInjector>) -> Self {
        Self {
            holdings: RwLock::new(HashMap::new()),
            capacity: RwLock::new(HashMap::new()),
            default_capacity,
            faults,
        }
    }

    /// Hand an asset to an actor outside of any trade
    pub async fn give(&self, actor: ActorId, asset: Asset) {
        self.holdings.write().await.entry(actor).or_default().push(asset);
    }

    pub async fn set_capacity(&self, actor: ActorId, lines: usize) {
        self.capacity.write().await.insert(actor, lines);
    }

    pub async fn holdings(&self, actor: &ActorId) -> Vec<Asset> {
        self.holdings
            .read()
            .await
            .get(actor)
            .cloned()
            .unwrap_or_default()
    }

    async fn capacity_of(&self, actor: &ActorId) -> usize {
        self.capacity
            .read()
            .await
            .get(actor)
            .copied()
            .unwrap_or(self.default_capacity)
    }
}

/// Remove every asset of `wanted` from `held`, or leave `held` untouched
fn take_all(held: &mut Vec<Asset>, wanted: &[Asset]) -> bool {
    let mut remaining = held.clone();
    for asset in wanted {
        match remaining.iter().position(|a| a == asset) {
            Some(index) => {
                remaining.swap_remove(index);
            }
            None => return false,
        }
    }
    *held = remaining;
    true
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn has_assets(&self, actor: &ActorId, assets: &[Asset]) -> CollaboratorResult<bool> {
        let mut held = self.holdings(actor).await;
        Ok(take_all(&mut held, assets))
    }

    async fn has_capacity_for(
        &self,
        actor: &ActorId,
        assets: &[Asset],
    ) -> CollaboratorResult<bool> {
        let held = self.holdings(actor).await.len();
        Ok(held + assets.len() <= self.capacity_of(actor).await)
    }

    async fn has_capacity_after(
        &self,
        actor: &ActorId,
        outgoing: &[Asset],
        incoming: &[Asset],
    ) -> CollaboratorResult<bool> {
        let held = self.holdings(actor).await.len();
        let kept = held.saturating_sub(outgoing.len());
        Ok(kept + incoming.len() <= self.capacity_of(actor).await)
    }

    async fn remove_assets(&self, actor: &ActorId, assets: &[Asset]) -> CollaboratorResult<()> {
        self.faults.check("remove_assets").await?;
        let mut holdings = self.holdings.write().await;
        let held = holdings.entry(*actor).or_default();
        if !take_all(held, assets) {
            return Err(CollaboratorError::MissingAssets(*actor));
        }
        Ok(())
    }

    async fn add_assets(&self, actor: &ActorId, assets: &[Asset]) -> CollaboratorResult<()> {
        self.faults.check("add_assets").await?;
        let capacity = self.capacity_of(actor).await;
        let mut holdings = self.holdings.write().await;
        let held = holdings.entry(*actor).or_default();
        if held.len() + assets.len() > capacity {
            return Err(CollaboratorError::NoCapacity(*actor));
        }
        held.extend_from_slice(assets);
        Ok(())
    }
}

/// Every actor is reachable unless explicitly marked offline
#[derive(Default)]
pub struct MemoryPresence {
    offline: RwLock<HashSet<ActorId>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_online(&self, actor: ActorId, online: bool) {
        let mut offline = self.offline.write().await;
        if online {
            offline.remove(&actor);
        } else {
            offline.insert(actor);
        }
    }
}

#[async_trait]
impl Liveness for MemoryPresence {
    async fn is_reachable(&self, actor: &ActorId) -> bool {
        !self.offline.read().await.contains(actor)
    }
}

/// Append-only settlement log
#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<SettlementRecord>>,
    failing: AtomicBool,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `record` call fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<SettlementRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl SettlementRecorder for MemoryRecorder {
    async fn record(&self, record: &SettlementRecord) -> CollaboratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("recorder offline".to_string()));
        }
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
