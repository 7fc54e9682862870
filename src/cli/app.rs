//! Demo application wiring the engine to in-memory backends

use crate::config::EngineConfig;
use crate::events::{EventReceiver, TradeEvent};
use crate::memory::{FaultInjector, FaultPlan, MemoryInventory, MemoryLedger, MemoryPresence, MemoryRecorder};
use crate::negotiation::{Collaborators, OfferOp, SessionStatus, SettlementOutcome, TradeEngine};
use crate::types::{ActorId, Asset, SessionId};
use anyhow::{bail, Context};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::commands::Scenario;

/// Two funded actors, Alice and Bob, trading through one engine
pub struct DemoApp {
    engine: TradeEngine,
    ledger: Arc<MemoryLedger>,
    inventory: Arc<MemoryInventory>,
    faults: Arc<FaultInjector>,
    alice: ActorId,
    bob: ActorId,
}

impl DemoApp {
    pub async fn new(config: EngineConfig) -> anyhow::Result<Self> {
        let faults = FaultInjector::new();
        let ledger = Arc::new(MemoryLedger::new(faults.clone()));
        let inventory = Arc::new(MemoryInventory::new(config.max_offer_lines * 2, faults.clone()));
        let (alice, bob) = (ActorId::generate(), ActorId::generate());

        ledger.deposit(alice, Decimal::from(80)).await;
        ledger.deposit(bob, Decimal::from(200)).await;
        inventory.give(alice, Asset::new("sword", 1)).await;
        inventory.give(bob, Asset::new("shield", 1)).await;

        let collaborators = Collaborators {
            ledger: ledger.clone(),
            inventory: inventory.clone(),
            liveness: Arc::new(MemoryPresence::new()),
            recorder: Arc::new(MemoryRecorder::new()),
        };
        let engine = TradeEngine::new(config, collaborators).context("invalid engine config")?;

        Ok(Self {
            engine,
            ledger,
            inventory,
            faults,
            alice,
            bob,
        })
    }

    pub async fn run(&self, scenario: Scenario) -> anyhow::Result<()> {
        tracing::info!("Alice is {}, Bob is {}", self.alice, self.bob);
        let mut events = self.engine.events().subscribe();
        self.print_holdings("before").await;

        match scenario {
            Scenario::Swap => self.swap().await?,
            Scenario::InsufficientFunds => self.insufficient_funds().await?,
            Scenario::BaitAndSwitch => self.bait_and_switch().await?,
            Scenario::Fault {
                fail_at,
                break_compensation,
            } => self.fault(fail_at, break_compensation).await?,
            Scenario::Expire { .. } => self.expire().await?,
        }

        self.print_holdings("after").await;
        print_events(&mut events);
        Ok(())
    }

    async fn offer(&self, id: SessionId, actor: ActorId, op: OfferOp) -> anyhow::Result<()> {
        self.engine
            .mutate_offer(id, actor, op)
            .await
            .with_context(|| format!("offer update by {} failed", actor))
    }

    /// Open a sword-for-gold session with both sides ready
    async fn agreed_swap(&self, gold: i64) -> anyhow::Result<SessionId> {
        let id = self.engine.open_session(self.alice, self.bob).await?;
        self.offer(
            id,
            self.alice,
            OfferOp::AddAsset {
                slot: 0,
                asset: Asset::new("sword", 1),
            },
        )
        .await?;
        self.offer(id, self.bob, OfferOp::SetCurrency(Decimal::from(gold))).await?;
        self.offer(id, self.alice, OfferOp::SetReady(true)).await?;
        self.offer(id, self.bob, OfferOp::SetReady(true)).await?;
        Ok(id)
    }

    async fn confirm_both(&self, id: SessionId) -> anyhow::Result<SettlementOutcome> {
        let first = self.engine.confirm(id, self.alice).await?;
        tracing::info!("Alice confirmed: {:?}", first);
        let outcome = self.engine.confirm(id, self.bob).await?;
        tracing::info!("Bob confirmed: {:?}", outcome);
        Ok(outcome)
    }

    async fn swap(&self) -> anyhow::Result<()> {
        let id = self.agreed_swap(50).await?;
        match self.confirm_both(id).await? {
            SettlementOutcome::Completed(record) => {
                tracing::info!("Settled {} (digest {})", record.session, record.digest)
            }
            other => bail!("expected a completed trade, got {:?}", other),
        }
        Ok(())
    }

    async fn insufficient_funds(&self) -> anyhow::Result<()> {
        let id = self.engine.open_session(self.alice, self.bob).await?;
        self.offer(id, self.alice, OfferOp::SetCurrency(Decimal::from(100))).await?;
        self.offer(
            id,
            self.bob,
            OfferOp::AddAsset {
                slot: 0,
                asset: Asset::new("shield", 1),
            },
        )
        .await?;
        self.offer(id, self.alice, OfferOp::SetReady(true)).await?;
        self.offer(id, self.bob, OfferOp::SetReady(true)).await?;

        if let SettlementOutcome::Aborted(reason) = self.confirm_both(id).await? {
            tracing::warn!("Trade could not be completed: {}", reason);
        }
        self.print_session().await;
        self.engine.cancel(id, self.alice).await?;
        Ok(())
    }

    async fn bait_and_switch(&self) -> anyhow::Result<()> {
        let id = self.agreed_swap(50).await?;
        self.engine.confirm(id, self.alice).await?;
        tracing::info!("Alice confirmed; Bob now lowers his offer to 5");
        self.offer(id, self.bob, OfferOp::SetCurrency(Decimal::from(5))).await?;

        match self.engine.confirm(id, self.bob).await {
            Err(err) => tracing::info!("Bob's confirmation rejected: {}", err),
            Ok(outcome) => bail!("stale confirmation was accepted: {:?}", outcome),
        }
        self.print_session().await;
        self.engine.cancel(id, self.bob).await?;
        Ok(())
    }

    async fn fault(&self, fail_at: usize, break_compensation: bool) -> anyhow::Result<()> {
        let id = self.agreed_swap(50).await?;
        let plan = if break_compensation {
            FaultPlan::FailFrom(fail_at)
        } else {
            FaultPlan::FailAt(fail_at)
        };
        tracing::info!("Armed backend fault plan {:?}", plan);

        self.engine.confirm(id, self.alice).await?;
        self.faults.arm(plan).await;
        match self.engine.confirm(id, self.bob).await {
            Ok(outcome) => tracing::info!("Outcome: {:?}", outcome),
            Err(err) => tracing::error!("Settlement error: {}", err),
        }
        self.faults.arm(FaultPlan::Never).await;

        for view in self.engine.faulted_sessions().await {
            tracing::error!("Session {} needs manual repair", view.id);
        }
        if let Some(view) = self.engine.get_session(&self.alice).await {
            if view.status == SessionStatus::Active {
                self.engine.cancel(id, self.alice).await?;
            }
        }
        Ok(())
    }

    async fn expire(&self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let sweeper = self.engine.spawn_sweeper(shutdown.clone());

        let id = self.engine.open_session(self.alice, self.bob).await?;
        let window = self.engine.config().negotiation_window_secs;
        tracing::info!("Opened {}; waiting {}s for it to lapse", id, window);

        let grace = std::time::Duration::from_millis(self.engine.config().sweep_interval_ms);
        tokio::time::sleep(std::time::Duration::from_secs(window) + grace * 2).await;

        shutdown.cancel();
        sweeper.await.context("sweeper task panicked")?;

        if self.engine.registry().is_trading(&self.alice).await {
            bail!("session {} was not reclaimed", id);
        }
        tracing::info!("Session {} reclaimed by the sweeper", id);
        Ok(())
    }

    async fn print_session(&self) {
        if let Some(view) = self.engine.get_session(&self.alice).await {
            match serde_json::to_string_pretty(&view) {
                Ok(json) => tracing::info!("Session state:\n{}", json),
                Err(err) => tracing::warn!("Cannot render session: {}", err),
            }
        }
    }

    async fn print_holdings(&self, label: &str) {
        for (name, actor) in [("Alice", self.alice), ("Bob", self.bob)] {
            let assets: Vec<String> = self
                .inventory
                .holdings(&actor)
                .await
                .iter()
                .map(ToString::to_string)
                .collect();
            tracing::info!(
                "[{}] {}: {} gold, items [{}]",
                label,
                name,
                self.ledger.balance_of(&actor).await,
                assets.join(", ")
            );
        }
    }
}

fn print_events(events: &mut EventReceiver) {
    for event in events.drain() {
        match &event {
            TradeEvent::FatalInconsistency { .. } => tracing::error!("event: {:?}", event),
            TradeEvent::TradeAborted { .. } => tracing::warn!("event: {:?}", event),
            _ => tracing::info!("event: {:?}", event),
        }
    }
}
