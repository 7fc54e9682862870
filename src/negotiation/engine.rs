//! Trade engine: the public entry point for opening, negotiating,
//! confirming and cancelling trades

use crate::collaborators::{Inventory, Ledger, Liveness, SettlementRecorder};
use crate::config::EngineConfig;
use crate::error::{Result, TradeError};
use crate::events::{EventBus, TradeEvent};
use crate::settlement::SettlementEngine;
use crate::sweeper::ExpirySweeper;
use crate::types::{ActorId, SessionId};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use super::session::TradeSession;
use super::types::{OfferOp, SessionStatus, SessionView, SettlementOutcome, Side};

/// External capabilities the engine is built on
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub inventory: Arc<dyn Inventory>,
    pub liveness: Arc<dyn Liveness>,
    pub recorder: Arc<dyn SettlementRecorder>,
}

/// Negotiation core shared by every call site
#[derive(Clone)]
pub struct TradeEngine {
    config: Arc<EngineConfig>,
    registry: Arc<SessionRegistry>,
    settlement: Arc<SettlementEngine>,
    liveness: Arc<dyn Liveness>,
    events: EventBus,
}

impl TradeEngine {
    /// Create a new trade engine
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let registry = Arc::new(SessionRegistry::new(events.clone()));
        let settlement = SettlementEngine::new(
            collaborators.ledger,
            collaborators.inventory,
            collaborators.recorder,
            registry.clone(),
            events.clone(),
            config.escrow_account,
            config.collaborator_timeout(),
            config.compensation_attempts,
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            settlement: Arc::new(settlement),
            liveness: collaborators.liveness,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a session between two reachable actors that are not already trading
    pub async fn open_session(&self, a: ActorId, b: ActorId) -> Result<SessionId> {
        if a == b {
            return Err(TradeError::SelfTrade);
        }
        for actor in [a, b] {
            let reachable = tokio::time::timeout(
                self.config.collaborator_timeout(),
                self.liveness.is_reachable(&actor),
            )
            .await
            .unwrap_or(false);
            if !reachable {
                return Err(TradeError::ActorUnavailable(actor));
            }
        }

        let handle = self
            .registry
            .open(a, b, self.config.negotiation_window()?)
            .await?;
        let id = handle.lock().await.id();

        info!(session = %id, %a, %b, "trade session opened");
        self.events.emit(TradeEvent::SessionOpened {
            session: id,
            participants: [a, b],
        });
        Ok(id)
    }

    /// Snapshot of the live session `actor` participates in, if any
    pub async fn get_session(&self, actor: &ActorId) -> Option<SessionView> {
        self.registry.session_for(actor).await
    }

    /// Lock a live session and resolve the caller's side.
    ///
    /// An overdue session is expired on the spot rather than handed back.
    async fn lock_session(
        &self,
        id: SessionId,
        actor: &ActorId,
    ) -> Result<(OwnedMutexGuard<TradeSession>, Side)> {
        let handle = self
            .registry
            .get(&id)
            .await
            .ok_or(TradeError::SessionNotFound(id))?;
        let mut session = handle.lock_owned().await;

        // Removed while we waited for the lock
        if session.status().is_terminal() {
            return Err(TradeError::SessionNotFound(id));
        }
        let side = session.side_of(actor)?;
        if self.registry.expire_locked(&mut session, Utc::now()).await {
            return Err(TradeError::InvalidSessionState(SessionStatus::Expired));
        }
        Ok((session, side))
    }

    pub async fn mutate_offer(&self, id: SessionId, actor: ActorId, op: OfferOp) -> Result<()> {
        let (mut session, side) = self.lock_session(id, &actor).await?;
        let changes_terms = !matches!(op, OfferOp::SetReady(_));

        debug!(session = %id, %actor, ?op, "updating offer");
        session.apply(side, op, self.config.max_offer_lines)?;

        if changes_terms {
            self.events.emit(TradeEvent::OfferChanged {
                session: id,
                by: actor,
            });
        }
        Ok(())
    }

    /// Confirm the current terms.
    ///
    /// The second confirmation settles the trade before this call returns;
    /// the first only reports that the counterpart is still pending.
    pub async fn confirm(&self, id: SessionId, actor: ActorId) -> Result<SettlementOutcome> {
        let (mut session, side) = self.lock_session(id, &actor).await?;
        if !session.confirm(side)? {
            debug!(session = %id, %actor, "waiting on counterpart confirmation");
            return Ok(SettlementOutcome::AwaitingCounterparty);
        }

        info!(session = %id, "both parties confirmed, settling");
        self.settlement.settle(&mut session).await
    }

    pub async fn cancel(&self, id: SessionId, actor: ActorId) -> Result<()> {
        let (mut session, _) = self.lock_session(id, &actor).await?;
        session.cancel()?;
        self.registry.remove(&id).await;

        info!(session = %id, %actor, "trade session cancelled");
        self.events.emit(TradeEvent::SessionCancelled {
            session: id,
            by: actor,
            participants: session.participants(),
        });
        Ok(())
    }

    /// Start the background expiry sweeper. It runs until `shutdown` fires.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        ExpirySweeper::new(self.registry.clone(), self.config.sweep_interval()).spawn(shutdown)
    }

    /// Sessions stuck after a failed compensation.
    ///
    /// Sessions busy with another operation are skipped; a faulted session is
    /// never held for long, so it shows up on the next query at the latest.
    pub async fn faulted_sessions(&self) -> Vec<SessionView> {
        let mut faulted = Vec::new();
        for handle in self.registry.handles().await {
            let Ok(session) = handle.try_lock() else {
                continue;
            };
            if session.status() == SessionStatus::Faulted {
                faulted.push(session.view());
            }
        }
        faulted
    }

    /// Operator action: drop a faulted session once its trade has been repaired by hand
    pub async fn release_faulted(&self, id: SessionId) -> Result<()> {
        let handle = self
            .registry
            .get(&id)
            .await
            .ok_or(TradeError::SessionNotFound(id))?;
        let session = handle.lock().await;
        if session.status() != SessionStatus::Faulted {
            return Err(TradeError::InvalidSessionState(session.status()));
        }

        self.registry.remove(&id).await;
        warn!(session = %id, participants = ?session.participants(), "faulted session released by operator");
        Ok(())
    }
}
