//! All-or-nothing execution of an agreed trade
//!
//! Resources are re-validated at commit time, then moved one collaborator call
//! at a time in the order produced by [`plan`]. If a call fails, every step
//! already applied is reversed latest-first before the failure is reported.
//! A reversal that keeps failing leaves the session `Faulted` for an operator.

use crate::collaborators::{bounded, CollaboratorResult, Inventory, Ledger, SettlementRecorder};
use crate::error::{Result, TradeError};
use crate::events::{EventBus, TradeEvent};
use crate::negotiation::{SessionRegistry, SessionStatus, SettlementOutcome, Side, TradeSession};
use crate::types::ActorId;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::plan::{plan, Journal, Step};
use super::record::{SettlementFailure, SettlementRecord};

pub struct SettlementEngine {
    ledger: Arc<dyn Ledger>,
    inventory: Arc<dyn Inventory>,
    recorder: Arc<dyn SettlementRecorder>,
    registry: Arc<SessionRegistry>,
    events: EventBus,
    escrow: ActorId,
    call_timeout: Duration,
    compensation_attempts: u32,
}

impl SettlementEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        inventory: Arc<dyn Inventory>,
        recorder: Arc<dyn SettlementRecorder>,
        registry: Arc<SessionRegistry>,
        events: EventBus,
        escrow: ActorId,
        call_timeout: Duration,
        compensation_attempts: u32,
    ) -> Self {
        Self {
            ledger,
            inventory,
            recorder,
            registry,
            events,
            escrow,
            call_timeout,
            compensation_attempts: compensation_attempts.max(1),
        }
    }

    /// Settle a session the caller holds locked in `Settling`.
    ///
    /// Recoverable failures come back as [`SettlementOutcome::Aborted`] with the
    /// session returned to `Active`. An `Err` means either a precondition was
    /// violated (nothing happened) or compensation failed (`FatalInconsistency`).
    pub async fn settle(&self, session: &mut TradeSession) -> Result<SettlementOutcome> {
        if session.status() != SessionStatus::Settling {
            return Err(TradeError::InvalidSessionState(session.status()));
        }
        if session.is_degenerate() {
            session.reopen();
            return Err(TradeError::DegenerateTrade);
        }

        debug!(session = %session.id(), "re-validating trade resources");
        if let Err(failure) = self.validate(session).await {
            return Ok(self.abort(session, failure));
        }

        let mut journal = Journal::default();
        for step in plan(session) {
            debug!(session = %session.id(), %step, "applying settlement step");
            if let Err(err) = self.apply(&step).await {
                warn!(session = %session.id(), %step, error = %err, "settlement step failed, compensating");
                let failure = SettlementFailure::ExecutionFailed {
                    step: step.to_string(),
                    detail: err.to_string(),
                };
                return match self.compensate(&mut journal).await {
                    Ok(()) => Ok(self.abort(session, failure)),
                    Err(detail) => Err(self.fault(session, detail)),
                };
            }
            journal.record(step);
        }

        Ok(self.complete(session, journal.len()).await)
    }

    /// Read-only commit-time checks. Nothing is mutated.
    async fn validate(&self, session: &TradeSession) -> std::result::Result<(), SettlementFailure> {
        let unavailable = |err: crate::collaborators::CollaboratorError| {
            SettlementFailure::CollaboratorUnavailable {
                detail: err.to_string(),
            }
        };

        for side in [Side::A, Side::B] {
            let actor = session.participant(side);
            let counterpart = session.participant(side.other());
            let offer = session.offer(side);

            let available = bounded(self.call_timeout, self.ledger.balance(&actor))
                .await
                .map_err(unavailable)?;
            if available < offer.currency {
                return Err(SettlementFailure::InsufficientFunds {
                    actor,
                    required: offer.currency,
                    available,
                });
            }

            let assets = offer.asset_list();
            if assets.is_empty() {
                continue;
            }
            let held = bounded(self.call_timeout, self.inventory.has_assets(&actor, &assets))
                .await
                .map_err(unavailable)?;
            if !held {
                return Err(SettlementFailure::MissingAssets { actor });
            }
            // The counterpart's own assets leave before these arrive
            let released = session.offer(side.other()).asset_list();
            let room = bounded(
                self.call_timeout,
                self.inventory
                    .has_capacity_after(&counterpart, &released, &assets),
            )
            .await
            .map_err(unavailable)?;
            if !room {
                return Err(SettlementFailure::NoCapacity { actor: counterpart });
            }
        }
        Ok(())
    }

    async fn apply(&self, step: &Step) -> CollaboratorResult<()> {
        let call = async {
            match step {
                Step::WithdrawCurrency { from, amount } => {
                    self.ledger.transfer(from, &self.escrow, *amount).await
                }
                Step::RemoveAssets { from, assets } => self.inventory.remove_assets(from, assets).await,
                Step::AddAssets { to, assets } => self.inventory.add_assets(to, assets).await,
                Step::DepositCurrency { to, amount } => {
                    self.ledger.transfer(&self.escrow, to, *amount).await
                }
            }
        };
        bounded(self.call_timeout, call).await
    }

    async fn revert(&self, step: &Step) -> CollaboratorResult<()> {
        let call = async {
            match step {
                Step::WithdrawCurrency { from, amount } => {
                    self.ledger.transfer(&self.escrow, from, *amount).await
                }
                Step::RemoveAssets { from, assets } => self.inventory.add_assets(from, assets).await,
                Step::AddAssets { to, assets } => self.inventory.remove_assets(to, assets).await,
                Step::DepositCurrency { to, amount } => {
                    self.ledger.transfer(to, &self.escrow, *amount).await
                }
            }
        };
        bounded(self.call_timeout, call).await
    }

    /// Reverse every applied step, latest first, retrying each one.
    ///
    /// A step that cannot be reversed does not stop the walk: every other
    /// entry is still attempted and all failures are reported together.
    /// Entries are marked as they are reversed, so a later run only revisits
    /// the ones that failed.
    async fn compensate(&self, journal: &mut Journal) -> std::result::Result<(), String> {
        let mut failures = Vec::new();
        for (index, step) in journal.pending() {
            match self.revert_with_retries(&step).await {
                Ok(()) => journal.mark_compensated(index),
                Err(err) => {
                    error!(%step, error = %err, "compensating step exhausted its retries");
                    failures.push(format!("'{}': {}", step, err));
                }
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        Err(format!(
            "could not reverse {} of {} applied step(s): {}",
            failures.len(),
            journal.len(),
            failures.join("; ")
        ))
    }

    async fn revert_with_retries(&self, step: &Step) -> CollaboratorResult<()> {
        let mut attempt = 1;
        loop {
            match self.revert(step).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= self.compensation_attempts => return Err(err),
                Err(err) => {
                    warn!(%step, attempt, error = %err, "compensating step failed, retrying");
                    attempt += 1;
                }
            }
        }
    }

    async fn complete(&self, session: &mut TradeSession, steps: usize) -> SettlementOutcome {
        let record = SettlementRecord::new(session, Utc::now());
        session.set_status(SessionStatus::Completed);
        self.registry.remove(&session.id()).await;

        info!(
            session = %session.id(),
            steps,
            digest = %record.digest,
            "trade settled"
        );

        if let Err(err) = bounded(self.call_timeout, self.recorder.record(&record)).await {
            warn!(session = %session.id(), error = %err, "failed to record settlement");
        }
        self.events.emit(TradeEvent::TradeCompleted(record.clone()));
        SettlementOutcome::Completed(record)
    }

    fn abort(&self, session: &mut TradeSession, failure: SettlementFailure) -> SettlementOutcome {
        session.reopen();
        warn!(session = %session.id(), reason = %failure, "trade could not be completed");
        self.events.emit(TradeEvent::TradeAborted {
            session: session.id(),
            participants: session.participants(),
            reason: failure.clone(),
        });
        SettlementOutcome::Aborted(failure)
    }

    fn fault(&self, session: &mut TradeSession, detail: String) -> TradeError {
        session.set_status(SessionStatus::Faulted);
        error!(
            session = %session.id(),
            participants = ?session.participants(),
            detail = %detail,
            "FATAL: settlement partially applied and could not be compensated"
        );
        self.events.emit(TradeEvent::FatalInconsistency {
            session: session.id(),
            participants: session.participants(),
            detail: detail.clone(),
        });
        TradeError::FatalInconsistency {
            session: session.id(),
            detail,
        }
    }
}
