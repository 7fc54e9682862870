//! Background expiry of abandoned negotiations

use crate::negotiation::SessionRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodically expires `Active` sessions whose window has passed.
///
/// It takes the same per-session lock as negotiation and settlement, but
/// only with `try_lock`: a session that is busy (for instance mid-settlement)
/// is skipped and looked at again on the next tick.
pub struct ExpirySweeper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(registry: Arc<SessionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run one pass as of `now`. Returns how many sessions were expired.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for handle in self.registry.handles().await {
            let Ok(mut session) = handle.try_lock() else {
                debug!("session busy, skipping this sweep");
                continue;
            };
            if self.registry.expire_locked(&mut session, now).await {
                expired += 1;
            }
        }
        expired
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("expiry sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let expired = self.sweep_once(Utc::now()).await;
                        if expired > 0 {
                            info!(expired, "expired idle trade sessions");
                        }
                    }
                }
            }
        })
    }
}
