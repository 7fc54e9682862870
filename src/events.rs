//! Notifications addressed to trade participants and operators

use crate::settlement::{SettlementFailure, SettlementRecord};
use crate::types::{ActorId, SessionId};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Events the core emits as sessions move through their lifecycle
#[derive(Debug, Clone, Serialize)]
pub enum TradeEvent {
    SessionOpened {
        session: SessionId,
        participants: [ActorId; 2],
    },
    /// An offer changed, so every ready/confirmed flag was cleared
    OfferChanged {
        session: SessionId,
        by: ActorId,
    },
    TradeCompleted(SettlementRecord),
    /// "Trade could not be completed", sent to both parties
    TradeAborted {
        session: SessionId,
        participants: [ActorId; 2],
        reason: SettlementFailure,
    },
    SessionCancelled {
        session: SessionId,
        by: ActorId,
        participants: [ActorId; 2],
    },
    SessionExpired {
        session: SessionId,
        participants: [ActorId; 2],
    },
    /// Operator-facing: a settlement could not be compensated
    FatalInconsistency {
        session: SessionId,
        participants: [ActorId; 2],
        detail: String,
    },
}

/// Bounded broadcast channel shared by every component of an engine.
///
/// Events are only retained for live subscribers, and each subscriber keeps
/// at most `capacity` of them; a subscriber that falls further behind loses
/// the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TradeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. With no subscriber it is dropped; never fails the caller.
    pub fn emit(&self, event: TradeEvent) {
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One subscriber's view of the bus
pub struct EventReceiver {
    rx: broadcast::Receiver<TradeEvent>,
}

impl EventReceiver {
    /// Take the next pending event without waiting
    pub fn poll(&mut self) -> Option<TradeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => warn!(missed, "event subscriber lagged"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<TradeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => warn!(missed, "event subscriber lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take every pending event
    pub fn drain(&mut self) -> Vec<TradeEvent> {
        std::iter::from_fn(|| self.poll()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_changed() -> TradeEvent {
        TradeEvent::OfferChanged {
            session: SessionId::generate(),
            by: ActorId::generate(),
        }
    }

    #[test]
    fn test_emit_and_drain() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        assert!(events.poll().is_none());

        bus.emit(offer_changed());
        bus.emit(offer_changed());

        assert_eq!(events.drain().len(), 2);
        assert!(events.poll().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let producer = bus.clone();
        producer.emit(TradeEvent::SessionExpired {
            session: SessionId::generate(),
            participants: [ActorId::generate(), ActorId::generate()],
        });

        assert!(matches!(
            events.recv().await,
            Some(TradeEvent::SessionExpired { .. })
        ));
    }

    #[test]
    fn test_nothing_retained_without_subscribers() {
        let bus = EventBus::new(8);
        for _ in 0..1000 {
            bus.emit(offer_changed());
        }

        let mut late = bus.subscribe();
        assert!(late.drain().is_empty());
    }

    #[test]
    fn test_slow_subscriber_keeps_only_capacity() {
        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        for _ in 0..1000 {
            bus.emit(offer_changed());
        }

        assert_eq!(events.drain().len(), 8);
    }
}
