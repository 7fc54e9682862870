//! Registry of live trade sessions
//!
//! The registry is the single source of truth for "does this actor have a
//! live session". Its own lock covers only map operations; callers that hold
//! a session lock may take the registry lock, never the other way round.

use crate::error::{Result, TradeError};
use crate::events::{EventBus, TradeEvent};
use crate::types::{ActorId, SessionId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::session::TradeSession;
use super::types::SessionView;

/// Shared, individually locked session
pub type SessionHandle = Arc<Mutex<TradeSession>>;

struct Entry {
    handle: SessionHandle,
    participants: [ActorId; 2],
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Entry>,
    active_session_of: HashMap<ActorId, SessionId>,
}

pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    events: EventBus,
}

impl SessionRegistry {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            events,
        }
    }

    /// Create a session between `a` and `b`.
    ///
    /// The "not already trading" check and both index insertions happen under
    /// one registry lock, so two concurrent opens sharing an actor cannot both
    /// succeed.
    pub async fn open(&self, a: ActorId, b: ActorId, window: Duration) -> Result<SessionHandle> {
        if a == b {
            return Err(TradeError::SelfTrade);
        }

        let mut state = self.state.lock().await;
        for actor in [a, b] {
            if state.active_session_of.contains_key(&actor) {
                return Err(TradeError::AlreadyTrading(actor));
            }
        }

        let session = TradeSession::new(a, b, window);
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        state.active_session_of.insert(a, id);
        state.active_session_of.insert(b, id);
        state.sessions.insert(
            id,
            Entry {
                handle: handle.clone(),
                participants: [a, b],
            },
        );
        Ok(handle)
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.state
            .lock()
            .await
            .sessions
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    /// The session `actor` currently participates in, without liveness checks
    pub async fn session_of(&self, actor: &ActorId) -> Option<SessionHandle> {
        let state = self.state.lock().await;
        let id = state.active_session_of.get(actor)?;
        state.sessions.get(id).map(|entry| entry.handle.clone())
    }

    pub async fn is_trading(&self, actor: &ActorId) -> bool {
        self.state.lock().await.active_session_of.contains_key(actor)
    }

    /// Snapshot of `actor`'s session, evicting it first if its window has passed
    pub async fn session_for(&self, actor: &ActorId) -> Option<SessionView> {
        let handle = self.session_of(actor).await?;
        let mut session = handle.lock().await;
        if self.expire_locked(&mut session, Utc::now()).await {
            return None;
        }
        if session.status().is_terminal() {
            return None;
        }
        Some(session.view())
    }

    /// Delete a session and both participant entries. Idempotent.
    pub async fn remove(&self, id: &SessionId) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.sessions.remove(id) else {
            return false;
        };
        for actor in entry.participants {
            if state.active_session_of.get(&actor) == Some(id) {
                state.active_session_of.remove(&actor);
            }
        }
        true
    }

    /// Expire an overdue `Active` session the caller has locked: mark it,
    /// drop it from the registry and notify both participants.
    pub async fn expire_locked(&self, session: &mut TradeSession, now: DateTime<Utc>) -> bool {
        if !session.expire(now) {
            return false;
        }

        self.remove(&session.id()).await;
        info!(session = %session.id(), "trade session expired");
        self.events.emit(TradeEvent::SessionExpired {
            session: session.id(),
            participants: session.participants(),
        });
        true
    }

    /// Handles of every registered session
    pub async fn handles(&self) -> Vec<SessionHandle> {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .map(|entry| entry.handle.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
