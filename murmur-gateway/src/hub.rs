use std::collections::HashSet;
use tokio::sync::Mutex;

use crate::events::Event;
use crate::game::{GameState, RoundSettings};
use crate::registry::ConnectionId;

struct HubState {
    game: GameState,
    pending: Vec<Event>,
    requesting: HashSet<ConnectionId>,
}

/// Everything drained in one broadcast tick.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Game state as of the drain, after every pending event was applied
    pub snapshot: GameState,
    pub events: Vec<Event>,
    pub requesting: HashSet<ConnectionId>,
}

/// Shared synchronization state of one instance: the game state folded from
/// the log, events not yet broadcast, and connections owed a full snapshot.
///
/// Only the log consumer calls [`Hub::apply`]; connection handlers never
/// touch the game state directly.
pub struct Hub {
    inner: Mutex<HubState>,
}

impl Hub {
    pub fn new(settings: RoundSettings) -> Self {
        Self {
            inner: Mutex::new(HubState {
                game: GameState::new(settings),
                pending: Vec::new(),
                requesting: HashSet::new(),
            }),
        }
    }

    /// Fold a batch of log events into the game state and buffer them for
    /// the next broadcast, in the order given.
    pub async fn apply(&self, events: Vec<Event>) {
        let mut inner = self.inner.lock().await;
        for event in events {
            inner.game.apply(&event);
            inner.pending.push(event);
        }
    }

    /// Mark a connection as owed a full snapshot on the next tick.
    pub async fn request_full_state(&self, id: ConnectionId) {
        self.inner.lock().await.requesting.insert(id);
    }

    /// Take the pending events and requesting set together. Returns `None`
    /// when there is nothing to send.
    pub async fn drain(&self) -> Option<Batch> {
        let mut inner = self.inner.lock().await;
        if inner.pending.is_empty() && inner.requesting.is_empty() {
            return None;
        }

        Some(Batch {
            snapshot: inner.game.clone(),
            events: std::mem::take(&mut inner.pending),
            requesting: std::mem::take(&mut inner.requesting),
        })
    }

    pub async fn snapshot(&self) -> GameState {
        self.inner.lock().await.game.clone()
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}
