use axum::extract::ws::Utf8Bytes;
use scc::HashMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::helpers::generate_connection_id;

/// Opaque identifier of a client connection; doubles as the player id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(Utf8Bytes),
    /// Transport-level liveness probe
    Ping,
    /// Close the socket and stop writing
    Close,
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;

struct Peer {
    outbox: Outbox,
    /// Set on admission and on every pong, cleared by each heartbeat sweep.
    alive: bool,
    /// Set once the first full snapshot has been queued. Diffs are only
    /// sent to synced peers.
    synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted { id: ConnectionId, count: usize },
    Rejected { count: usize },
}

/// Delivery counts for one broadcast tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickDelivery {
    pub full: usize,
    pub diff: usize,
}

/// Live connections held by this instance.
pub struct Registry {
    peers: HashMap<ConnectionId, Peer>,
    /// Exact number of registered peers.
    live: AtomicUsize,
    /// Serializes the count check and insert of concurrent admissions.
    admission: Mutex<()>,
    max_connections: usize,
}

impl Registry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            peers: HashMap::new(),
            live: AtomicUsize::new(0),
            admission: Mutex::new(()),
            max_connections,
        }
    }

    /// Register a connection under a freshly generated id.
    pub async fn admit(&self, outbox: Outbox) -> Admission {
        self.admit_as(generate_connection_id(), outbox).await
    }

    /// Register a connection under the given id, unless the instance is full.
    ///
    /// The peer starts unsynced: broadcast ticks skip it until it is sent
    /// its first full snapshot.
    pub async fn admit_as(&self, id: ConnectionId, outbox: Outbox) -> Admission {
        let _guard = self.admission.lock().await;

        let count = self.count();
        if count >= self.max_connections {
            debug!(count, max = self.max_connections, "admission rejected");
            return Admission::Rejected { count };
        }

        // Reserve before inserting so a concurrent removal never underflows.
        self.live.fetch_add(1, Ordering::AcqRel);
        let peer = Peer {
            outbox,
            alive: true,
            synced: false,
        };
        if self.peers.insert_async(id.clone(), peer).await.is_err() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            warn!(%id, "connection id already registered");
            return Admission::Rejected { count };
        }

        Admission::Accepted {
            id,
            count: count + 1,
        }
    }

    /// Current number of live connections.
    pub fn count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.max_connections
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.read_async(id, |_, _| ()).await.is_some()
    }

    /// Remove a connection. Returns `true` only for the call that actually
    /// removed it, so a departure is announced once no matter how many
    /// paths notice it.
    pub async fn release(&self, id: &ConnectionId) -> bool {
        let removed = self.peers.remove_async(id).await.is_some();
        if removed {
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Record a pong from the connection.
    pub async fn mark_alive(&self, id: &ConnectionId) -> bool {
        self.peers
            .update_async(id, |_, peer| peer.alive = true)
            .await
            .is_some()
    }

    /// One heartbeat pass. Connections that have not answered since the
    /// previous pass are told to close and removed; the rest are probed.
    /// Returns the removed ids.
    pub async fn sweep(&self) -> Vec<ConnectionId> {
        let mut terminated = Vec::new();

        self.peers
            .retain_async(|id, peer| {
                if !peer.alive {
                    let _ = peer.outbox.send(Outbound::Close);
                    terminated.push(id.clone());
                    return false;
                }
                peer.alive = false;
                if peer.outbox.send(Outbound::Ping).is_err() {
                    debug!(%id, "probe dropped, writer already gone");
                }
                true
            })
            .await;

        self.live.fetch_sub(terminated.len(), Ordering::AcqRel);
        terminated
    }

    /// Queue a frame for one connection. Returns `false` if the connection
    /// is unknown or its writer has stopped.
    pub async fn send(&self, id: &ConnectionId, frame: Outbound) -> bool {
        self.peers
            .read_async(id, |_, peer| peer.outbox.send(frame).is_ok())
            .await
            .unwrap_or(false)
    }

    /// Queue one broadcast tick. Peers in `requesting` get `full` and become
    /// synced; other synced peers get `diff`. Peers still waiting for their
    /// snapshot request get nothing.
    pub async fn deliver_tick(
        &self,
        requesting: &HashSet<ConnectionId>,
        full: &Utf8Bytes,
        diff: &Utf8Bytes,
    ) -> TickDelivery {
        let mut delivered = TickDelivery::default();

        // retain_async visits every entry; nothing is removed here.
        self.peers
            .retain_async(|id, peer| {
                let frame = if requesting.contains(id) {
                    peer.synced = true;
                    delivered.full += 1;
                    full
                } else if peer.synced {
                    delivered.diff += 1;
                    diff
                } else {
                    return true;
                };
                if peer.outbox.send(Outbound::Text(frame.clone())).is_err() {
                    warn!(%id, "send failed, writer already gone");
                }
                true
            })
            .await;

        delivered
    }

    /// Queue the same text frame for every connection. Returns the number
    /// of connections it was queued for.
    pub async fn broadcast(&self, text: Utf8Bytes) -> usize {
        let mut delivered = 0;
        self.peers
            .retain_async(|id, peer| {
                match peer.outbox.send(Outbound::Text(text.clone())) {
                    Ok(()) => delivered += 1,
                    Err(_) => warn!(%id, "send failed, writer already gone"),
                }
                true
            })
            .await;
        delivered
    }
}
