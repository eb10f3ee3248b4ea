//! Periodic delivery of buffered events to local connections.
//!
//! Each tick sends catch-up clients a full snapshot and everyone else the
//! raw events since the previous tick.

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::events::Event;
use crate::game::GameState;
use crate::hub::{Batch, Hub};
use crate::registry::{ConnectionId, Registry};

#[derive(Serialize)]
struct SnapshotFrame<'a> {
    event: &'static str,
    state: &'a GameState,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FullItem<'a> {
    Snapshot(SnapshotFrame<'a>),
    Event(&'a Event),
}

/// Encoded payloads for one tick.
#[derive(Debug, Clone)]
pub struct Payloads {
    /// `[{"event":"joined","state":...}, ...filtered events]`
    pub full: Utf8Bytes,
    /// `[...events]`
    pub diff: Utf8Bytes,
}

/// Whether a buffered event goes into the full payload after the snapshot.
///
/// A catch-up client already sees its own presence in the snapshot, so its
/// own join is dropped. The leave check is the same membership test with the
/// opposite outcome: a departure is forwarded only when the departing id is
/// itself still in the catch-up set.
fn include_in_full(event: &Event, requesting: &HashSet<ConnectionId>) -> bool {
    match event {
        Event::PlayerJoined { player } => !requesting.contains(&player.id),
        Event::PlayerLeft { player } => requesting.contains(&player.id),
    }
}

pub fn build_payloads(batch: &Batch) -> Result<Payloads, serde_json::Error> {
    let diff = serde_json::to_string(&batch.events)?;

    let mut full = Vec::with_capacity(batch.events.len() + 1);
    full.push(FullItem::Snapshot(SnapshotFrame {
        event: "joined",
        state: &batch.snapshot,
    }));
    full.extend(
        batch
            .events
            .iter()
            .filter(|event| include_in_full(event, &batch.requesting))
            .map(FullItem::Event),
    );
    let full = serde_json::to_string(&full)?;

    Ok(Payloads {
        full: full.into(),
        diff: diff.into(),
    })
}

/// Per-tick delivery counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub full: usize,
    pub diff: usize,
}

pub struct BroadcastBatcher {
    hub: Arc<Hub>,
    registry: Arc<Registry>,
}

impl BroadcastBatcher {
    pub fn new(hub: Arc<Hub>, registry: Arc<Registry>) -> Self {
        Self { hub, registry }
    }

    /// Drain the hub and deliver one tick. Returns `None` when idle.
    pub async fn flush(&self) -> Option<FlushReport> {
        let batch = self.hub.drain().await?;

        let payloads = match build_payloads(&batch) {
            Ok(payloads) => payloads,
            Err(e) => {
                error!(error = %e, dropped = batch.events.len(), "failed to encode broadcast");
                return None;
            }
        };

        let delivered = self
            .registry
            .deliver_tick(&batch.requesting, &payloads.full, &payloads.diff)
            .await;
        let report = FlushReport {
            full: delivered.full,
            diff: delivered.diff,
        };

        debug!(
            events = batch.events.len(),
            full = report.full,
            diff = report.diff,
            "broadcast flushed"
        );
        Some(report)
    }

    pub async fn run(self, period: Duration) {
        info!(?period, "broadcast batcher started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.flush().await;
        }
    }
}
