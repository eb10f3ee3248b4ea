use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::AppState;
use crate::events::Event;
use crate::registry::ConnectionId;
use crate::session::announce;

/// One liveness pass. Unresponsive connections are dropped and announced as
/// departed, the same as an explicit close.
pub async fn tick(state: &AppState) -> Vec<ConnectionId> {
    let terminated = state.registry.sweep().await;
    if terminated.is_empty() {
        return terminated;
    }

    for id in &terminated {
        warn!(%id, "terminating unresponsive connection");
        announce(state, Event::left(id.clone())).await;
    }
    state.scaling.observe(state.registry.count());

    terminated
}

pub async fn run(state: Arc<AppState>, period: Duration) {
    info!(?period, "heartbeat started");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval fires immediately; the first probe goes out one period in
    ticker.tick().await;
    loop {
        ticker.tick().await;
        tick(&state).await;
    }
}
