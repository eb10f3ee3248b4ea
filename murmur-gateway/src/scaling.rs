use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{error, info, warn};

use crate::backplane::{DurableCounter, FleetCapacity};
use crate::config::Config;
use crate::error::Result;

/// True once `count` reaches half of `max_connections`.
pub fn pressure_threshold_reached(count: usize, max_connections: usize) -> bool {
    count * 2 >= max_connections
}

/// Asks the fleet manager for one more instance when this instance gets busy.
///
/// The in-flight flag is set by the first admission that crosses the
/// threshold and is never cleared, so each process issues at most one
/// capacity request in its lifetime. Instances do not coordinate; the
/// durable counter keeps their requested values consistent.
pub struct ScalingGate {
    counter: Arc<dyn DurableCounter>,
    fleet: Arc<dyn FleetCapacity>,
    counter_name: String,
    pool: String,
    max_connections: usize,
    production: bool,
    in_flight: AtomicBool,
    /// Last desired capacity read back from the counter, 0 until known
    desired: AtomicI64,
    was_full: AtomicBool,
}

impl ScalingGate {
    pub fn new(
        config: &Config,
        counter: Arc<dyn DurableCounter>,
        fleet: Arc<dyn FleetCapacity>,
    ) -> Self {
        Self {
            counter,
            fleet,
            counter_name: config.counter_name.clone(),
            pool: config.fleet_pool.clone(),
            max_connections: config.max_connections,
            production: config.production,
            in_flight: AtomicBool::new(false),
            desired: AtomicI64::new(0),
            was_full: AtomicBool::new(false),
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn desired_capacity(&self) -> Option<i64> {
        match self.desired.load(Ordering::Acquire) {
            0 => None,
            desired => Some(desired),
        }
    }

    /// Claim the scale-up for this admission. Only one caller ever wins.
    pub fn should_scale(&self, count: usize) -> bool {
        if !self.production || !pressure_threshold_reached(count, self.max_connections) {
            return false;
        }
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Bump the shared desired capacity and hand it to the fleet manager,
    /// with cooldown disabled so the change applies immediately.
    pub async fn scale_up(&self) -> Result<i64> {
        let desired = self.counter.increment(&self.counter_name, 1).await?;
        self.desired.store(desired, Ordering::Release);

        self.fleet
            .set_desired_capacity(&self.pool, desired, false)
            .await?;

        info!(pool = %self.pool, desired, "requested more capacity");
        Ok(desired)
    }

    /// Called after every admission with the post-admission count. Spawns
    /// the scale-up when this admission claimed it and returns whether it did.
    pub fn on_admit(self: &Arc<Self>, count: usize) -> bool {
        self.observe(count);

        if !self.should_scale(count) {
            return false;
        }

        let gate = Arc::clone(self);
        tokio::spawn(async move {
            // The flag stays set on failure.
            if let Err(e) = gate.scale_up().await {
                error!(error = %e, pool = %gate.pool, "scale-up failed");
            }
        });
        true
    }

    /// Log transitions into and out of the full state.
    pub fn observe(&self, count: usize) {
        let full = count >= self.max_connections;
        if self.was_full.swap(full, Ordering::AcqRel) != full {
            if full {
                warn!(count, max = self.max_connections, "instance is full");
            } else {
                info!(count, max = self.max_connections, "instance has room again");
            }
        }
    }
}
