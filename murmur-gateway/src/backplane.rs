//! Interfaces to the cluster-wide collaborators: the ordered event log, the
//! durable counter, and the fleet capacity controller. `murmur_store::Store`
//! implements all three; tests may substitute their own.

use async_trait::async_trait;
use murmur_store::{Cursor, LogRecord, Store};
use std::time::Duration;

use crate::error::Result;
use crate::helpers::now;

/// Maximum number of records returned by one log read.
pub const READ_BATCH: usize = 100;

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an encoded event and return its position.
    async fn append(&self, event: String) -> Result<Cursor>;

    /// Read records strictly after `after`, waiting up to `block` for the
    /// first one. An empty result is not an error.
    async fn read(&self, after: Cursor, block: Duration) -> Result<Vec<LogRecord>>;

    /// The log's own liveness round-trip.
    async fn ping(&self) -> Result<String>;
}

#[async_trait]
pub trait DurableCounter: Send + Sync {
    /// Atomically add `by` to `name` (starting from zero) and return the
    /// new value.
    async fn increment(&self, name: &str, by: i64) -> Result<i64>;
}

#[async_trait]
pub trait FleetCapacity: Send + Sync {
    async fn set_desired_capacity(&self, pool: &str, desired: i64, honor_cooldown: bool)
    -> Result<()>;
}

/// A [`Store`] bound to one log stream.
#[derive(Clone)]
pub struct StoreLog {
    store: Store,
    stream: String,
}

impl StoreLog {
    pub fn new(store: Store, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
        }
    }
}

#[async_trait]
impl EventLog for StoreLog {
    async fn append(&self, event: String) -> Result<Cursor> {
        Ok(self.store.append(&self.stream, event, now()).await?)
    }

    async fn read(&self, after: Cursor, block: Duration) -> Result<Vec<LogRecord>> {
        Ok(self
            .store
            .read_after(&self.stream, after, READ_BATCH, block)
            .await?)
    }

    async fn ping(&self) -> Result<String> {
        Ok(self.store.ping().await?)
    }
}

#[async_trait]
impl DurableCounter for Store {
    async fn increment(&self, name: &str, by: i64) -> Result<i64> {
        Ok(Store::increment(self, name, by).await?)
    }
}

#[async_trait]
impl FleetCapacity for Store {
    async fn set_desired_capacity(
        &self,
        pool: &str,
        desired: i64,
        honor_cooldown: bool,
    ) -> Result<()> {
        Ok(Store::set_desired_capacity(self, pool, desired, honor_cooldown, now()).await?)
    }
}
