//! The single sequential reader of the event log.
//!
//! Every instance runs one consumer. Because all instances fold the same
//! totally ordered log, their game states converge no matter which instance
//! produced a join or leave. The cursor lives only in memory, so a restarted
//! process replays the log from the origin.

use murmur_store::{Cursor, LogRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backplane::EventLog;
use crate::error::GatewayError;
use crate::events::Event;
use crate::hub::Hub;

/// Pause after a failed read before trying again.
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct LogConsumer {
    log: Arc<dyn EventLog>,
    hub: Arc<Hub>,
    cursor: Cursor,
    block: Duration,
}

impl LogConsumer {
    pub fn new(log: Arc<dyn EventLog>, hub: Arc<Hub>, block: Duration) -> Self {
        Self {
            log,
            hub,
            cursor: Cursor::ORIGIN,
            block,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Read once and apply whatever came back. Returns the number of events
    /// applied; zero means the read came back empty.
    pub async fn step(&mut self) -> Result<usize, GatewayError> {
        let records = self.log.read(self.cursor, self.block).await?;
        let Some(last) = records.last().map(|r| r.id) else {
            return Ok(0);
        };

        let events = decode_batch(&records);
        let applied = events.len();
        self.hub.apply(events).await;
        self.cursor = last;

        debug!(applied, cursor = %self.cursor, "applied log batch");
        Ok(applied)
    }

    /// Consume forever.
    pub async fn run(mut self) {
        info!(cursor = %self.cursor, "log consumer started");
        loop {
            if let Err(e) = self.step().await {
                error!(error = %e, cursor = %self.cursor, "event log read failed");
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

/// Decode records in log order, skipping any that are not valid events.
fn decode_batch(records: &[LogRecord]) -> Vec<Event> {
    records
        .iter()
        .filter_map(|record| match serde_json::from_str::<Event>(&record.event) {
            Ok(event) => Some(event),
            Err(source) => {
                let e = GatewayError::Decode {
                    cursor: record.id,
                    source,
                };
                warn!(error = %e, "skipping log record");
                None
            }
        })
        .collect()
}
