mod error;
mod models;

pub use error::{Result, StoreError};
pub use models::{CapacityRequest, Cursor, LogRecord};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, params};
use tracing::{debug, info};

/// How often a blocked reader re-checks the log for records appended by
/// other processes sharing the same database file.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared backing store for every gateway instance: the ordered event log,
/// named durable counters, and the fleet capacity table.
#[derive(Clone)]
pub struct Store {
  conn: Connection,
  appended: Arc<Notify>,
}

impl Store {
  /// Open or create a store at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(StoreError::Sqlite)?;
    let store = Self {
      conn,
      appended: Arc::new(Notify::new()),
    };
    store.initialize().await?;
    Ok(store)
  }

  /// Create an in-memory store (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(StoreError::Sqlite)?;
    let store = Self {
      conn,
      appended: Arc::new(Notify::new()),
    };
    store.initialize().await?;
    Ok(store)
  }

  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| -> rusqlite::Result<()> {
                // WAL lets several gateway processes read while one appends
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    r#"
                    -- Append-only, strictly ordered event log
                    CREATE TABLE IF NOT EXISTS event_log (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        stream TEXT NOT NULL,
                        event TEXT NOT NULL,
                        appended_at INTEGER NOT NULL
                    );

                    -- Named durable counters
                    CREATE TABLE IF NOT EXISTS counters (
                        name TEXT PRIMARY KEY,
                        value INTEGER NOT NULL
                    );

                    -- Desired capacity per fleet pool, polled by the fleet manager
                    CREATE TABLE IF NOT EXISTS fleet_capacity (
                        pool TEXT PRIMARY KEY,
                        desired INTEGER NOT NULL,
                        honor_cooldown INTEGER NOT NULL,
                        updated_at INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_event_log_stream ON event_log(stream, id);
                    "#,
                )?;
                Ok(())
            })
            .await?;

    info!("store initialized");
    Ok(())
  }

  // ========================================================================
  // Event Log
  // ========================================================================

  /// Append an already-encoded event to a stream and return its position.
  pub async fn append(&self, stream: &str, event: String, now: i64) -> Result<Cursor> {
    if stream.is_empty() {
      return Err(StoreError::EmptyStream);
    }
    let stream = stream.to_string();

    let id = self
      .conn
      .call(move |conn| -> rusqlite::Result<i64> {
        conn
          .prepare_cached("INSERT INTO event_log (stream, event, appended_at) VALUES (?1, ?2, ?3)")?
          .execute(params![&stream, &event, now])?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    self.appended.notify_waiters();
    debug!(id, "appended event");
    Ok(Cursor(id as u64))
  }

  /// Read up to `limit` records strictly after `cursor`, in log order.
  ///
  /// Waits up to `block` for the first record to appear. Returns an empty
  /// batch when nothing arrived in time; callers treat that as a spurious
  /// wakeup and read again.
  pub async fn read_after(
    &self,
    stream: &str,
    cursor: Cursor,
    limit: usize,
    block: Duration,
  ) -> Result<Vec<LogRecord>> {
    let deadline = Instant::now() + block;

    loop {
      // Register interest before querying so an append racing the query
      // still wakes us.
      let notified = self.appended.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      let records = self.fetch_after(stream, cursor, limit).await?;
      if !records.is_empty() {
        return Ok(records);
      }

      let now = Instant::now();
      if now >= deadline {
        return Ok(records);
      }
      let wait = (deadline - now).min(POLL_INTERVAL);
      let _ = tokio::time::timeout(wait, notified).await;
    }
  }

  async fn fetch_after(&self, stream: &str, cursor: Cursor, limit: usize) -> Result<Vec<LogRecord>> {
    let stream = stream.to_string();
    let records = self
      .conn
      .call(move |conn| -> rusqlite::Result<Vec<LogRecord>> {
        let mut stmt = conn.prepare_cached(
          "SELECT id, event FROM event_log WHERE stream = ?1 AND id > ?2 ORDER BY id LIMIT ?3",
        )?;

        let records = stmt
          .query_map(params![&stream, cursor.0 as i64, limit as i64], |row| {
            Ok(LogRecord {
              id: Cursor(row.get::<_, i64>(0)? as u64),
              event: row.get(1)?,
            })
          })?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
      })
      .await?;

    Ok(records)
  }

  /// Round-trip a trivial query. Used as the log's liveness probe.
  pub async fn ping(&self) -> Result<String> {
    let reply = self
      .conn
      .call(|conn| -> rusqlite::Result<String> {
        conn.query_row("SELECT 'PONG'", [], |row| row.get(0))
      })
      .await?;

    Ok(reply)
  }

  // ========================================================================
  // Durable Counters
  // ========================================================================

  /// Atomically add `by` to a named counter (starting at zero) and return
  /// the new value.
  pub async fn increment(&self, name: &str, by: i64) -> Result<i64> {
    if name.is_empty() {
      return Err(StoreError::EmptyCounter);
    }
    let name = name.to_string();

    let value = self
      .conn
      .call(move |conn| -> rusqlite::Result<i64> {
        conn
          .prepare_cached(
            r#"
                    INSERT INTO counters (name, value) VALUES (?1, ?2)
                    ON CONFLICT(name) DO UPDATE SET value = value + excluded.value
                    RETURNING value
                    "#,
          )?
          .query_row(params![&name, by], |row| row.get(0))
      })
      .await?;

    debug!(value, "incremented counter");
    Ok(value)
  }

  /// Current value of a counter, or `None` if it was never incremented.
  pub async fn counter(&self, name: &str) -> Result<Option<i64>> {
    let name = name.to_string();
    let value = self
      .conn
      .call(move |conn| -> rusqlite::Result<Option<i64>> {
        conn
          .prepare_cached("SELECT value FROM counters WHERE name = ?1")?
          .query_row(params![&name], |row| row.get(0))
          .optional()
      })
      .await?;

    Ok(value)
  }

  // ========================================================================
  // Fleet Capacity
  // ========================================================================

  /// Record the desired capacity for a pool, replacing any earlier request.
  pub async fn set_desired_capacity(
    &self,
    pool: &str,
    desired: i64,
    honor_cooldown: bool,
    now: i64,
  ) -> Result<()> {
    if desired < 0 {
      return Err(StoreError::NegativeCapacity(desired));
    }
    let pool = pool.to_string();

    self
      .conn
      .call(move |conn| -> rusqlite::Result<()> {
        conn
          .prepare_cached(
            r#"
                    INSERT INTO fleet_capacity (pool, desired, honor_cooldown, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(pool) DO UPDATE SET
                        desired = excluded.desired,
                        honor_cooldown = excluded.honor_cooldown,
                        updated_at = excluded.updated_at
                    "#,
          )?
          .execute(params![&pool, desired, honor_cooldown, now])?;
        Ok(())
      })
      .await?;

    info!(desired, honor_cooldown, "desired capacity updated");
    Ok(())
  }

  /// The last capacity request recorded for a pool.
  pub async fn capacity_request(&self, pool: &str) -> Result<Option<CapacityRequest>> {
    let pool = pool.to_string();
    let request = self
      .conn
      .call(move |conn| -> rusqlite::Result<Option<CapacityRequest>> {
        conn
          .prepare_cached(
            "SELECT pool, desired, honor_cooldown, updated_at FROM fleet_capacity WHERE pool = ?1",
          )?
          .query_row(params![&pool], |row| {
            Ok(CapacityRequest {
              pool: row.get(0)?,
              desired: row.get(1)?,
              honor_cooldown: row.get(2)?,
              updated_at: row.get(3)?,
            })
          })
          .optional()
      })
      .await?;

    Ok(request)
  }
}
