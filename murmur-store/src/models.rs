/// Position in the event log. Records are strictly greater than the cursor
/// they were read after; `ORIGIN` precedes every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cursor(pub u64);

impl Cursor {
  pub const ORIGIN: Cursor = Cursor(0);
}

impl std::fmt::Display for Cursor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A single entry read back from the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
  /// Log-assigned, monotonically increasing position
  pub id: Cursor,
  /// The JSON-encoded event, exactly as appended
  pub event: String,
}

/// The most recent capacity request recorded for a fleet pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRequest {
  pub pool: String,
  pub desired: i64,
  /// Whether the fleet manager may delay the change for a cooldown period
  pub honor_cooldown: bool,
  /// Unix timestamp of the last update
  pub updated_at: i64,
}
