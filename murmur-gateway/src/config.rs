use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

use crate::game::RoundSettings;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    /// Env: PORT (default: 8080)
    pub port: u16,

    /// Maximum number of concurrently connected sockets on this instance
    /// Env: MAX_CONNECTIONS (default: 2)
    pub max_connections: usize,

    /// Whether this is a production deployment. Only production instances
    /// ask the fleet manager for more capacity.
    /// Env: ENVIRONMENT (default: "development"; "production" enables scaling)
    pub production: bool,

    /// SQLite file shared by every gateway instance
    /// Env: STORE_PATH (default: "murmur.db")
    pub store_path: String,

    /// Event log stream carrying join/leave records
    /// Env: LOG_STREAM (default: "game-events")
    pub log_stream: String,

    /// How long a single log read blocks waiting for new records
    /// Env: LOG_BLOCK_MS (default: 5000)
    pub log_block: Duration,

    /// Durable counter holding the fleet's desired capacity
    /// Env: COUNTER_NAME (default: "desired-capacity")
    pub counter_name: String,

    /// Fleet pool to scale
    /// Env: FLEET_POOL (default: "murmur-gateway")
    pub fleet_pool: String,

    /// Liveness probe period
    /// Env: HEARTBEAT_INTERVAL_SECS (default: 25, minimum 1)
    pub heartbeat_interval: Duration,

    /// Broadcast tick period
    /// Env: BROADCAST_INTERVAL_MS (default: 1000, minimum 1)
    pub broadcast_interval: Duration,

    /// Request timeout for the HTTP status routes
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Inbound WebSocket text frames larger than this are discarded
    /// Env: MAX_MESSAGE_BYTES (default: 4096)
    pub max_message_bytes: usize,

    /// Static round configuration shipped in every snapshot
    /// Env: ROUND_LENGTH_SECS (60), ALLOW_PAN, ALLOW_ZOOM, ALLOW_MOVE (true)
    pub round: RoundSettings,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for local runs mostly
        let defaults = Self::default();
        Self {
            port: env_or_default("PORT", defaults.port),
            max_connections: env_or_default("MAX_CONNECTIONS", defaults.max_connections),
            production: env_or_default_string("ENVIRONMENT", "development") == "production",
            store_path: env_or_default_string("STORE_PATH", &defaults.store_path),
            log_stream: env_or_default_string("LOG_STREAM", &defaults.log_stream),
            log_block: Duration::from_millis(env_or_default("LOG_BLOCK_MS", 5000)),
            counter_name: env_or_default_string("COUNTER_NAME", &defaults.counter_name),
            fleet_pool: env_or_default_string("FLEET_POOL", &defaults.fleet_pool),
            heartbeat_interval: Duration::from_secs(env_period("HEARTBEAT_INTERVAL_SECS", 25)),
            broadcast_interval: Duration::from_millis(env_period("BROADCAST_INTERVAL_MS", 1000)),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            max_message_bytes: env_or_default("MAX_MESSAGE_BYTES", defaults.max_message_bytes),
            round: RoundSettings {
                round_length: env_or_default("ROUND_LENGTH_SECS", defaults.round.round_length),
                pan: env_or_default("ALLOW_PAN", defaults.round.pan),
                zoom: env_or_default("ALLOW_ZOOM", defaults.round.zoom),
                movement: env_or_default("ALLOW_MOVE", defaults.round.movement),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            max_connections: 2,
            production: false,
            store_path: "murmur.db".to_string(),
            log_stream: "game-events".to_string(),
            log_block: Duration::from_millis(5000),
            counter_name: "desired-capacity".to_string(),
            fleet_pool: "murmur-gateway".to_string(),
            heartbeat_interval: Duration::from_secs(25),
            broadcast_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
            max_message_bytes: 4096,
            round: RoundSettings::default(),
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse a timer period, which must be at least one unit
fn env_period(key: &str, default: u64) -> u64 {
    period_or_default(var(key).ok().as_deref(), default)
}

fn period_or_default(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|val| val.parse().ok())
        .unwrap_or(default)
        .max(1)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
