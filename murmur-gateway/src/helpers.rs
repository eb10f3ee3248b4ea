use rand::distr::{Alphanumeric, SampleString};
use rand::rng;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::registry::ConnectionId;

/// Length of generated connection ids (~125 bits of entropy).
pub const CONNECTION_ID_LEN: usize = 21;

pub fn generate_connection_id() -> ConnectionId {
  ConnectionId::from(Alphanumeric.sample_string(&mut rng(), CONNECTION_ID_LEN))
}

pub fn now() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or_default()
}
