//! Telemetry types shared between acquisition workers, the sink and the
//! forwarder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One normalised telemetry reading.
///
/// `signal_id` is the upstream-assigned measurement identity; points without
/// a signal id are never constructed. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub signal_id: Uuid,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryPoint {
    pub fn new(signal_id: Uuid, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            signal_id,
            value,
            timestamp,
        }
    }
}
