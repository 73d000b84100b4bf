//! Telemetry sink: batch writes to the time-series store
//!
//! Points become line protocol under the `modbus_telemetry` measurement, a
//! historical name kept for cross-protocol compatibility with the data
//! already in the bucket. One tag (`signal_id`), one field (`value`),
//! millisecond timestamps. Failures bubble to the caller, which logs and
//! drops; retrying here would double-count after the forwarder picked the
//! batch up.

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use common::influx::InfluxClient;
use common::line_protocol::LineProtocolBuilder;
use common::{Error, Result, TelemetryPoint};

/// Measurement name in the time-series store.
pub const TELEMETRY_MEASUREMENT: &str = "modbus_telemetry";

pub struct TelemetrySink {
    influx: InfluxClient,
}

impl TelemetrySink {
    pub fn new(influx: InfluxClient) -> Self {
        Self { influx }
    }

    /// Write a batch of points. Empty batches are not written.
    pub async fn write_points(
        &self,
        points: &[TelemetryPoint],
        token: &CancellationToken,
    ) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let lines = build_lines(points);
        if lines.is_empty() {
            return Ok(());
        }

        tokio::select! {
            _ = token.cancelled() => Err(Error::Timeout("telemetry write cancelled".to_string())),
            result = self.influx.write_lines(&lines) => result,
        }
    }
}

/// Render points as line protocol, dropping anything that violates the
/// timestamp invariant (zero, or more than 1 s ahead of wall-clock).
fn build_lines(points: &[TelemetryPoint]) -> String {
    let skew_limit = Utc::now() + ChronoDuration::seconds(1);

    let mut lines = String::new();
    for point in points {
        let millis = point.timestamp.timestamp_millis();
        if millis <= 0 || point.timestamp > skew_limit {
            warn!(
                "Dropping point with out-of-range timestamp: signal_id={}, ts={}",
                point.signal_id, point.timestamp
            );
            continue;
        }

        let line = LineProtocolBuilder::new(TELEMETRY_MEASUREMENT)
            .tag("signal_id", point.signal_id.to_string())
            .field("value", point.value)
            .timestamp_ms(millis)
            .build();

        if !lines.is_empty() {
            lines.push('\n');
        }
        lines.push_str(&line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn signal(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_lines_shape() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let points = [
            TelemetryPoint::new(signal(1), 20.0, ts),
            TelemetryPoint::new(signal(2), -1.5, ts),
        ];

        let lines = build_lines(&points);
        let rendered: Vec<&str> = lines.lines().collect();

        assert_eq!(rendered.len(), 2);
        assert_eq!(
            rendered[0],
            format!(
                "modbus_telemetry,signal_id={} value=20 1700000000000",
                signal(1)
            )
        );
        assert!(rendered[1].contains("value=-1.5"));
    }

    #[test]
    fn test_future_timestamp_dropped() {
        let future = Utc::now() + ChronoDuration::seconds(30);
        let ok = Utc::now();
        let points = [
            TelemetryPoint::new(signal(1), 1.0, future),
            TelemetryPoint::new(signal(2), 2.0, ok),
        ];

        let lines = build_lines(&points);
        assert_eq!(lines.lines().count(), 1);
        assert!(lines.contains(&signal(2).to_string()));
    }

    #[test]
    fn test_zero_timestamp_dropped() {
        let zero = Utc.timestamp_millis_opt(0).unwrap();
        let points = [TelemetryPoint::new(signal(1), 1.0, zero)];
        assert!(build_lines(&points).is_empty());
    }
}
