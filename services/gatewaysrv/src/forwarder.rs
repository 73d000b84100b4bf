//! Telemetry forwarder: drains the time-series store onto the message bus
//!
//! Query the window `[watermark, now]`, publish every record durably, then
//! advance the watermark to the cycle's `now`. The watermark never advances
//! on a failed cycle, which is what makes delivery at-least-once; the
//! upstream consumer deduplicates on `(signalId, timestamp)`. Per-record
//! garbage (missing signal id, unparseable value) is skipped with a warning
//! and neither halts the cycle nor blocks the watermark.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::influx::InfluxClient;

use crate::amqp::AmqpPublisher;
use crate::config::ForwarderSection;
use crate::error::Result;
use crate::sink::TELEMETRY_MEASUREMENT;

const BROKER_BACKOFF: Duration = Duration::from_secs(10);

/// Wire message published to the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub signal_id: Uuid,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct TelemetryForwarder {
    influx: InfluxClient,
    broker: Arc<AmqpPublisher>,
    config: ForwarderSection,
}

impl TelemetryForwarder {
    pub fn new(influx: InfluxClient, broker: Arc<AmqpPublisher>, config: ForwarderSection) -> Self {
        Self {
            influx,
            broker,
            config,
        }
    }

    pub async fn run(self, token: CancellationToken) {
        let period = Duration::from_secs(self.config.interval_seconds.max(1));
        let mut watermark = Utc::now() - ChronoDuration::hours(1);

        info!(
            "Forwarder started: queue={}, period={:?}",
            self.broker.queue_name(),
            period
        );

        loop {
            match self.drain_window(watermark).await {
                Ok((cycle_start, published)) => {
                    if published > 0 {
                        debug!("Forwarded {} points", published);
                    }
                    watermark = cycle_start;
                },
                Err(e) => {
                    warn!("Forward cycle failed (watermark held): {e}");
                    self.broker.reset().await;
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(BROKER_BACKOFF) => {},
                    }
                    continue;
                },
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(period) => {},
            }
        }

        info!("Forwarder stopped");
    }

    /// One drain cycle. Returns the cycle-start `now` (the new watermark)
    /// and the number of records published.
    async fn drain_window(&self, watermark: DateTime<Utc>) -> Result<(DateTime<Utc>, usize)> {
        let now = Utc::now();
        let flux = build_flux_query(self.influx.bucket(), watermark, now);
        let csv = self.influx.query_csv(&flux).await?;

        let records = parse_flux_records(&csv);
        if records.is_empty() {
            return Ok((now, 0));
        }

        let mut min_ts = records[0].timestamp;
        let mut max_ts = records[0].timestamp;

        for record in &records {
            let payload = serde_json::to_vec(record).map_err(common::Error::from)?;
            self.broker.publish_json(&payload).await?;
            min_ts = min_ts.min(record.timestamp);
            max_ts = max_ts.max(record.timestamp);
        }

        if self.config.delete_after_publish {
            let predicate = format!(r#"_measurement="{TELEMETRY_MEASUREMENT}""#);
            self.influx
                .delete_range(min_ts, max_ts + ChronoDuration::seconds(1), &predicate)
                .await?;
        }

        Ok((now, records.len()))
    }
}

fn build_flux_query(bucket: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> String {
    format!(
        r#"from(bucket: "{bucket}")
  |> range(start: {start}, stop: {stop})
  |> filter(fn: (r) => r._measurement == "{TELEMETRY_MEASUREMENT}" and r._field == "value")
  |> filter(fn: (r) => exists r.signal_id and r.signal_id != "")
  |> sort(columns: ["_time"])"#,
        start = start.to_rfc3339_opts(SecondsFormat::Millis, true),
        stop = stop.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Parse the plain-CSV Flux response (annotations disabled, one header row
/// per table). Malformed records are skipped with a warning.
fn parse_flux_records(csv: &str) -> Vec<WireMessage> {
    let mut records = Vec::new();
    let mut columns: Option<(usize, usize, usize)> = None;

    for line in csv.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();

        if fields.iter().any(|f| *f == "_time") {
            let time_idx = fields.iter().position(|f| *f == "_time");
            let value_idx = fields.iter().position(|f| *f == "_value");
            let signal_idx = fields.iter().position(|f| *f == "signal_id");
            columns = match (time_idx, value_idx, signal_idx) {
                (Some(t), Some(v), Some(s)) => Some((t, v, s)),
                _ => {
                    warn!("Flux result missing expected columns: {line}");
                    None
                },
            };
            continue;
        }

        let Some((time_idx, value_idx, signal_idx)) = columns else {
            continue;
        };
        let (Some(raw_time), Some(raw_value), Some(raw_signal)) = (
            fields.get(time_idx),
            fields.get(value_idx),
            fields.get(signal_idx),
        ) else {
            warn!("Skipping short Flux record: {line}");
            continue;
        };

        let Ok(signal_id) = raw_signal.parse::<Uuid>() else {
            warn!("Skipping record with invalid signal_id: {raw_signal}");
            continue;
        };
        let Ok(value) = raw_value.parse::<f64>() else {
            warn!("Skipping record with unparseable value: {raw_value}");
            continue;
        };
        let Ok(timestamp) = raw_time.parse::<DateTime<Utc>>() else {
            warn!("Skipping record with unparseable time: {raw_time}");
            continue;
        };

        records.push(WireMessage {
            signal_id,
            value,
            timestamp,
        });
    }

    records
}
