//! Modbus device worker
//!
//! Per poll cycle: fresh TCP connection (3 s timeout, connect phase gated by
//! the shared semaphore), plan, read each range, decode, emit, close. A
//! failed range does not abort the cycle, but a framing violation poisons
//! the connection and abandons the remaining ranges. A failed cycle mutates
//! nothing; the next one starts from the catalog again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use common::TelemetryPoint;
use fieldgate_protocols::modbus::{client, decode_register, ReadRange};
use fieldgate_protocols::ProtocolError;

use crate::catalog::Device;
use crate::sink::TelemetrySink;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(
    device: Device,
    sink: Arc<TelemetrySink>,
    connect_permits: Arc<Semaphore>,
    token: CancellationToken,
) {
    debug!("Modbus worker started: {} ({})", device.name, device.id);
    let interval = device.poll_interval();

    loop {
        if token.is_cancelled() {
            break;
        }

        poll_cycle(&device, &sink, &connect_permits, &token).await;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }

    debug!("Modbus worker stopped: {} ({})", device.name, device.id);
}

async fn poll_cycle(
    device: &Device,
    sink: &TelemetrySink,
    connect_permits: &Semaphore,
    token: &CancellationToken,
) {
    let Some(host) = device.host.as_deref().filter(|h| !h.is_empty()) else {
        warn!("Device {}: no host configured; skipping cycle", device.name);
        return;
    };
    let port = device.port.unwrap_or(502);

    let plan = device.modbus_read_plan();
    if plan.is_empty() {
        debug!("Device {}: nothing to read", device.name);
        return;
    }

    let Some(mut stream) = open_connection(device, host, port, connect_permits, token).await
    else {
        return;
    };

    // One timestamp per cycle, captured before the first read.
    let now = Utc::now();
    let mut points = Vec::new();

    'ranges: for slave_plan in &plan {
        for range in &slave_plan.ranges {
            if token.is_cancelled() {
                return;
            }

            let read = timeout(
                READ_TIMEOUT,
                client::read_holding_registers(
                    &mut stream,
                    slave_plan.unit_id,
                    range.start,
                    range.count,
                ),
            );

            let words = tokio::select! {
                _ = token.cancelled() => return,
                result = read => match result {
                    Ok(Ok(words)) => words,
                    Ok(Err(e)) => {
                        warn!(
                            "Device {} unit {}: read {}+{} failed: {}",
                            device.name, slave_plan.unit_id, range.start, range.count, e
                        );
                        if matches!(e, ProtocolError::Protocol(_)) {
                            // Mis-framed stream; nothing further on this
                            // connection can be trusted.
                            break 'ranges;
                        }
                        continue;
                    },
                    Err(_) => {
                        warn!(
                            "Device {} unit {}: read {}+{} timed out",
                            device.name, slave_plan.unit_id, range.start, range.count
                        );
                        continue;
                    },
                },
            };

            collect_points(range, slave_plan.unit_id, &words, device, now, &mut points);
        }
    }

    drop(stream);

    if points.is_empty() {
        return;
    }
    if let Err(e) = sink.write_points(&points, token).await {
        warn!("Device {}: telemetry write failed: {}", device.name, e);
    }
}

async fn open_connection(
    device: &Device,
    host: &str,
    port: u16,
    connect_permits: &Semaphore,
    token: &CancellationToken,
) -> Option<TcpStream> {
    let permit = tokio::select! {
        _ = token.cancelled() => return None,
        permit = connect_permits.acquire() => permit.ok()?,
    };

    let stream = tokio::select! {
        _ = token.cancelled() => None,
        result = client::connect(host, port, CONNECT_TIMEOUT) => match result {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("Device {}: connect failed: {}", device.name, e);
                None
            },
        },
    };

    drop(permit);
    stream
}

fn collect_points(
    range: &ReadRange,
    unit_id: u8,
    words: &[u16],
    device: &Device,
    now: chrono::DateTime<Utc>,
    points: &mut Vec<TelemetryPoint>,
) {
    for item in &range.items {
        // Unmapped registers keep the range contiguous but never emit.
        let Some(signal_id) = item.register.signal_id else {
            continue;
        };
        let offset = (item.protocol_address - range.start) as usize;
        let Some(value) = decode_register(words, offset, &item.register, device.endianness) else {
            debug!(
                "Device {} unit {}: window too short for register at {}",
                device.name, unit_id, item.protocol_address
            );
            continue;
        };
        points.push(TelemetryPoint::new(signal_id, value, now));
    }
}
