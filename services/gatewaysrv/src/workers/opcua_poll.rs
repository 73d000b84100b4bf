//! OPC UA polling worker
//!
//! One session per worker lifetime. Each cycle reads the Value attribute of
//! every enabled node synchronously, coerces to f64 and flushes one batch.
//! A failed read or a finished session event loop means the session is gone;
//! the worker terminates and the supervisor restarts it.

use std::sync::Arc;

use chrono::Utc;
use opcua::types::{ReadValueId, TimestampsToReturn};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use common::TelemetryPoint;
use fieldgate_protocols::opcua::{parse_node_id, variant_to_f64, OpcUaSessionManager};

use crate::catalog::Device;
use crate::sink::TelemetrySink;

pub async fn run(
    device: Device,
    sink: Arc<TelemetrySink>,
    sessions: Arc<OpcUaSessionManager>,
    token: CancellationToken,
) {
    let Some(endpoint) = device.endpoint_url.as_deref().filter(|u| !u.is_empty()) else {
        warn!("Device {}: no endpoint URL configured", device.name);
        return;
    };

    let handle = match sessions.connect(endpoint).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Device {}: session open failed: {}", device.name, e);
            return;
        },
    };

    debug!("OPC UA polling worker started: {} ({})", device.name, device.id);

    // Resolve node ids once; unparseable ids are reported and dropped.
    let nodes: Vec<(Option<Uuid>, String, ReadValueId)> = device
        .enabled_nodes()
        .filter_map(|node| match parse_node_id(&node.node_id) {
            Ok(node_id) => Some((
                node.signal_id,
                node.display_name.clone(),
                ReadValueId::from(node_id),
            )),
            Err(e) => {
                warn!("Device {} node {}: {}", device.name, node.node_id, e);
                None
            },
        })
        .collect();

    let interval = device.poll_interval();
    let operation_timeout = sessions.operation_timeout();

    'poll: loop {
        if token.is_cancelled() || handle.event_loop.is_finished() {
            break;
        }

        let now = Utc::now();
        let mut points = Vec::new();

        for (signal_id, display_name, read_id) in &nodes {
            if token.is_cancelled() {
                break 'poll;
            }

            let read_ids = [read_id.clone()];
            let read = timeout(
                operation_timeout,
                handle
                    .session
                    .read(&read_ids, TimestampsToReturn::Neither, 0.0),
            );

            let values = tokio::select! {
                _ = token.cancelled() => break 'poll,
                result = read => match result {
                    Ok(Ok(values)) => values,
                    Ok(Err(status)) => {
                        warn!(
                            "Device {}: session read failed ({}); terminating worker",
                            device.name, status
                        );
                        break 'poll;
                    },
                    Err(_) => {
                        warn!(
                            "Device {}: session read timed out; terminating worker",
                            device.name
                        );
                        break 'poll;
                    },
                },
            };

            let variant = values.first().and_then(|dv| dv.value.as_ref());
            match variant.and_then(variant_to_f64) {
                Some(value) => {
                    if let Some(signal_id) = signal_id {
                        points.push(TelemetryPoint::new(*signal_id, value, now));
                    }
                },
                None => {
                    warn!(
                        "Device {} node {}: value not convertible to double; skipped",
                        device.name, display_name
                    );
                },
            }
        }

        if !points.is_empty() {
            if let Err(e) = sink.write_points(&points, &token).await {
                warn!("Device {}: telemetry write failed: {}", device.name, e);
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }

    let _ = handle.session.disconnect().await;
    debug!("OPC UA polling worker stopped: {} ({})", device.name, device.id);
}
