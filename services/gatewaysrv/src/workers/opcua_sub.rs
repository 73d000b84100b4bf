//! OPC UA subscription worker
//!
//! Server-pushed acquisition wrapped in a bounded retry harness: up to 5
//! attempts with a fixed 10 s back-off, counter reset once a subscription is
//! successfully created. The data-change callback never blocks the OPC UA
//! stack; sink writes are handed off to spawned tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opcua::client::DataChangeCallback;
use opcua::types::{DataValue, MonitoredItemCreateRequest, NodeId, TimestampsToReturn};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::TelemetryPoint;
use fieldgate_protocols::opcua::{parse_node_id, variant_to_f64, OpcUaSessionManager, SessionHandle};
use fieldgate_protocols::{ProtocolError, Result as ProtocolResult};

use crate::catalog::Device;
use crate::sink::TelemetrySink;

const MAX_ATTEMPTS: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_secs(10);

const SUBSCRIPTION_LIFETIME_COUNT: u32 = 30;
const SUBSCRIPTION_KEEP_ALIVE_COUNT: u32 = 10;
const MONITORED_ITEM_QUEUE_SIZE: u32 = 10;

enum Outcome {
    Cancelled,
    Disconnected,
}

pub async fn run(
    device: Device,
    sink: Arc<TelemetrySink>,
    sessions: Arc<OpcUaSessionManager>,
    token: CancellationToken,
) {
    let Some(endpoint) = device.endpoint_url.clone().filter(|u| !u.is_empty()) else {
        warn!("Device {}: no endpoint URL configured", device.name);
        return;
    };

    debug!(
        "OPC UA subscription worker started: {} ({})",
        device.name, device.id
    );

    let mut attempts = 0u32;
    while attempts < MAX_ATTEMPTS && !token.is_cancelled() {
        attempts += 1;

        match run_subscription(&device, &endpoint, &sink, &sessions, &token).await {
            Ok(Outcome::Cancelled) => break,
            Ok(Outcome::Disconnected) => {
                // The subscription had been established; a disconnect resets
                // the attempt budget.
                attempts = 0;
                warn!(
                    "Device {}: session disconnected; resubscribing",
                    device.name
                );
            },
            Err(e) => {
                warn!(
                    "Device {}: subscription attempt {}/{} failed: {}",
                    device.name, attempts, MAX_ATTEMPTS, e
                );
            },
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(RETRY_BACKOFF) => {},
        }
    }

    debug!(
        "OPC UA subscription worker stopped: {} ({})",
        device.name, device.id
    );
}

async fn run_subscription(
    device: &Device,
    endpoint: &str,
    sink: &Arc<TelemetrySink>,
    sessions: &OpcUaSessionManager,
    token: &CancellationToken,
) -> ProtocolResult<Outcome> {
    let SessionHandle {
        session,
        event_loop,
    } = sessions.connect(endpoint).await?;

    let publishing_interval = device.publishing_interval();
    let sampling_interval_ms = publishing_interval.as_millis() as f64;

    // Node id -> signal mapping consulted by the callback; nodes without a
    // signal are monitored but never emitted.
    let mut signal_map: HashMap<NodeId, Option<Uuid>> = HashMap::new();
    let mut items_to_create: Vec<MonitoredItemCreateRequest> = Vec::new();

    for (index, node) in device.enabled_nodes().enumerate() {
        let node_id = match parse_node_id(&node.node_id) {
            Ok(node_id) => node_id,
            Err(e) => {
                warn!("Device {} node {}: {}", device.name, node.node_id, e);
                continue;
            },
        };
        signal_map.insert(node_id.clone(), node.signal_id);

        // Value attribute, reporting mode; only the sampling parameters
        // deviate from the defaults.
        let mut request: MonitoredItemCreateRequest = node_id.into();
        request.requested_parameters.client_handle = index as u32 + 1;
        request.requested_parameters.sampling_interval = sampling_interval_ms;
        request.requested_parameters.queue_size = MONITORED_ITEM_QUEUE_SIZE;
        request.requested_parameters.discard_oldest = true;
        items_to_create.push(request);
    }

    if items_to_create.is_empty() {
        let _ = session.disconnect().await;
        return Err(ProtocolError::Config(format!(
            "Device {} has no usable nodes",
            device.name
        )));
    }

    let callback = {
        let signal_map = Arc::new(signal_map);
        let device_name = device.name.clone();
        let sink = Arc::clone(sink);
        let token = token.clone();

        DataChangeCallback::new(move |value: DataValue, item: &opcua::client::MonitoredItem| {
            let node_id = &item.item_to_monitor().node_id;
            let Some(signal_id) = signal_map.get(node_id).copied().flatten() else {
                return;
            };
            let Some(value) = value.value.as_ref().and_then(variant_to_f64) else {
                warn!(
                    "Device {} node {}: notification not convertible to double; skipped",
                    device_name, node_id
                );
                return;
            };

            let point = TelemetryPoint::new(signal_id, value, Utc::now());
            let sink = Arc::clone(&sink);
            let token = token.clone();
            // Hand the write off so the notification path never blocks.
            tokio::spawn(async move {
                if let Err(e) = sink.write_points(&[point], &token).await {
                    warn!("Telemetry write failed: {}", e);
                }
            });
        })
    };

    let operation_timeout = sessions.operation_timeout();

    let subscription_id = match timeout(
        operation_timeout,
        session.create_subscription(
            publishing_interval,
            SUBSCRIPTION_LIFETIME_COUNT,
            SUBSCRIPTION_KEEP_ALIVE_COUNT,
            0, // unlimited notifications per publish
            0,
            true,
            callback,
        ),
    )
    .await
    {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            let _ = session.disconnect().await;
            return Err(ProtocolError::Session(format!(
                "Subscription create failed: {e}"
            )));
        },
        Err(_) => {
            let _ = session.disconnect().await;
            return Err(ProtocolError::Timeout(
                "Subscription create timed out".to_string(),
            ));
        },
    };

    let created = match timeout(
        operation_timeout,
        session.create_monitored_items(subscription_id, TimestampsToReturn::Both, items_to_create),
    )
    .await
    {
        Ok(Ok(created)) => created,
        Ok(Err(e)) => {
            let _ = session.disconnect().await;
            return Err(ProtocolError::Session(format!(
                "Monitored items create failed: {e}"
            )));
        },
        Err(_) => {
            let _ = session.disconnect().await;
            return Err(ProtocolError::Timeout(
                "Monitored items create timed out".to_string(),
            ));
        },
    };

    info!(
        "Device {}: subscription {} with {} monitored items",
        device.name,
        subscription_id,
        created.len()
    );

    // Idle-wait: the event loop completes when the session disconnects.
    tokio::select! {
        _ = token.cancelled() => {
            let _ = session.delete_subscription(subscription_id).await;
            let _ = session.disconnect().await;
            Ok(Outcome::Cancelled)
        },
        _ = event_loop => Ok(Outcome::Disconnected),
    }
}
