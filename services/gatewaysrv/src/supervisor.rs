//! Device supervisor
//!
//! Owns the worker index keyed by `(role, device_id)` and reconciles it
//! against the catalog cache every 5 s: spawn workers for new devices, reap
//! completed ones. Sessions and connections are owned by the workers
//! themselves and torn down when a worker exits, so reaping is index-only.
//! A device missing from a later snapshot does not kill its worker; catalog
//! refresh is advisory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use fieldgate_protocols::opcua::OpcUaSessionManager;

use crate::cache::CatalogCache;
use crate::catalog::{Device, Partition};
use crate::sink::TelemetrySink;
use crate::workers;

const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

/// Worker roles; at most one live worker per `(role, device)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Modbus,
    OpcUaPoll,
    OpcUaSub,
}

impl WorkerRole {
    const ALL: [WorkerRole; 3] = [
        WorkerRole::Modbus,
        WorkerRole::OpcUaPoll,
        WorkerRole::OpcUaSub,
    ];

    fn partition(self) -> Partition {
        match self {
            WorkerRole::Modbus => Partition::ModbusDevices,
            WorkerRole::OpcUaPoll => Partition::OpcUaPollingDevices,
            WorkerRole::OpcUaSub => Partition::OpcUaSubDevices,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerRole::Modbus => "modbus",
            WorkerRole::OpcUaPoll => "opcua-poll",
            WorkerRole::OpcUaSub => "opcua-sub",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WorkerKey {
    role: WorkerRole,
    device_id: Uuid,
}

pub struct DeviceSupervisor {
    cache: Arc<CatalogCache>,
    sink: Arc<TelemetrySink>,
    sessions: Arc<OpcUaSessionManager>,
    connect_permits: Arc<Semaphore>,
    workers: HashMap<WorkerKey, JoinHandle<()>>,
}

impl DeviceSupervisor {
    pub fn new(
        cache: Arc<CatalogCache>,
        sink: Arc<TelemetrySink>,
        sessions: Arc<OpcUaSessionManager>,
        max_concurrent_polls: usize,
    ) -> Self {
        Self {
            cache,
            sink,
            sessions,
            connect_permits: Arc::new(Semaphore::new(max_concurrent_polls.max(1))),
            workers: HashMap::new(),
        }
    }

    pub async fn run(mut self, token: CancellationToken) {
        info!("Supervisor started");

        loop {
            self.reap_finished();

            for role in WorkerRole::ALL {
                self.reconcile_role(role, &token).await;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(RECONCILE_INTERVAL) => {},
            }
        }

        // Workers observe the same token; wait for them to drain.
        for (key, handle) in self.workers.drain() {
            let _ = handle.await;
            debug!("Worker drained: {}/{}", key.role, key.device_id);
        }

        info!("Supervisor stopped");
    }

    fn reap_finished(&mut self) {
        self.workers.retain(|key, handle| {
            if handle.is_finished() {
                debug!("Reaped worker: {}/{}", key.role, key.device_id);
                false
            } else {
                true
            }
        });
    }

    async fn reconcile_role(&mut self, role: WorkerRole, token: &CancellationToken) {
        let Some(devices) = self.cache.get(role.partition()).await else {
            return;
        };

        for device in devices.iter() {
            let key = WorkerKey {
                role,
                device_id: device.id,
            };
            if self.workers.contains_key(&key) {
                continue;
            }

            let handle = self.spawn_worker(role, device.clone(), token.child_token());
            let previous = self.workers.insert(key, handle);
            // Two live workers for one (role, device) is an impossible
            // state; crash and let the process supervisor restart us.
            assert!(
                previous.is_none(),
                "duplicate worker for {}/{}",
                role,
                device.id
            );
        }
    }

    fn spawn_worker(
        &self,
        role: WorkerRole,
        device: Device,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        info!(
            "Starting {} worker for {} ({})",
            role, device.name, device.id
        );

        let sink = Arc::clone(&self.sink);
        match role {
            WorkerRole::Modbus => {
                let permits = Arc::clone(&self.connect_permits);
                tokio::spawn(workers::modbus::run(device, sink, permits, token))
            },
            WorkerRole::OpcUaPoll => {
                let sessions = Arc::clone(&self.sessions);
                tokio::spawn(workers::opcua_poll::run(device, sink, sessions, token))
            },
            WorkerRole::OpcUaSub => {
                let sessions = Arc::clone(&self.sessions);
                tokio::spawn(workers::opcua_sub::run(device, sink, sessions, token))
            },
        }
    }
}
