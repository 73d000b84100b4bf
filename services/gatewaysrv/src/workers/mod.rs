//! Per-device acquisition workers.
//!
//! One long-lived task per `(device, role)`, spawned and reaped by the
//! supervisor. Every worker observes the shared cancellation token at each
//! suspension point and exits promptly on shutdown.

pub mod modbus;
pub mod opcua_poll;
pub mod opcua_sub;
