//! FieldGate gateway service library.
//!
//! The acquisition and forwarding core: catalog handling, the device
//! supervisor with its per-protocol workers, the telemetry sink and the
//! broker forwarder. `main.rs` only wires these together.

pub mod amqp;
pub mod cache;
pub mod catalog;
pub mod catalog_loader;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod sink;
pub mod supervisor;
pub mod workers;

pub use error::{GatewayError, Result};
