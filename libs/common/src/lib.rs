//! Shared runtime plumbing for FieldGate services.
//!
//! Error types, logging setup, configuration loading, shutdown signalling,
//! the InfluxDB 2.x client and the telemetry point shape used across the
//! workspace.

pub mod config;
pub mod error;
pub mod influx;
pub mod line_protocol;
pub mod logging;
pub mod shutdown;
pub mod types;

pub use error::{Error, Result};
pub use types::TelemetryPoint;
