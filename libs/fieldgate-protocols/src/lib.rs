//! Industrial protocol layer for FieldGate.
//!
//! Pure protocol plumbing, no business logic: Modbus TCP framing, read
//! planning and register decoding, plus OPC UA session management and value
//! coercion. Acquisition policy (poll cadence, retry, emission) lives in the
//! gateway service.

pub mod error;
pub mod modbus;
pub mod opcua;

pub use error::{ProtocolError, Result};
