//! OPC UA client support.
//!
//! `session` owns the client identity and certificate and opens per-device
//! sessions; `value` maps node-id strings and server variants onto the
//! gateway's numeric model.

pub mod session;
pub mod value;

pub use session::{OpcUaSessionConfig, OpcUaSessionManager, SessionHandle};
pub use value::{parse_node_id, variant_to_f64};
