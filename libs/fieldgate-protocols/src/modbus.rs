//! Modbus TCP acquisition engine.
//!
//! Split the way the wire works: `frame` builds and validates MBAP frames,
//! `client` runs one request/response exchange on a connected stream, `plan`
//! turns a register catalog into a minimal set of bounded reads, and
//! `decode` turns a read window back into scalar values.

pub mod client;
pub mod constants;
pub mod decode;
pub mod frame;
pub mod plan;
pub mod types;

pub use client::{connect, read_holding_registers};
pub use decode::decode_register;
pub use plan::{build_read_plan, detect_address_style, PlannedItem, ReadRange, SlaveReadPlan};
pub use types::{AddressStyle, Endianness, RegisterDef, RegisterKind, SlaveIndex};
