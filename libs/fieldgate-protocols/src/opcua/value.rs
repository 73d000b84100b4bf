//! NodeId parsing and variant coercion

use std::str::FromStr;

use opcua::types::{NodeId, Variant};

use crate::error::{ProtocolError, Result};

/// Parse a node string per the OPC UA NodeId grammar
/// (`ns=2;s=Channel1.Device1.Tag1`, `i=2045`, ...). A bare string is taken
/// as a string identifier in namespace 0.
pub fn parse_node_id(raw: &str) -> Result<NodeId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::Config("Empty node id".to_string()));
    }

    if let Ok(node_id) = NodeId::from_str(trimmed) {
        return Ok(node_id);
    }

    if trimmed.contains(';') || trimmed.starts_with("ns=") {
        return Err(ProtocolError::Config(format!("Invalid node id: {raw}")));
    }

    Ok(NodeId::new(0, trimmed.to_string()))
}

/// Coerce an OPC UA variant to f64. Non-numeric kinds return `None`; the
/// caller warns and skips the point.
pub fn variant_to_f64(variant: &Variant) -> Option<f64> {
    match variant {
        Variant::Double(v) => Some(*v),
        Variant::Float(v) => Some(*v as f64),
        Variant::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        Variant::SByte(v) => Some(*v as f64),
        Variant::Byte(v) => Some(*v as f64),
        Variant::Int16(v) => Some(*v as f64),
        Variant::UInt16(v) => Some(*v as f64),
        Variant::Int32(v) => Some(*v as f64),
        Variant::UInt32(v) => Some(*v as f64),
        Variant::Int64(v) => Some(*v as f64),
        Variant::UInt64(v) => Some(*v as f64),
        _ => None,
    }
}
