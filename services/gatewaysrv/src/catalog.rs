//! Device catalog model
//!
//! Mirrors the device-configuration payload served by the upstream device
//! API (camelCase JSON) and partitions it by protocol/mode for the
//! supervisor. Protocol-level register types live in `fieldgate-protocols`;
//! this module converts into them.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use fieldgate_protocols::modbus::{
    build_read_plan, AddressStyle, Endianness, RegisterDef, RegisterKind, SlaveIndex,
    SlaveReadPlan,
};

/// Wire protocol of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DeviceProtocol {
    #[serde(alias = "modbus", alias = "MODBUS")]
    Modbus,
    #[serde(alias = "opcua", alias = "OPCUA", alias = "OpcUA")]
    OpcUa,
}

/// OPC UA acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OpcUaMode {
    #[serde(alias = "polling", alias = "POLLING")]
    Polling,
    #[serde(alias = "pubsub", alias = "PubSub", alias = "PUBSUB")]
    PubSub,
}

/// One catalog device with its owned slaves/registers/nodes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub protocol: DeviceProtocol,
    /// Poll cadence; 0 is legal only for OPC UA subscription devices
    #[serde(default)]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub mode: Option<OpcUaMode>,
    #[serde(default)]
    pub endianness: Endianness,
    /// Explicit address style ("0" or "40001"); the detection heuristic is
    /// the fallback
    #[serde(default)]
    pub address_style: Option<String>,
    #[serde(default)]
    pub slaves: Vec<DeviceSlave>,
    #[serde(default)]
    pub nodes: Vec<OpcUaNode>,
}

/// One Modbus unit on a multi-drop link.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSlave {
    pub slave_index: SlaveIndex,
    #[serde(default)]
    pub registers: Vec<Register>,
}

/// Catalog register as served by the device API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Register {
    pub id: Uuid,
    pub address: i32,
    #[serde(default = "default_length")]
    pub length: u16,
    pub data_type: RegisterKind,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub word_swap: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub signal_id: Option<Uuid>,
}

impl Register {
    /// Reduce to the protocol-layer definition used by plan and decode.
    pub fn def(&self) -> RegisterDef {
        RegisterDef {
            address: self.address,
            length: self.length.max(1),
            kind: self.data_type,
            scale: self.scale,
            word_swap: self.word_swap,
            signal_id: self.signal_id,
        }
    }
}

/// Catalog OPC UA node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcUaNode {
    pub id: Uuid,
    pub node_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub signal_id: Option<Uuid>,
}

fn default_length() -> u16 {
    1
}

fn default_scale() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl Device {
    pub fn explicit_address_style(&self) -> Option<AddressStyle> {
        self.address_style
            .as_deref()
            .and_then(AddressStyle::parse)
    }

    /// Poll interval, clamped to at least 1 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Publishing/sampling interval for subscriptions: the poll interval, or
    /// 1000 ms when unset.
    pub fn publishing_interval(&self) -> Duration {
        if self.poll_interval_ms == 0 {
            Duration::from_millis(1000)
        } else {
            Duration::from_millis(self.poll_interval_ms)
        }
    }

    /// Build the Modbus read plan over the enabled registers of every slave.
    pub fn modbus_read_plan(&self) -> Vec<SlaveReadPlan> {
        let slaves: Vec<(SlaveIndex, Vec<RegisterDef>)> = self
            .slaves
            .iter()
            .map(|slave| {
                (
                    slave.slave_index,
                    slave
                        .registers
                        .iter()
                        .filter(|register| register.enabled)
                        .map(Register::def)
                        .collect(),
                )
            })
            .collect();

        build_read_plan(self.explicit_address_style(), &slaves)
    }

    /// Enabled OPC UA nodes.
    pub fn enabled_nodes(&self) -> impl Iterator<Item = &OpcUaNode> {
        self.nodes.iter().filter(|node| node.enabled)
    }
}

/// Cache partition names; one worker role reads exactly one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    ModbusDevices,
    OpcUaPollingDevices,
    OpcUaSubDevices,
}

impl Partition {
    pub const ALL: [Partition; 3] = [
        Partition::ModbusDevices,
        Partition::OpcUaPollingDevices,
        Partition::OpcUaSubDevices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::ModbusDevices => "ModbusDevices",
            Partition::OpcUaPollingDevices => "OpcUaPollingDevices",
            Partition::OpcUaSubDevices => "OpcUaSubDevices",
        }
    }
}

/// Split a catalog snapshot into the three worker partitions. Every
/// partition is present in the result, empty or not, so a refresh replaces
/// stale entries wholesale.
pub fn partition_devices(devices: Vec<Device>) -> HashMap<Partition, Vec<Device>> {
    let mut partitions: HashMap<Partition, Vec<Device>> = Partition::ALL
        .iter()
        .map(|partition| (*partition, Vec::new()))
        .collect();

    for device in devices {
        let partition = match device.protocol {
            DeviceProtocol::Modbus => Partition::ModbusDevices,
            DeviceProtocol::OpcUa => match device.mode {
                Some(OpcUaMode::PubSub) => Partition::OpcUaSubDevices,
                _ => Partition::OpcUaPollingDevices,
            },
        };
        if let Some(bucket) = partitions.get_mut(&partition) {
            bucket.push(device);
        }
    }

    partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_json(protocol: &str, mode: Option<&str>) -> String {
        let mode_field = mode
            .map(|m| format!(r#""mode": "{m}","#))
            .unwrap_or_default();
        format!(
            r#"{{
                "id": "0d0b3d1c-1111-2222-3333-444455556666",
                "name": "press-4",
                "protocol": "{protocol}",
                {mode_field}
                "pollIntervalMs": 1000,
                "host": "10.0.0.4",
                "port": 502,
                "slaves": [{{
                    "slaveIndex": 1,
                    "registers": [{{
                        "id": "aaaaaaaa-0000-0000-0000-000000000001",
                        "address": 40001,
                        "length": 1,
                        "dataType": "u16",
                        "scale": 0.1,
                        "unit": "bar",
                        "signalId": "bbbbbbbb-0000-0000-0000-000000000001"
                    }}]
                }}]
            }}"#
        )
    }

    #[test]
    fn test_parse_modbus_device() {
        let device: Device = serde_json::from_str(&device_json("Modbus", None)).expect("parse");

        assert_eq!(device.protocol, DeviceProtocol::Modbus);
        assert_eq!(device.poll_interval_ms, 1000);
        assert_eq!(device.slaves.len(), 1);
        let register = &device.slaves[0].registers[0];
        assert_eq!(register.address, 40001);
        assert_eq!(register.data_type, RegisterKind::U16);
        assert!(register.enabled, "enabled defaults to true");
        assert!(register.signal_id.is_some());
    }

    #[test]
    fn test_read_plan_skips_disabled_registers() {
        let mut device: Device =
            serde_json::from_str(&device_json("Modbus", None)).expect("parse");
        device.slaves[0].registers[0].enabled = false;

        assert!(device.modbus_read_plan().is_empty());
    }

    #[test]
    fn test_partitioning() {
        let modbus: Device = serde_json::from_str(&device_json("Modbus", None)).expect("parse");
        let polling: Device =
            serde_json::from_str(&device_json("OpcUa", Some("Polling"))).expect("parse");
        let pubsub: Device =
            serde_json::from_str(&device_json("OpcUa", Some("PubSub"))).expect("parse");
        // OPC UA without an explicit mode defaults into the polling partition
        let modeless: Device = serde_json::from_str(&device_json("OpcUa", None)).expect("parse");

        let partitions = partition_devices(vec![modbus, polling, pubsub, modeless]);

        assert_eq!(partitions[&Partition::ModbusDevices].len(), 1);
        assert_eq!(partitions[&Partition::OpcUaPollingDevices].len(), 2);
        assert_eq!(partitions[&Partition::OpcUaSubDevices].len(), 1);
    }

    #[test]
    fn test_publishing_interval_defaults() {
        let mut device: Device =
            serde_json::from_str(&device_json("OpcUa", Some("PubSub"))).expect("parse");
        device.poll_interval_ms = 0;
        assert_eq!(device.publishing_interval(), Duration::from_millis(1000));

        device.poll_interval_ms = 250;
        assert_eq!(device.publishing_interval(), Duration::from_millis(250));
    }
}
