//! Register catalog types shared by the plan builder and decoder

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 1-byte Modbus unit id on a multi-drop link
pub type SlaveIndex = u8;

/// Word/byte ordering of a Modbus device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    #[serde(alias = "big", alias = "BE", alias = "BigEndian")]
    Big,
    #[serde(alias = "little", alias = "LE", alias = "LittleEndian")]
    Little,
}

/// Register payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterKind {
    #[serde(alias = "u16", alias = "uint16", alias = "UInt16")]
    U16,
    #[serde(alias = "float", alias = "float32", alias = "Float")]
    Float32,
}

impl RegisterKind {
    /// Registers occupied by one value of this kind.
    pub fn register_count(self) -> u16 {
        match self {
            RegisterKind::U16 => 1,
            RegisterKind::Float32 => 2,
        }
    }
}

/// How catalog addresses map onto protocol (0-based) addresses.
///
/// Configured styles are `"0"` (already protocol form) and `"40001"`
/// (holding register convention). `OneBased` is the fallback used when no
/// register of a device reaches 40001.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStyle {
    ZeroBased,
    OneBased,
    Offset40001,
}

impl AddressStyle {
    /// Parse the configured style string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "0" => Some(AddressStyle::ZeroBased),
            "40001" => Some(AddressStyle::Offset40001),
            _ => None,
        }
    }

    /// Map a catalog address to protocol form. Values that do not fall in a
    /// convertible band pass through unchanged.
    pub fn to_protocol_address(self, address: i32) -> i32 {
        match self {
            AddressStyle::ZeroBased => address,
            AddressStyle::OneBased => {
                if address > 0 && address < 40001 {
                    address - 1
                } else {
                    address
                }
            },
            AddressStyle::Offset40001 => {
                if address >= 40001 {
                    address - 40001
                } else if address > 0 {
                    address - 1
                } else {
                    address
                }
            },
        }
    }
}

/// One catalog register, reduced to what the read plan and decoder need.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterDef {
    /// Catalog-form address (may be 0-based, 1-based or 40001-based)
    pub address: i32,
    /// Length in 16-bit words
    pub length: u16,
    pub kind: RegisterKind,
    pub scale: f64,
    pub word_swap: bool,
    /// Upstream signal identity; registers without one are read but never
    /// emitted
    pub signal_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_style_parse() {
        assert_eq!(AddressStyle::parse("0"), Some(AddressStyle::ZeroBased));
        assert_eq!(
            AddressStyle::parse("40001"),
            Some(AddressStyle::Offset40001)
        );
        assert_eq!(AddressStyle::parse("4x"), None);
    }

    #[test]
    fn test_zero_based_passthrough() {
        assert_eq!(AddressStyle::ZeroBased.to_protocol_address(5), 5);
        assert_eq!(AddressStyle::ZeroBased.to_protocol_address(0), 0);
    }

    #[test]
    fn test_one_based_mapping() {
        assert_eq!(AddressStyle::OneBased.to_protocol_address(1), 0);
        assert_eq!(AddressStyle::OneBased.to_protocol_address(100), 99);
        // Out-of-band values pass through unchanged
        assert_eq!(AddressStyle::OneBased.to_protocol_address(0), 0);
        assert_eq!(AddressStyle::OneBased.to_protocol_address(-3), -3);
        assert_eq!(AddressStyle::OneBased.to_protocol_address(40002), 40002);
    }

    #[test]
    fn test_40001_mapping() {
        assert_eq!(AddressStyle::Offset40001.to_protocol_address(40001), 0);
        assert_eq!(AddressStyle::Offset40001.to_protocol_address(40005), 4);
        assert_eq!(AddressStyle::Offset40001.to_protocol_address(12), 11);
    }

    #[test]
    fn test_register_kind_count() {
        assert_eq!(RegisterKind::U16.register_count(), 1);
        assert_eq!(RegisterKind::Float32.register_count(), 2);
    }

    #[test]
    fn test_register_kind_aliases() {
        let kind: RegisterKind = serde_json::from_str("\"u16\"").expect("alias");
        assert_eq!(kind, RegisterKind::U16);
        let kind: RegisterKind = serde_json::from_str("\"float32\"").expect("alias");
        assert_eq!(kind, RegisterKind::Float32);
    }
}
