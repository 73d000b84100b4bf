//! Modbus protocol constants

/// MBAP header length: transaction id (2) + protocol id (2) + length (2) + unit id (1)
pub const MBAP_HEADER_LEN: usize = 7;

/// Protocol identifier for Modbus TCP (always zero)
pub const PROTOCOL_ID: u16 = 0;

/// Read Holding Registers function code
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Maximum registers in one FC03 request
pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// Maximum value of the MBAP length field: unit id (1) + PDU (253)
pub const MAX_MBAP_LENGTH: u16 = 254;

/// High bit of the function code marks an exception response
pub const EXCEPTION_BIT: u8 = 0x80;
