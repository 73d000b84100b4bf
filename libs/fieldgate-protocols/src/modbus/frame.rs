//! MBAP framing for Modbus TCP function 3
//!
//! The transaction id counter is process-global and atomic. It exists to
//! detect mis-framed responses, not to multiplex: each stream carries one
//! outstanding request at a time.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::{ProtocolError, Result};

use super::constants::{
    EXCEPTION_BIT, FC_READ_HOLDING_REGISTERS, MAX_MBAP_LENGTH, PROTOCOL_ID,
};

static TRANSACTION_ID: AtomicU16 = AtomicU16::new(1);

/// Next transaction id; wraps naturally from 0xFFFF to 0x0000.
pub fn next_transaction_id() -> u16 {
    TRANSACTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Modbus TCP MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    pub length: u16,
    pub unit_id: u8,
}

/// Parse the fixed 7-byte MBAP header.
pub fn parse_mbap_header(buf: &[u8; 7]) -> MbapHeader {
    MbapHeader {
        transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
        protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
        length: u16::from_be_bytes([buf[4], buf[5]]),
        unit_id: buf[6],
    }
}

/// Build the 12-byte Read Holding Registers request frame.
pub fn build_read_request(
    transaction_id: u16,
    unit_id: u8,
    start_address: u16,
    quantity: u16,
) -> [u8; 12] {
    let mut frame = [0u8; 12];
    frame[0..2].copy_from_slice(&transaction_id.to_be_bytes());
    frame[2..4].copy_from_slice(&PROTOCOL_ID.to_be_bytes());
    frame[4..6].copy_from_slice(&6u16.to_be_bytes()); // unit id + 5-byte PDU
    frame[6] = unit_id;
    frame[7] = FC_READ_HOLDING_REGISTERS;
    frame[8..10].copy_from_slice(&start_address.to_be_bytes());
    frame[10..12].copy_from_slice(&quantity.to_be_bytes());
    frame
}

/// Validate the MBAP length field before the PDU is read off the wire.
pub fn validate_frame_length(length: u16) -> Result<()> {
    // length counts the unit id plus the PDU; a PDU below 2 bytes cannot
    // carry a function code and payload.
    if length < 3 || length > MAX_MBAP_LENGTH {
        return Err(ProtocolError::Protocol(format!(
            "Invalid TCP frame length: {length}"
        )));
    }
    Ok(())
}

/// Validate a Read Holding Registers response and extract the register words.
pub fn parse_read_response(
    expected_transaction_id: u16,
    header: &MbapHeader,
    pdu: &[u8],
    quantity: u16,
) -> Result<Vec<u16>> {
    if header.protocol_id != PROTOCOL_ID {
        return Err(ProtocolError::Protocol(format!(
            "Invalid protocol ID: expected 0, got {}",
            header.protocol_id
        )));
    }
    if header.transaction_id != expected_transaction_id {
        return Err(ProtocolError::Protocol(format!(
            "Transaction ID mismatch: expected {:#06x}, got {:#06x}",
            expected_transaction_id, header.transaction_id
        )));
    }
    if pdu.len() < 2 {
        return Err(ProtocolError::Protocol(format!(
            "PDU too short: {} bytes",
            pdu.len()
        )));
    }

    let function_code = pdu[0];
    if function_code & EXCEPTION_BIT != 0 {
        let code = pdu[1];
        return Err(ProtocolError::ModbusException {
            code,
            description: exception_description(code),
        });
    }
    if function_code != FC_READ_HOLDING_REGISTERS {
        return Err(ProtocolError::Protocol(format!(
            "Unexpected function code: {function_code:#04x}"
        )));
    }

    let byte_count = pdu[1] as usize;
    if byte_count != 2 * quantity as usize || pdu.len() != 2 + byte_count {
        return Err(ProtocolError::Protocol(format!(
            "Byte count mismatch: expected {}, got {} ({} PDU bytes)",
            2 * quantity,
            byte_count,
            pdu.len()
        )));
    }

    let words = pdu[2..]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    Ok(words)
}

/// Standard Modbus exception descriptions.
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_header(transaction_id: u16, length: u16, unit_id: u8) -> MbapHeader {
        MbapHeader {
            transaction_id,
            protocol_id: 0,
            length,
            unit_id,
        }
    }

    #[test]
    fn test_build_read_request_layout() {
        let frame = build_read_request(0x1234, 1, 0x006B, 3);

        assert_eq!(frame.len(), 12);
        assert_eq!(&frame[0..2], &[0x12, 0x34]); // transaction id
        assert_eq!(&frame[2..4], &[0x00, 0x00]); // protocol id
        assert_eq!(&frame[4..6], &[0x00, 0x06]); // length
        assert_eq!(frame[6], 1); // unit id
        assert_eq!(frame[7], 0x03); // function code
        assert_eq!(&frame[8..10], &[0x00, 0x6B]); // start address
        assert_eq!(&frame[10..12], &[0x00, 0x03]); // quantity
    }

    #[test]
    fn test_transaction_id_increments() {
        let id1 = next_transaction_id();
        let id2 = next_transaction_id();
        assert_eq!(id2, id1.wrapping_add(1));
    }

    #[test]
    fn test_parse_mbap_header() {
        let header = parse_mbap_header(&[0xAB, 0xCD, 0x00, 0x00, 0x00, 0x07, 0x11]);
        assert_eq!(header.transaction_id, 0xABCD);
        assert_eq!(header.protocol_id, 0);
        assert_eq!(header.length, 7);
        assert_eq!(header.unit_id, 0x11);
    }

    #[test]
    fn test_parse_response_ok() {
        // FC03, byte count 4, words 0x00C8 0x0001
        let pdu = [0x03, 0x04, 0x00, 0xC8, 0x00, 0x01];
        let header = response_header(7, 7, 1);

        let words = parse_read_response(7, &header, &pdu, 2).expect("valid response");
        assert_eq!(words, vec![0x00C8, 0x0001]);
    }

    #[test]
    fn test_transaction_id_mismatch() {
        let pdu = [0x03, 0x02, 0x00, 0xC8];
        let header = response_header(8, 5, 1);

        let err = parse_read_response(7, &header, &pdu, 1).unwrap_err();
        assert!(matches!(err, ProtocolError::Protocol(_)));
        assert!(err.to_string().contains("Transaction ID mismatch"));
    }

    #[test]
    fn test_nonzero_protocol_id() {
        let pdu = [0x03, 0x02, 0x00, 0xC8];
        let mut header = response_header(7, 5, 1);
        header.protocol_id = 1;

        let err = parse_read_response(7, &header, &pdu, 1).unwrap_err();
        assert!(err.to_string().contains("protocol ID"));
    }

    #[test]
    fn test_short_pdu() {
        let header = response_header(7, 2, 1);
        let err = parse_read_response(7, &header, &[0x03], 1).unwrap_err();
        assert!(err.to_string().contains("PDU too short"));
    }

    #[test]
    fn test_exception_surfaced_verbatim() {
        let pdu = [0x83, 0x02];
        let header = response_header(7, 3, 1);

        let err = parse_read_response(7, &header, &pdu, 1).unwrap_err();
        match err {
            ProtocolError::ModbusException { code, description } => {
                assert_eq!(code, 0x02);
                assert_eq!(description, "Illegal Data Address");
            },
            other => panic!("expected Modbus exception, got {other:?}"),
        }
    }

    #[test]
    fn test_byte_count_mismatch() {
        // Declares 4 bytes but the request asked for 1 register (2 bytes)
        let pdu = [0x03, 0x04, 0x00, 0xC8, 0x00, 0x01];
        let header = response_header(7, 7, 1);

        let err = parse_read_response(7, &header, &pdu, 1).unwrap_err();
        assert!(err.to_string().contains("Byte count mismatch"));
    }

    #[test]
    fn test_unexpected_function_code() {
        let pdu = [0x04, 0x02, 0x00, 0xC8];
        let header = response_header(7, 5, 1);

        let err = parse_read_response(7, &header, &pdu, 1).unwrap_err();
        assert!(err.to_string().contains("Unexpected function code"));
    }

    #[test]
    fn test_frame_length_bounds() {
        assert!(validate_frame_length(2).is_err());
        assert!(validate_frame_length(3).is_ok());
        assert!(validate_frame_length(254).is_ok());
        assert!(validate_frame_length(255).is_err());
    }

    #[test]
    fn test_words_decoded_big_endian() {
        let pdu = [0x03, 0x02, 0x41, 0xC8];
        let header = response_header(9, 5, 1);

        let words = parse_read_response(9, &header, &pdu, 1).expect("valid");
        assert_eq!(words, vec![0x41C8]);
    }
}
