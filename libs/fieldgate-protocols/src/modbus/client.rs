//! One-shot Read Holding Registers over an established TCP stream
//!
//! One outstanding request per stream. Replies are consumed with strict
//! read-exactly semantics: EOF mid-frame is an I/O failure, and any framing
//! mismatch poisons the stream for the caller.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ProtocolError, Result};

use super::constants::{MAX_REGISTERS_PER_READ, MBAP_HEADER_LEN};
use super::frame;

/// Open a TCP connection with a connect timeout.
pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let addr = format!("{host}:{port}");
    debug!("TCP connecting: {}", addr);

    match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("TCP_NODELAY: {}", e);
            }
            debug!("TCP connected: {}", addr);
            Ok(stream)
        },
        Ok(Err(e)) => Err(ProtocolError::Connection(format!(
            "Failed to connect to {addr}: {e}"
        ))),
        Err(_) => Err(ProtocolError::Timeout(format!(
            "Connection to {addr} timed out"
        ))),
    }
}

/// Read `quantity` holding registers (function 3) starting at the 0-based
/// protocol address `start_address`.
pub async fn read_holding_registers(
    stream: &mut TcpStream,
    unit_id: u8,
    start_address: u16,
    quantity: u16,
) -> Result<Vec<u16>> {
    if quantity == 0 || quantity > MAX_REGISTERS_PER_READ {
        return Err(ProtocolError::Config(format!(
            "Invalid register quantity: {quantity}"
        )));
    }

    let transaction_id = frame::next_transaction_id();
    let request = frame::build_read_request(transaction_id, unit_id, start_address, quantity);

    stream
        .write_all(&request)
        .await
        .map_err(|e| ProtocolError::Io(format!("Request write failed: {e}")))?;

    let mut header_buf = [0u8; MBAP_HEADER_LEN];
    stream
        .read_exact(&mut header_buf)
        .await
        .map_err(|e| ProtocolError::Io(format!("Header read failed: {e}")))?;

    let header = frame::parse_mbap_header(&header_buf);
    frame::validate_frame_length(header.length)?;

    // length counts the unit id already consumed with the header
    let mut pdu = vec![0u8; header.length as usize - 1];
    stream
        .read_exact(&mut pdu)
        .await
        .map_err(|e| ProtocolError::Io(format!("PDU read failed: {e}")))?;

    debug!(
        "Modbus RX: trans_id={:#06x}, unit_id={}, {}B",
        header.transaction_id,
        header.unit_id,
        MBAP_HEADER_LEN + pdu.len()
    );

    frame::parse_read_response(transaction_id, &header, &pdu, quantity)
}
