//! Modbus TCP exchange tests against an in-process responder.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use fieldgate_protocols::modbus::{connect, read_holding_registers};
use fieldgate_protocols::ProtocolError;

/// Spawn a one-shot server that reads the 12-byte request and answers with
/// whatever `respond` builds from it.
async fn one_shot_server<F>(respond: F) -> (String, u16)
where
    F: FnOnce([u8; 12]) -> Vec<u8> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = [0u8; 12];
        socket.read_exact(&mut request).await.expect("read request");
        let response = respond(request);
        if !response.is_empty() {
            socket.write_all(&response).await.expect("write response");
        }
        // Keep the socket open briefly so the client sees the full reply
        // rather than a reset.
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    ("127.0.0.1".to_string(), addr.port())
}

fn echo_response(request: [u8; 12], words: &[u16]) -> Vec<u8> {
    let unit_id = request[6];
    let byte_count = (words.len() * 2) as u8;
    let mut response = Vec::with_capacity(9 + words.len() * 2);
    response.extend_from_slice(&request[0..2]); // transaction id
    response.extend_from_slice(&[0x00, 0x00]); // protocol id
    response.extend_from_slice(&((3 + byte_count as u16).to_be_bytes())); // length
    response.push(unit_id);
    response.push(0x03);
    response.push(byte_count);
    for word in words {
        response.extend_from_slice(&word.to_be_bytes());
    }
    response
}

async fn connect_to(host: &str, port: u16) -> TcpStream {
    connect(host, port, Duration::from_secs(3))
        .await
        .expect("connect")
}

#[tokio::test]
async fn reads_registers_end_to_end() {
    let (host, port) = one_shot_server(|request| echo_response(request, &[0x00C8])).await;

    let mut stream = connect_to(&host, port).await;
    let words = read_holding_registers(&mut stream, 1, 0, 1)
        .await
        .expect("read");
    assert_eq!(words, vec![0x00C8]);
}

#[tokio::test]
async fn surfaces_modbus_exception() {
    let (host, port) = one_shot_server(|request| {
        let mut response = Vec::new();
        response.extend_from_slice(&request[0..2]);
        response.extend_from_slice(&[0x00, 0x00]);
        response.extend_from_slice(&3u16.to_be_bytes());
        response.push(request[6]);
        response.push(0x83); // FC03 + exception bit
        response.push(0x02); // Illegal Data Address
        response
    })
    .await;

    let mut stream = connect_to(&host, port).await;
    let err = read_holding_registers(&mut stream, 1, 0, 1)
        .await
        .unwrap_err();
    match err {
        ProtocolError::ModbusException { code, .. } => assert_eq!(code, 0x02),
        other => panic!("expected exception, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_transaction_id_mismatch() {
    let (host, port) = one_shot_server(|mut request| {
        // Corrupt the echoed transaction id
        request[0] = request[0].wrapping_add(1);
        echo_response(request, &[0x0001])
    })
    .await;

    let mut stream = connect_to(&host, port).await;
    let err = read_holding_registers(&mut stream, 1, 0, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Protocol(_)));
}

#[tokio::test]
async fn eof_mid_frame_is_io_error() {
    let (host, port) = one_shot_server(|request| {
        // Header promises a PDU that never arrives
        let mut response = Vec::new();
        response.extend_from_slice(&request[0..2]);
        response.extend_from_slice(&[0x00, 0x00]);
        response.extend_from_slice(&5u16.to_be_bytes());
        response.push(request[6]);
        response.push(0x03); // then close
        response
    })
    .await;

    let mut stream = connect_to(&host, port).await;
    let err = read_holding_registers(&mut stream, 1, 0, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Io(_)));
}

#[tokio::test]
async fn rejects_byte_count_mismatch() {
    let (host, port) = one_shot_server(|request| echo_response(request, &[0x0001, 0x0002])).await;

    let mut stream = connect_to(&host, port).await;
    // Asked for one register, server answers with two
    let err = read_holding_registers(&mut stream, 1, 0, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Protocol(_)));
}

#[tokio::test]
async fn connect_timeout_is_reported() {
    // RFC 5737 TEST-NET address: connection attempts hang until timeout.
    let result = connect("192.0.2.1", 502, Duration::from_millis(200)).await;
    match result {
        Err(ProtocolError::Timeout(_)) | Err(ProtocolError::Connection(_)) => {},
        other => panic!("expected timeout or connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_invalid_quantity() {
    let (host, port) = one_shot_server(|request| echo_response(request, &[0])).await;
    let mut stream = connect_to(&host, port).await;

    let err = read_holding_registers(&mut stream, 1, 0, 126)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Config(_)));

    let err = read_holding_registers(&mut stream, 1, 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Config(_)));
}
