use thiserror::Error;

/// Protocol layer error type
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Connection establishment failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Read/write failure on an established stream, including EOF mid-frame
    #[error("I/O error: {0}")]
    Io(String),

    /// Framing that violates the protocol; the stream must be discarded
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Modbus exception response, surfaced verbatim
    #[error("Modbus exception {code:#04x}: {description}")]
    ModbusException { code: u8, description: &'static str },

    /// Operation timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid request parameters or client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// OPC UA session failure
    #[error("Session error: {0}")]
    Session(String),
}

/// Protocol result type
pub type Result<T> = std::result::Result<T, ProtocolError>;
