use thiserror::Error;

/// Gateway service error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog/token service error
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Message broker error
    #[error("Broker error: {0}")]
    Broker(String),

    /// Shared library error
    #[error(transparent)]
    Common(#[from] common::Error),

    /// Protocol layer error
    #[error(transparent)]
    Protocol(#[from] fieldgate_protocols::ProtocolError),
}

/// Gateway result type
pub type Result<T> = std::result::Result<T, GatewayError>;
