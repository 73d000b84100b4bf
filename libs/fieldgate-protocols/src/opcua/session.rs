//! OPC UA session management
//!
//! One process-wide manager owns the client application identity: the
//! application name/URI, a self-signed certificate auto-created under the
//! PKI directory on first use, and the server-certificate trust policy.
//! Sessions are opened per device; the returned event-loop handle completes
//! when the session disconnects.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opcua::client::{ClientBuilder, IdentityToken, Session};
use opcua::crypto::SecurityPolicy;
use opcua::types::{MessageSecurityMode, StatusCode, UserTokenPolicy};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{ProtocolError, Result};

/// Client-side session settings.
#[derive(Debug, Clone)]
pub struct OpcUaSessionConfig {
    pub application_name: String,
    pub application_uri: String,
    /// Certificate store; a self-signed keypair is created here if absent.
    pub pki_dir: PathBuf,
    /// Accept server certificates that are not in the trust store.
    pub auto_accept_server_certs: bool,
    pub session_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Default for OpcUaSessionConfig {
    fn default() -> Self {
        Self {
            application_name: "FieldGate OPC UA Client".to_string(),
            application_uri: "urn:fieldgate:gateway".to_string(),
            pki_dir: PathBuf::from("pki"),
            auto_accept_server_certs: true,
            session_timeout: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(15),
        }
    }
}

/// An open session plus the event loop driving it.
///
/// The event-loop handle resolves when the connection ends; workers select
/// on it to detect disconnection.
pub struct SessionHandle {
    pub session: Arc<Session>,
    pub event_loop: JoinHandle<StatusCode>,
}

/// Process-wide OPC UA session manager.
pub struct OpcUaSessionManager {
    config: OpcUaSessionConfig,
}

impl OpcUaSessionManager {
    pub fn new(config: OpcUaSessionConfig) -> Self {
        Self { config }
    }

    /// Timeout to apply around individual session operations.
    pub fn operation_timeout(&self) -> Duration {
        self.config.operation_timeout
    }

    /// Open a session to `endpoint_url` (anonymous identity, no message
    /// security).
    pub async fn connect(&self, endpoint_url: &str) -> Result<SessionHandle> {
        debug!("Opening OPC UA session: {}", endpoint_url);

        let mut client = ClientBuilder::new()
            .application_name(self.config.application_name.as_str())
            .application_uri(self.config.application_uri.as_str())
            .pki_dir(self.config.pki_dir.to_string_lossy().as_ref())
            .create_sample_keypair(true)
            .trust_server_certs(self.config.auto_accept_server_certs)
            .session_retry_limit(0)
            .session_timeout(self.config.session_timeout.as_millis() as u32)
            .client()
            .map_err(|e| ProtocolError::Config(e.join(", ")))?;

        let (session, event_loop) = client
            .connect_to_matching_endpoint(
                (
                    endpoint_url,
                    SecurityPolicy::None.to_uri(),
                    MessageSecurityMode::None,
                    UserTokenPolicy::anonymous(),
                ),
                IdentityToken::Anonymous,
            )
            .await
            .map_err(|e| ProtocolError::Session(format!("{endpoint_url}: {e}")))?;

        let handle = event_loop.spawn();
        session.wait_for_connection().await;

        info!("OPC UA session established: {}", endpoint_url);
        Ok(SessionHandle {
            session,
            event_loop: handle,
        })
    }
}
