//! gatewaysrv: industrial edge telemetry gateway
//!
//! Bootstrap: logging, configuration, one catalog load, then the supervisor,
//! forwarder and catalog refresh run concurrently until a shutdown signal
//! cancels the root token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::influx::InfluxClient;
use fieldgate_protocols::opcua::{OpcUaSessionConfig, OpcUaSessionManager};

use gatewaysrv::amqp::AmqpPublisher;
use gatewaysrv::cache::CatalogCache;
use gatewaysrv::catalog_loader::{self, refresh_catalog, CatalogClient};
use gatewaysrv::config::GatewayConfig;
use gatewaysrv::forwarder::TelemetryForwarder;
use gatewaysrv::sink::TelemetrySink;
use gatewaysrv::supervisor::DeviceSupervisor;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(name = "gatewaysrv", version, about = "FieldGate industrial edge telemetry gateway")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    common::logging::init("gatewaysrv").context("logging init failed")?;

    let config_path = cli.config.or_else(|| {
        let default = PathBuf::from("config/gateway.json");
        default.exists().then_some(default)
    });
    let config =
        GatewayConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    common::logging::print_banner(&[
        format!("gatewaysrv {}", env!("CARGO_PKG_VERSION")),
        format!("  gateway id : {}", config.gateway.gateway_id),
        format!("  influx     : {} ({})", config.influxdb.url, config.influxdb.bucket),
        format!(
            "  broker     : {}:{} queue={}",
            config.rabbitmq.host, config.rabbitmq.port, config.rabbitmq.queue_name
        ),
    ]);

    let root_token = CancellationToken::new();
    common::shutdown::spawn_signal_listener(root_token.clone());

    let influx = InfluxClient::new(config.influxdb.to_influx_config());
    if let Err(e) = influx.ping().await {
        warn!("InfluxDB not reachable yet: {}", e);
    }

    let sink = Arc::new(TelemetrySink::new(influx.clone()));
    let broker = Arc::new(AmqpPublisher::new(config.rabbitmq.clone()));
    let sessions = Arc::new(OpcUaSessionManager::new(OpcUaSessionConfig {
        pki_dir: PathBuf::from(&config.opcua.pki_dir),
        auto_accept_server_certs: config.opcua.auto_accept_server_certs,
        ..OpcUaSessionConfig::default()
    }));

    let cache = Arc::new(CatalogCache::new());
    let catalog_client = Arc::new(CatalogClient::new(&config));
    let catalog_ttl = Duration::from_secs(config.cache.configurations_minutes.max(1) * 60);

    // The gateway may start with an empty catalog and pick devices up on the
    // next refresh.
    match refresh_catalog(&catalog_client, &cache, catalog_ttl).await {
        Ok(count) => info!("Catalog loaded: {} devices", count),
        Err(e) => warn!("Initial catalog load failed (starting empty): {}", e),
    }

    let refresh_handle = catalog_loader::spawn_refresh_task(
        Arc::clone(&catalog_client),
        Arc::clone(&cache),
        catalog_ttl,
        root_token.clone(),
    );

    let supervisor = DeviceSupervisor::new(
        cache,
        sink,
        sessions,
        config.modbus.max_concurrent_polls,
    );
    let mut supervisor_handle = tokio::spawn(supervisor.run(root_token.clone()));

    let forwarder = TelemetryForwarder::new(influx, broker, config.forwarder.clone());
    let forwarder_handle = tokio::spawn(forwarder.run(root_token.clone()));

    // The supervisor only returns on cancellation; any other exit (including
    // its impossible-state panic) is fatal and brings the process down so an
    // external supervisor can restart it.
    let mut supervisor_failed = false;
    tokio::select! {
        _ = root_token.cancelled() => {},
        result = &mut supervisor_handle => {
            supervisor_failed = true;
            match result {
                Ok(()) => tracing::error!("Supervisor exited unexpectedly"),
                Err(e) => tracing::error!("Supervisor terminated: {e}"),
            }
            root_token.cancel();
        },
    }
    info!("Shutting down; draining workers");

    let drain = async {
        // Already joined in the select arm when it failed; a JoinHandle must
        // not be polled again after completion.
        if !supervisor_failed {
            let _ = supervisor_handle.await;
        }
        let _ = forwarder_handle.await;
        let _ = refresh_handle.await;
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("Workers did not drain within {:?}; exiting anyway", DRAIN_TIMEOUT);
    }

    if supervisor_failed {
        anyhow::bail!("supervisor terminated unexpectedly");
    }

    info!("Gateway stopped");
    Ok(())
}
