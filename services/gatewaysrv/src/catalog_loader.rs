//! Catalog and token service clients
//!
//! Bearer-authenticated access to the device-configuration API. Tokens are
//! cached per client id and reused until 30 s before expiry; transient
//! catalog failures are retried a few times before surfacing. A failed
//! refresh leaves the last good partitions in the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CatalogCache;
use crate::catalog::{partition_devices, Device};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Standard `{ success, data, error }` envelope of the device API.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client for the catalog and token services.
pub struct CatalogClient {
    http: Client,
    auth_base_url: String,
    api_base_url: String,
    client_id: String,
    client_secret: String,
    gateway_id: String,
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl CatalogClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: Client::new(),
            auth_base_url: config.auth.base_url.trim_end_matches('/').to_string(),
            api_base_url: config.device_api.base_url.trim_end_matches('/').to_string(),
            client_id: config.gateway.client_id.clone(),
            client_secret: config.gateway.client_secret.clone(),
            gateway_id: config.gateway.gateway_id.clone(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    async fn access_token(&self) -> Result<String> {
        {
            let tokens = self.tokens.lock().await;
            if let Some(cached) = tokens.get(&self.client_id) {
                if cached.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                    return Ok(cached.token.clone());
                }
            }
        }

        let url = format!("{}/api/devices/connect/token", self.auth_base_url);
        debug!("Requesting access token: {}", url);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Catalog(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(GatewayError::Catalog(format!(
                "Token request failed: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Catalog(format!("Token response parse failed: {e}")))?;

        let cached = CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        self.tokens
            .lock()
            .await
            .insert(self.client_id.clone(), cached);

        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        self.tokens.lock().await.remove(&self.client_id);
    }

    async fn fetch_once(&self) -> Result<Vec<Device>> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/api/devices/configurations/gateway/{}",
            self.api_base_url, self.gateway_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| GatewayError::Catalog(format!("Catalog request failed: {e}")))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
            return Err(GatewayError::Catalog(
                "Catalog request unauthorized; token invalidated".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(GatewayError::Catalog(format!(
                "Catalog request failed: {}",
                response.status()
            )));
        }

        let envelope: ApiResponse<Vec<Device>> = response
            .json()
            .await
            .map_err(|e| GatewayError::Catalog(format!("Catalog parse failed: {e}")))?;

        if !envelope.success {
            return Err(GatewayError::Catalog(
                envelope
                    .error
                    .unwrap_or_else(|| "Catalog service reported failure".to_string()),
            ));
        }

        Ok(envelope.data.unwrap_or_default())
    }

    /// Fetch the device catalog, retrying transient failures.
    pub async fn fetch_devices(&self) -> Result<Vec<Device>> {
        let mut last_error = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.fetch_once().await {
                Ok(devices) => return Ok(devices),
                Err(e) => {
                    warn!("Catalog fetch attempt {attempt}/{FETCH_ATTEMPTS} failed: {e}");
                    last_error = Some(e);
                    if attempt < FETCH_ATTEMPTS {
                        tokio::time::sleep(FETCH_RETRY_DELAY).await;
                    }
                },
            }
        }
        Err(last_error
            .unwrap_or_else(|| GatewayError::Catalog("Catalog fetch failed".to_string())))
    }
}

/// Load, partition and seed the cache. Returns the device count.
pub async fn refresh_catalog(
    client: &CatalogClient,
    cache: &CatalogCache,
    ttl: Duration,
) -> Result<usize> {
    let devices = client.fetch_devices().await?;
    let total = devices.len();

    for (partition, devices) in partition_devices(devices) {
        debug!("Partition {}: {} devices", partition.as_str(), devices.len());
        cache.set(partition, devices, ttl).await;
    }

    info!("Catalog refreshed: {} devices", total);
    Ok(total)
}

/// Periodic refresh at the TTL cadence; failures keep the last good catalog.
pub fn spawn_refresh_task(
    client: Arc<CatalogClient>,
    cache: Arc<CatalogCache>,
    ttl: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    // Refresh ahead of expiry so readers never observe an empty partition
    // just because the loader was slow.
    let period = ttl.mul_f32(0.75).max(Duration::from_secs(60));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(period) => {},
            }

            if let Err(e) = refresh_catalog(&client, &cache, ttl).await {
                warn!("Catalog refresh failed (keeping last good catalog): {e}");
            }
        }
        debug!("Catalog refresh task stopped");
    })
}
