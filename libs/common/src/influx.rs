//! InfluxDB 2.x HTTP client
//!
//! Thin `reqwest` wrapper over the v2 API: line protocol writes at
//! millisecond precision, Flux queries returning plain CSV, range deletes
//! and a health check.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};

/// Connection settings for one bucket.
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// InfluxDB 2.x client
#[derive(Debug, Clone)]
pub struct InfluxClient {
    config: InfluxConfig,
    client: Client,
}

impl InfluxClient {
    /// Create a new client
    pub fn new(config: InfluxConfig) -> Self {
        debug!(
            "Creating InfluxDB client: url={}, org={}, bucket={}",
            config.url, config.org, config.bucket
        );
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Health check against `/health`
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/health", self.config.url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| Error::Influx(format!("Failed to connect to InfluxDB: {e}")))?;

        if response.status().is_success() {
            debug!("InfluxDB health check passed");
            Ok(())
        } else {
            Err(Error::Influx(format!(
                "InfluxDB health check failed: {}",
                response.status()
            )))
        }
    }

    /// Write line protocol with millisecond timestamp precision
    pub async fn write_lines(&self, lines: &str) -> Result<()> {
        let url = format!("{}/api/v2/write", self.config.url);

        debug!(
            "Writing to InfluxDB: org={}, bucket={}, body_len={}",
            self.config.org,
            self.config.bucket,
            lines.len()
        );

        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ms"),
            ])
            .bearer_auth(&self.config.token)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.to_string())
            .send()
            .await
            .map_err(|e| Error::Influx(format!("Write failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Influx(format!("Write failed: {status} - {body}")))
        }
    }

    /// Execute a Flux query, returning plain CSV (header row per table, no
    /// annotations).
    pub async fn query_csv(&self, flux: &str) -> Result<String> {
        let url = format!("{}/api/v2/query", self.config.url);

        let body = json!({
            "query": flux,
            "type": "flux",
            "dialect": { "header": true, "annotations": [] },
        });

        let response = self
            .client
            .post(&url)
            .query(&[("org", self.config.org.as_str())])
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Influx(format!("Query failed: {e}")))?;

        if response.status().is_success() {
            response
                .text()
                .await
                .map_err(|e| Error::Influx(format!("Query response read failed: {e}")))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Influx(format!("Query failed: {status} - {body}")))
        }
    }

    /// Delete points in `[start, stop]` matching `predicate`
    pub async fn delete_range(
        &self,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        predicate: &str,
    ) -> Result<()> {
        let url = format!("{}/api/v2/delete", self.config.url);

        let body = json!({
            "start": start.to_rfc3339_opts(SecondsFormat::Millis, true),
            "stop": stop.to_rfc3339_opts(SecondsFormat::Millis, true),
            "predicate": predicate,
        });

        let response = self
            .client
            .post(&url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
            ])
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Influx(format!("Delete failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(Error::Influx(format!("Delete failed: {status} - {body}")))
        }
    }
}
