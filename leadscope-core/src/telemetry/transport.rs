//! Snapshot transports
//!
//! Two distinct capabilities carry snapshots to the ingestion endpoint:
//!
//! - [`IngestClient`] - the normal awaited HTTP client used by the
//!   debounced, periodic, and on-hide flush paths
//! - [`FireAndForgetSink`] - the beacon used during page teardown; it can
//!   never await a response and must not delay navigation
//!
//! A failed flush is logged and never retried out-of-band: the next
//! natural flush carries the larger cumulative state, which subsumes the
//! one that was lost.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::types::EngagementSnapshot;

use super::scheduler::FlushRequest;

/// Response from `POST /engagement`
#[derive(Debug, Deserialize)]
pub struct IngestAck {
    /// The stored record after merging, or null when ingestion was skipped
    #[serde(default)]
    pub engagement: Option<serde_json::Value>,
}

/// HTTP client for the engagement ingestion API
pub struct IngestClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl IngestClient {
    /// Create a new ingest client from configuration
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("ingest.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        // Build default headers
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let auth_value = format!("Bearer {}", api_key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Submit one snapshot and await the merged record.
    pub async fn submit(&self, snapshot: &EngagementSnapshot) -> Result<IngestAck> {
        let url = format!("{}/engagement", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let ack: IngestAck = response
                .json()
                .await
                .map_err(|e| Error::Transport(format!("failed to parse response: {}", e)))?;
            Ok(ack)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Transport(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }

    /// The URL the beacon posts to; identical body, identical route.
    pub fn endpoint_url(&self) -> String {
        format!("{}/engagement", self.base_url)
    }
}

/// Drain scheduler flush requests into the ingest client.
///
/// Failures are logged and dropped; monotonic accumulation makes the next
/// flush a superset of this one.
pub fn spawn_forwarder(
    client: Arc<IngestClient>,
    mut rx: UnboundedReceiver<FlushRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let session_id = request.snapshot.session_id.clone();
            match client.submit(&request.snapshot).await {
                Ok(_) => {
                    tracing::debug!(
                        session_id = %session_id,
                        trigger = %request.trigger,
                        time_spent = request.snapshot.time_spent,
                        "Flushed engagement snapshot"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        trigger = %request.trigger,
                        error = %e,
                        "Failed to flush engagement snapshot; next flush will subsume it"
                    );
                }
            }
        }
    })
}

/// A transport that is guaranteed to be attempted but cannot await a
/// response. Implementations must return immediately.
pub trait FireAndForgetSink: Send + Sync {
    fn send(&self, body: Vec<u8>);
}

/// Beacon over HTTP: spawn the request and walk away.
pub struct HttpBeacon {
    http_client: reqwest::Client,
    url: String,
}

impl HttpBeacon {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let base_url = config
            .server_url
            .clone()
            .ok_or_else(|| Error::Config("ingest.server_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: format!("{}/engagement", base_url),
        })
    }
}

impl FireAndForgetSink for HttpBeacon {
    fn send(&self, body: Vec<u8>) {
        let client = self.http_client.clone();
        let url = self.url.clone();
        // Deliberately detached: delivery is best-effort and nothing waits
        // on the outcome.
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await;
            if let Err(e) = result {
                tracing::debug!(error = %e, "Beacon delivery failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_server_url() {
        let config = IngestConfig::default();
        assert!(IngestClient::new(&config).is_err());
        assert!(HttpBeacon::new(&config).is_err());
    }

    #[test]
    fn client_normalizes_trailing_slash() {
        let config = IngestConfig {
            server_url: Some("https://leadscope.example.com/".to_string()),
            ..Default::default()
        };
        let client = IngestClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint_url(),
            "https://leadscope.example.com/engagement"
        );
    }

    #[test]
    fn client_accepts_api_key() {
        let config = IngestConfig {
            server_url: Some("https://leadscope.example.com".to_string()),
            api_key: Some("ls_live_test".to_string()),
            ..Default::default()
        };
        assert!(IngestClient::new(&config).is_ok());
    }
}
