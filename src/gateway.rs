//! Gateway client for uploading day reports to a local ingest gateway.
//!
//! Only the aggregate day export and its score summary are sent. Nothing
//! leaves the machine unless the agent is started with `--gateway`.

use crate::store::{DayExport, ScoreSummary};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    pub host: String,
    /// Gateway port
    pub port: u16,
    /// Bearer authentication token
    pub token: String,
}

impl GatewayConfig {
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
        }
    }

    /// Load configuration from the SyniLife runtime directory, which holds
    /// `runtime/gateway.port` and `runtime/gateway.token`.
    pub fn from_runtime_dir() -> Result<Self, GatewayError> {
        let runtime_dir = Self::default_state_dir()?.join("runtime");
        let port_path = runtime_dir.join("gateway.port");
        let token_path = runtime_dir.join("gateway.token");

        let port_str = std::fs::read_to_string(&port_path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read gateway port from {port_path:?}: {e}"
            ))
        })?;
        let port: u16 = port_str.trim().parse().map_err(|e| {
            GatewayError::Config(format!("Invalid port number '{}': {}", port_str.trim(), e))
        })?;

        let token = std::fs::read_to_string(&token_path)
            .map_err(|e| {
                GatewayError::Config(format!(
                    "Failed to read gateway token from {token_path:?}: {e}"
                ))
            })?
            .trim()
            .to_string();

        Ok(Self::new("127.0.0.1", port, token))
    }

    fn default_state_dir() -> Result<PathBuf, GatewayError> {
        #[cfg(target_os = "macos")]
        {
            if let Some(home) = dirs::home_dir() {
                return Ok(home.join("Library/Application Support/SyniLife"));
            }
        }

        #[cfg(not(target_os = "macos"))]
        {
            if let Some(data_dir) = dirs::data_dir() {
                return Ok(data_dir.join("SyniLife"));
            }
        }

        Err(GatewayError::Config(
            "Could not determine SyniLife state directory".to_string(),
        ))
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Endpoint that accepts day reports.
    pub fn ingest_url(&self) -> String {
        format!("{}/v1/ingest/editor", self.url())
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Gateway client errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway config error: {0}")]
    Config(String),

    #[error("Gateway network error: {0}")]
    Network(String),

    #[error("Gateway server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Gateway serialization error: {0}")]
    Serialization(String),
}

/// Upload body.
#[derive(Debug, Clone, Serialize)]
pub struct DayReportPayload {
    pub device_id: String,
    pub timezone: String,
    pub source: String,
    pub version: String,
    pub day: DayExport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreSummary>,
}

/// Gateway acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayResponse {
    pub timestamp: String,
    #[serde(default)]
    pub accepted: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for GatewayResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.accepted, self.message.as_deref()) {
            (Some(false), Some(msg)) => write!(f, "rejected: {msg}"),
            (Some(false), None) => write!(f, "rejected"),
            (_, Some(msg)) => write!(f, "accepted: {msg}"),
            (_, None) => write!(f, "accepted"),
        }
    }
}

/// Async gateway client.
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
    device_id: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            device_id: device_id(),
        })
    }

    pub async fn test_connection(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Upload one day's export.
    pub async fn upload_day(
        &self,
        day: &DayExport,
        scores: Option<ScoreSummary>,
        timezone: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let payload = DayReportPayload {
            device_id: self.device_id.clone(),
            timezone: timezone.to_string(),
            source: "synheart-editor-agent".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            day: day.clone(),
            scores,
        };

        let response = self
            .client
            .post(self.config.ingest_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Blocking wrapper for the synchronous monitor loop.
pub struct BlockingGatewayClient {
    inner: GatewayClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: GatewayClient::new(config)?,
            runtime,
        })
    }

    pub fn from_runtime() -> Result<Self, GatewayError> {
        Self::new(GatewayConfig::from_runtime_dir()?)
    }

    pub fn test_connection(&self) -> Result<bool, GatewayError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    pub fn upload_day(
        &self,
        day: &DayExport,
        scores: Option<ScoreSummary>,
        timezone: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        self.runtime
            .block_on(self.inner.upload_day(day, scores, timezone))
    }

    pub fn device_id(&self) -> &str {
        self.inner.device_id()
    }
}

/// Device ID from the hostname plus a per-run suffix.
fn device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "editor-{}-{}",
        hostname,
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}
