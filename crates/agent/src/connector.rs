//! Channel Connector seam: the only place a reply leaves the system.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use replyguard_core::config::ConnectorConfig;
use replyguard_core::domain::interaction::Channel;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SendRequest {
    pub channel: Channel,
    pub external_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("connector transport error: {0}")]
    Transport(String),
    #[error("marketplace rejected the reply with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Publishes a reply. Callers make at most one attempt per decision.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn send(&self, request: &SendRequest) -> Result<(), ConnectorError>;
}

/// Marketplace gateway over HTTP: `POST {base_url}/v1/channels/{channel}/replies`.
pub struct HttpChannelConnector {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpChannelConnector {
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ConnectorError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    pub fn endpoint(&self, channel: Channel) -> String {
        format!("{}/v1/channels/{}/replies", self.base_url, channel.as_str())
    }
}

#[async_trait]
impl ChannelConnector for HttpChannelConnector {
    async fn send(&self, request: &SendRequest) -> Result<(), ConnectorError> {
        let mut http = self.client.post(self.endpoint(request.channel)).json(request);
        if let Some(api_key) = &self.api_key {
            http = http.bearer_auth(api_key.expose_secret());
        }

        let response = http.send().await.map_err(|error| {
            if error.is_timeout() {
                ConnectorError::Timeout(self.timeout)
            } else {
                ConnectorError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(ConnectorError::Rejected { status: status.as_u16(), message })
    }
}
