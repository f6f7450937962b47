// Telemetry gateway transport: JSON over HTTP with the caller's bearer identity.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::error::SourceError;
use crate::identity::Identity;

/// The single seam every adapter talks through.
#[async_trait::async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn post(
        &self,
        path: &str,
        identity: Option<&Identity>,
        body: Value,
    ) -> Result<Value, SourceError>;
}

/// POST and decode into `T`.
pub async fn post_json<T: DeserializeOwned>(
    transport: &dyn TelemetryTransport,
    path: &str,
    identity: Option<&Identity>,
    body: Value,
) -> Result<T, SourceError> {
    let value = transport.post(path, identity, body).await?;
    Ok(serde_json::from_value(value)?)
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(crate::version::user_agent())
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl TelemetryTransport for HttpTransport {
    async fn post(
        &self,
        path: &str,
        identity: Option<&Identity>,
        body: Value,
    ) -> Result<Value, SourceError> {
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        let mut request = self.client.post(&url).json(&body);
        if let Some(identity) = identity {
            request = request.bearer_auth(identity.token());
        }
        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::Auth(format!("{path} returned status {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Http(format!("{path} returned status {status}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}
