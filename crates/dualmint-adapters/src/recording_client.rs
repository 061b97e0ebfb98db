use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use dualmint_core::{PortError, RecordSubmission, RecordingPort, RecordingReceipt};

use crate::AdapterConfig;

/// HTTP client of the recording service's `/api/transactions` endpoint.
#[derive(Clone)]
pub struct RecordingClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RecordingClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PortError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Transport(format!("recording client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token,
            client,
        })
    }

    pub fn with_config(config: &AdapterConfig) -> Result<Self, PortError> {
        Self::new(
            config.recording_endpoint_url.clone(),
            config.recording_api_token.clone(),
            Duration::from_millis(config.recording_timeout_ms),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/api/transactions", self.base_url)
    }
}

fn error_text(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}

#[async_trait]
impl RecordingPort for RecordingClient {
    async fn submit(&self, submission: &RecordSubmission) -> Result<RecordingReceipt, PortError> {
        let mut request = self.client.post(self.endpoint()).json(submission);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("recording request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PortError::Transport(format!("recording response unreadable: {e}")))?;

        match status {
            StatusCode::OK | StatusCode::CREATED => serde_json::from_str(&body)
                .map_err(|e| PortError::Transport(format!("recording response decode failed: {e}"))),
            StatusCode::BAD_REQUEST => Err(PortError::Validation(error_text(&body))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortError::Unauthorized),
            // Proxy in front of the service; the request may not have reached it.
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(PortError::Transport(format!(
                    "recording endpoint returned {status}: {}",
                    error_text(&body)
                )))
            }
            s if s.is_server_error() => Err(PortError::Persistence(error_text(&body))),
            s => Err(PortError::Transport(format!(
                "recording endpoint returned {s}: {}",
                error_text(&body)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_prefers_error_field() {
        assert_eq!(error_text(r#"{"error":"Amount must be positive"}"#), "Amount must be positive");
        assert_eq!(error_text(" gateway timeout "), "gateway timeout");
    }

    #[test]
    fn endpoint_drops_trailing_slash() {
        let client = RecordingClient::new("http://127.0.0.1:8787/", None, Duration::from_secs(1))
            .expect("client");
        assert_eq!(client.endpoint(), "http://127.0.0.1:8787/api/transactions");
    }
}
