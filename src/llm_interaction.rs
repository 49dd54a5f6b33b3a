use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use crate::chat::Message;
use crate::config::RelayConfig;
use crate::constants;
use crate::error::RelayError;

// Body of the OpenAI-compatible /chat/completions endpoint.
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Result of the credential probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Valid,
    Rejected { status: u16, body: String },
}

/// Client for the hosted completion API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    referer: String,
    title: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
            request_timeout: config.request_timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    /// Bound on each read of a streaming body.
    pub fn read_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn post(&self, body: &CompletionRequest<'_>) -> reqwest::RequestBuilder {
        self.http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
    }

    /// Open a streaming completion. Returns once the upstream has answered
    /// with 200; any other status is classified into a [`RelayError`].
    #[instrument(skip(self, messages), fields(messages = messages.len(), model = %self.model))]
    pub async fn open_stream(&self, messages: &[Message]) -> Result<Response, RelayError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            stream: true,
            max_tokens: None,
        };

        let response = tokio::time::timeout(self.request_timeout, self.post(&body).send())
            .await
            .map_err(|_| RelayError::Timeout)?
            .map_err(|e| {
                warn!(error = %e, "Upstream request failed");
                RelayError::from_transport(&e)
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let error_body = tokio::time::timeout(self.request_timeout, response.text())
                .await
                .map_err(|_| {
                    warn!(%status, "Upstream error body stalled");
                    RelayError::Timeout
                })?
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Upstream completion request failed");
            return Err(RelayError::from_status(status.as_u16(), error_body));
        }

        debug!("Upstream stream opened");
        Ok(response)
    }

    /// Send a tiny non-streaming completion to check the credential.
    #[instrument(skip(self), fields(model = %self.model))]
    pub async fn probe(&self) -> Result<ProbeOutcome> {
        let messages = [Message::user(constants::PROBE_PROMPT)];
        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            max_tokens: Some(constants::PROBE_MAX_TOKENS),
        };

        let response = self
            .post(&body)
            .timeout(self.probe_timeout)
            .send()
            .await
            .context(format!("Failed to send probe to {}", self.api_url))?;

        let status = response.status();
        if status == StatusCode::OK {
            debug!("Probe accepted");
            return Ok(ProbeOutcome::Valid);
        }

        let body = response.text().await.context("Failed to read probe response")?;
        warn!(%status, "Probe rejected");
        Ok(ProbeOutcome::Rejected { status: status.as_u16(), body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_request_body() {
        let messages = [Message::system("sys"), Message::user("hi")];
        let body = CompletionRequest {
            model: "m",
            messages: &messages,
            stream: true,
            max_tokens: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "model": "m",
                "stream": true,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn test_probe_request_body_omits_stream() {
        let messages = [Message::user(constants::PROBE_PROMPT)];
        let body = CompletionRequest {
            model: "m",
            messages: &messages,
            stream: false,
            max_tokens: Some(10),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("stream").is_none());
        assert_eq!(value["max_tokens"], 10);
    }
}
