//! HTTP client for the remote completion service.
//!
//! Thin reqwest wrapper for `POST /chat/completion`. Pure parsing in
//! `parse_response` for testability.

use std::time::Duration;

use super::config::CompletionConfig;
use super::types::{ApiMessage, Completion, CompletionError, CompletionReply, CompletionRequest};

// =============================================================================
// CLIENT
// =============================================================================

pub struct HttpCompletionClient {
    http: reqwest::Client,
    url: String,
    api_token: String,
}

impl HttpCompletionClient {
    /// Build a client for the configured service, authenticating with `api_token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CompletionConfig, api_token: String) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| CompletionError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, url: config.completion_url(), api_token })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Completion for HttpCompletionClient {
    async fn complete(&self, messages: &[ApiMessage]) -> Result<CompletionReply, CompletionError> {
        let body = CompletionRequest { messages: messages.to_vec() };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::ApiRequest(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CompletionError::ApiRequest(e.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::ApiResponse { status: status.as_u16(), body: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a 2xx response body. Invalid JSON is a hard error; a JSON body
/// without a non-empty `content` string is [`CompletionReply::MissingContent`].
pub(crate) fn parse_response(json: &str) -> Result<CompletionReply, CompletionError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| CompletionError::ApiParse(e.to_string()))?;

    match value.get("content").and_then(serde_json::Value::as_str) {
        Some(content) if !content.is_empty() => Ok(CompletionReply::Content(content.to_string())),
        _ => Ok(CompletionReply::MissingContent),
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
