//! Completion types — wire messages, parse results, and errors.
//!
//! Shared by the HTTP client, the offline canned client, and the
//! conversation session that consumes them through [`Completion`].

use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by completion client operations.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The HTTP request to the completion service failed (network, timeout).
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The completion service returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The response body was not valid JSON.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl CompletionError {
    /// Whether a later attempt with the same payload could plausibly succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// Author of a turn as the completion service sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn of conversation history sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: Role,
    pub content: String,
}

impl ApiMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Request body for `POST /chat/completion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ApiMessage>,
}

/// Result of parsing a successful (2xx) completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionReply {
    /// The body carried a non-empty `content` string.
    Content(String),
    /// The body was JSON but had no usable `content` field.
    MissingContent,
}

// =============================================================================
// COMPLETION TRAIT
// =============================================================================

/// Async seam between the conversation session and the completion service.
/// Enables mocking in tests.
#[async_trait::async_trait]
pub trait Completion: Send + Sync {
    /// Send the full prior turn history and wait for one assistant reply.
    ///
    /// # Errors
    ///
    /// Returns a [`CompletionError`] if the request fails, the service
    /// answers with a non-success status, or the body is not JSON.
    async fn complete(&self, messages: &[ApiMessage]) -> Result<CompletionReply, CompletionError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
