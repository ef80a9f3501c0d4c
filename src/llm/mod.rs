//! Completion — client for the remote coaching completion service.
//!
//! DESIGN
//! ======
//! The conversation session only sees the [`Completion`] trait. The
//! `CompletionClient` enum dispatches to the HTTP service or to the offline
//! canned-reply source, chosen at startup.

pub mod canned;
pub mod config;
pub mod http;
pub mod types;

use std::time::Duration;

use config::CompletionConfig;
pub use types::{ApiMessage, Completion, CompletionError, CompletionReply, Role};

/// Bearer token sent when neither config nor a signed-in user supplies one.
pub const FALLBACK_API_TOKEN: &str = "invalid-token";

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete completion client that dispatches to the HTTP service or the
/// offline canned replies.
pub enum CompletionClient {
    Http(http::HttpCompletionClient),
    Canned(canned::CannedReplies),
}

impl CompletionClient {
    /// Build an HTTP client from typed config.
    ///
    /// The bearer token is taken from config, then from `user_token`, then
    /// [`FALLBACK_API_TOKEN`]. The service decides whether it is valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &CompletionConfig, user_token: Option<&str>) -> Result<Self, CompletionError> {
        let token = resolve_token(config.api_token.as_deref(), user_token);
        Ok(Self::Http(http::HttpCompletionClient::new(config, token)?))
    }

    #[must_use]
    pub fn offline(delay: Duration) -> Self {
        Self::Canned(canned::CannedReplies::new(delay))
    }

    /// Short label for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Http(c) => c.url().to_string(),
            Self::Canned(_) => "offline canned replies".to_string(),
        }
    }
}

fn resolve_token(configured: Option<&str>, user_token: Option<&str>) -> String {
    configured
        .or(user_token)
        .filter(|t| !t.is_empty())
        .unwrap_or(FALLBACK_API_TOKEN)
        .to_string()
}

#[async_trait::async_trait]
impl Completion for CompletionClient {
    async fn complete(&self, messages: &[ApiMessage]) -> Result<CompletionReply, CompletionError> {
        match self {
            Self::Http(c) => c.complete(messages).await,
            Self::Canned(c) => c.complete(messages).await,
        }
    }
}
