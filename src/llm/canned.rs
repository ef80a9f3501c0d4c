//! Offline completion source that answers with canned wellness replies.
//!
//! Used when no completion service is reachable (`--offline`). History is
//! ignored; each call sleeps for the configured delay and then picks one of
//! [`CANNED_REPLIES`] at random.

use std::time::Duration;

use rand::Rng;

use super::types::{ApiMessage, Completion, CompletionError, CompletionReply};

pub const CANNED_REPLIES: &[&str] = &[
    "I understand how you feel. Let's work on that together.",
    "That's a great question! Here's what I think...",
    "I'm here to support you on your wellness journey.",
    "Let me help you break that down into manageable steps.",
    "That's an interesting perspective. Have you considered...",
];

pub const DEFAULT_CANNED_DELAY: Duration = Duration::from_millis(1000);

pub struct CannedReplies {
    delay: Duration,
}

impl CannedReplies {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for CannedReplies {
    fn default() -> Self {
        Self::new(DEFAULT_CANNED_DELAY)
    }
}

#[must_use]
pub fn random_reply() -> &'static str {
    let idx = rand::rng().random_range(0..CANNED_REPLIES.len());
    CANNED_REPLIES[idx]
}

#[async_trait::async_trait]
impl Completion for CannedReplies {
    async fn complete(&self, _messages: &[ApiMessage]) -> Result<CompletionReply, CompletionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(CompletionReply::Content(random_reply().to_string()))
    }
}

#[cfg(test)]
#[path = "canned_test.rs"]
mod tests;
