//! Completion service configuration parsed from environment variables.

use super::types::CompletionError;

pub const DEFAULT_API_BASE_URL: &str = "https://mjagent-490766333568.us-central1.run.app";
pub const COMPLETION_PATH: &str = "/chat/completion";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for CompletionTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    /// Service root without a trailing slash.
    pub base_url: String,
    /// Bearer token. `None` lets the caller substitute the signed-in user's token.
    pub api_token: Option<String>,
    pub timeouts: CompletionTimeouts,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_API_BASE_URL.to_string(), api_token: None, timeouts: CompletionTimeouts::default() }
    }
}

impl CompletionConfig {
    /// Build typed completion config from environment variables.
    ///
    /// Optional:
    /// - `EVO_API_BASE_URL`: production service when absent
    /// - `EVO_API_TOKEN`: bearer token
    /// - `EVO_REQUEST_TIMEOUT_SECS`: default 60
    /// - `EVO_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is set but is not a positive integer.
    pub fn from_env() -> Result<Self, CompletionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CompletionConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is set but is not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CompletionError> {
        let base_url = lookup("EVO_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_token = lookup("EVO_API_TOKEN").filter(|v| !v.trim().is_empty());
        let timeouts = CompletionTimeouts {
            request_secs: parse_secs(&lookup, "EVO_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_secs(&lookup, "EVO_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self { base_url: normalize_base_url(&base_url), api_token, timeouts })
    }

    /// Full URL of the completion endpoint.
    #[must_use]
    pub fn completion_url(&self) -> String {
        format!("{}{COMPLETION_PATH}", self.base_url)
    }
}

#[must_use]
pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64, CompletionError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(CompletionError::ConfigParse(format!("{key} must be a positive integer, got '{raw}'"))),
        Ok(secs) => Ok(secs),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
