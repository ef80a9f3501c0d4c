//! Identity service — email/password and Google sign-in over the Firebase
//! Identity Toolkit REST API.
//!
//! ARCHITECTURE
//! ============
//! The conversation core never talks to this module. The only coupling is
//! routing: the front-end shows auth screens while `current_user()` is
//! `None` and the chat once it is set. Subscribers get every change through
//! a `tokio::sync::watch` channel.
//!
//! ERROR HANDLING
//! ==============
//! Every operation returns `IdentityError`. Front-ends render
//! `IdentityError::user_message` inline; nothing here is fatal.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{info, warn};

pub const DEFAULT_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const GOOGLE_PROVIDER_ID: &str = "google.com";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const IDP_REQUEST_URI: &str = "http://localhost";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Rejected locally before any request was made.
    #[error("{0}")]
    InvalidInput(String),

    /// The required API key environment variable is not set.
    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// The request never got a response.
    #[error("network request failed: {0}")]
    Network(String),

    /// The identity provider answered with an error code.
    #[error("identity provider error {code}: {message}")]
    Provider { code: String, message: String },

    /// The provider's response could not be deserialized.
    #[error("identity response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// Operation an error came from; selects the message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    Login,
    Signup,
    FederatedLogin,
    ResetPassword,
    Logout,
}

impl AuthOperation {
    fn failure_prefix(self) -> &'static str {
        match self {
            Self::Login => "Failed to log in",
            Self::Signup => "Failed to create an account",
            Self::FederatedLogin => "Failed to log in with Google",
            Self::ResetPassword => "Failed to send reset email",
            Self::Logout => "Failed to log out",
        }
    }
}

impl IdentityError {
    /// Human-readable message for the auth screen.
    #[must_use]
    pub fn user_message(&self, op: AuthOperation) -> String {
        let prefix = op.failure_prefix();
        match self {
            Self::InvalidInput(message) => message.clone(),
            Self::Network(_) => "Network error. Please check your connection and try again.".to_string(),
            Self::Provider { code, message } => {
                if op == AuthOperation::FederatedLogin {
                    if let Some(text) = federated_message(code, message) {
                        return text.to_string();
                    }
                }
                match friendly_code(code) {
                    Some(text) => format!("{prefix}: {text}"),
                    None if message.is_empty() => format!("{prefix}: {code}"),
                    None => format!("{prefix}: {message}"),
                }
            }
            Self::MissingApiKey { .. } | Self::Parse(_) | Self::HttpClientBuild(_) => format!("{prefix}: {self}"),
        }
    }
}

fn federated_message(code: &str, message: &str) -> Option<&'static str> {
    match code {
        "auth/popup-blocked" => Some("Popup was blocked. Please allow popups for this site and try again."),
        "auth/popup-closed-by-user" => Some("Login was cancelled. Please try again."),
        "auth/network-request-failed" => Some("Network error. Please check your connection and try again."),
        _ if message.contains("sessionStorage") || message.contains("initial state") => {
            Some("Browser privacy settings may be blocking login. Please try refreshing the page.")
        }
        _ => None,
    }
}

fn friendly_code(code: &str) -> Option<&'static str> {
    match code {
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => Some("Incorrect email or password."),
        "EMAIL_NOT_FOUND" => Some("No account found with this email."),
        "EMAIL_EXISTS" => Some("An account with this email already exists."),
        "INVALID_EMAIL" => Some("Invalid email address."),
        "WEAK_PASSWORD" => Some("Password should be at least 6 characters."),
        "USER_DISABLED" => Some("This account has been disabled."),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => Some("Too many attempts. Please try again later."),
        "INVALID_IDP_RESPONSE" => Some("Google sign-in could not be verified."),
        "auth/unauthorized-domain" | "UNAUTHORIZED_DOMAIN" => Some("This domain is not authorized for sign-in."),
        _ => None,
    }
}

// =============================================================================
// USER
// =============================================================================

/// Signed-in account handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
}

impl User {
    /// Best name to show for this user.
    #[must_use]
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Token handed over by a federated provider's own sign-in flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedCredential {
    pub provider_id: String,
    pub id_token: String,
}

impl FederatedCredential {
    #[must_use]
    pub fn google(id_token: impl Into<String>) -> Self {
        Self { provider_id: GOOGLE_PROVIDER_ID.to_string(), id_token: id_token.into() }
    }
}

/// How a browser front-end should run the federated sign-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FederatedFlow {
    Popup,
    Redirect,
}

/// Safari and iOS block the popup flow, so they redirect instead.
#[must_use]
pub fn federated_flow_for(user_agent: &str) -> FederatedFlow {
    let safari = user_agent.contains("Safari") && !user_agent.contains("Chrome") && !user_agent.contains("Chromium");
    let ios = ["iPad", "iPhone", "iPod"].iter().any(|d| user_agent.contains(d));
    if safari || ios { FederatedFlow::Redirect } else { FederatedFlow::Popup }
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<User>;

    /// Receive every change of the current user.
    fn subscribe(&self) -> watch::Receiver<Option<User>>;

    async fn login(&self, email: &str, password: &str) -> Result<User, IdentityError>;

    async fn signup(&self, email: &str, password: &str) -> Result<User, IdentityError>;

    async fn logout(&self) -> Result<(), IdentityError>;

    async fn login_with_federated_provider(&self, credential: &FederatedCredential) -> Result<User, IdentityError>;

    async fn reset_password(&self, email: &str) -> Result<(), IdentityError>;
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub api_key: String,
    pub base_url: String,
}

impl IdentityConfig {
    /// Load from `FIREBASE_API_KEY` and optional `FIREBASE_AUTH_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns an error if `FIREBASE_API_KEY` is missing or blank.
    pub fn from_env() -> Result<Self, IdentityError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`IdentityConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `FIREBASE_API_KEY` is missing or blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IdentityError> {
        let api_key = lookup("FIREBASE_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| IdentityError::MissingApiKey { var: "FIREBASE_API_KEY".into() })?;
        let base_url = lookup("FIREBASE_AUTH_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTH_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self { api_key, base_url })
    }
}

// =============================================================================
// FIREBASE CLIENT
// =============================================================================

pub struct FirebaseIdentity {
    http: reqwest::Client,
    config: IdentityConfig,
    current: watch::Sender<Option<User>>,
}

impl FirebaseIdentity {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: IdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| IdentityError::HttpClientBuild(e.to_string()))?;
        let (current, _) = watch::channel(None);
        Ok(Self { http, config, current })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{method}?key={}", self.config.base_url, self.config.api_key)
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<String, IdentityError> {
        let response = self
            .http
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_error_body(status.as_u16(), &text));
        }
        Ok(text)
    }

    async fn sign_in(&self, method: &str, body: serde_json::Value) -> Result<User, IdentityError> {
        let text = self.post(method, body).await?;
        let user = parse_user(&text)?;
        info!(uid = %user.uid, method, "signed in");
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }
}

fn require_credentials(email: &str, password: &str) -> Result<(), IdentityError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(IdentityError::InvalidInput("Please fill in all fields".into()));
    }
    Ok(())
}

#[async_trait::async_trait]
impl IdentityProvider for FirebaseIdentity {
    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }

    async fn login(&self, email: &str, password: &str) -> Result<User, IdentityError> {
        require_credentials(email, password)?;
        self.sign_in(
            "signInWithPassword",
            serde_json::json!({ "email": email.trim(), "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn signup(&self, email: &str, password: &str) -> Result<User, IdentityError> {
        require_credentials(email, password)?;
        self.sign_in(
            "signUp",
            serde_json::json!({ "email": email.trim(), "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        if let Some(user) = self.current.send_replace(None) {
            info!(uid = %user.uid, "signed out");
        }
        Ok(())
    }

    async fn login_with_federated_provider(&self, credential: &FederatedCredential) -> Result<User, IdentityError> {
        if credential.id_token.trim().is_empty() {
            return Err(IdentityError::InvalidInput("Missing Google ID token".into()));
        }
        let post_body = format!("id_token={}&providerId={}", credential.id_token.trim(), credential.provider_id);
        self.sign_in(
            "signInWithIdp",
            serde_json::json!({
                "postBody": post_body,
                "requestUri": IDP_REQUEST_URI,
                "returnIdpCredential": true,
                "returnSecureToken": true,
            }),
        )
        .await
    }

    async fn reset_password(&self, email: &str) -> Result<(), IdentityError> {
        if email.trim().is_empty() {
            return Err(IdentityError::InvalidInput("Please enter your email address".into()));
        }
        self.post("sendOobCode", serde_json::json!({ "requestType": "PASSWORD_RESET", "email": email.trim() }))
            .await?;
        info!("password reset email requested");
        Ok(())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_user(json: &str) -> Result<User, IdentityError> {
    let api: AuthResponse = serde_json::from_str(json).map_err(|e| IdentityError::Parse(e.to_string()))?;
    Ok(User {
        uid: api.local_id,
        email: api.email,
        display_name: api.display_name,
        id_token: api.id_token,
        refresh_token: api.refresh_token,
    })
}

/// Error messages look like `"WEAK_PASSWORD : Password should be ..."`; the
/// part before ` : ` is the code.
fn parse_error_body(status: u16, text: &str) -> IdentityError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(text) else {
        warn!(status, "identity provider returned an unrecognized error body");
        return IdentityError::Provider { code: format!("HTTP_{status}"), message: text.trim().to_string() };
    };
    let raw = envelope.error.message;
    match raw.split_once(" : ") {
        Some((code, detail)) => IdentityError::Provider { code: code.trim().to_string(), message: detail.trim().to_string() },
        None => IdentityError::Provider { code: raw.trim().to_string(), message: String::new() },
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
