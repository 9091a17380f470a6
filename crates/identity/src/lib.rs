//! SessionSync Identity Provider Boundary
//!
//! Abstracts the remote identity service that owns session truth:
//! - REST identity provider client for production
//! - Programmable mock provider for testing and development
//! - Session change stream with replay of the current state on subscribe

pub mod changes;
pub mod mock;
pub mod rest;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sessionsync_common::Claims;
use thiserror::Error;

pub use changes::{SessionBroadcaster, SessionChanges, SessionState};

/// Remote function that invalidates and regenerates the caller's claims.
pub const REFRESH_CLAIMS_FUNCTION: &str = "refreshUserClaims";

/// Remote function that mints a single-use login token for the caller.
pub const LOGIN_TOKEN_FUNCTION: &str = "getCustomLoginToken";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Identity provider configuration error: {0}")]
    Configuration(String),

    #[error("Identity provider request error: {0}")]
    Request(String),

    #[error("Identity provider response error: {0}")]
    Response(String),

    #[error("Identity provider rejected token: {0}")]
    InvalidToken(String),

    /// The session's account was deleted or disabled on the provider side.
    #[error("Identity provider account unavailable: {0}")]
    AccountUnavailable(String),

    #[error("No active session")]
    NoActiveSession,
}

/// Identity record as the provider reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUser {
    #[serde(alias = "localId")]
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

impl ProviderUser {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = Some(verified);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Decoded id token for the current session.
#[derive(Debug, Clone, PartialEq)]
pub struct IdTokenResult {
    pub token: String,
    pub claims: Claims,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
}

/// Envelope returned by a remote function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub data: serde_json::Value,
}

/// Identity provider configuration.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Identity provider (rest, mock)
    pub provider: String,
    /// Public API key sent with every identity request
    pub api_key: String,
    /// Base URL of the account API (custom token sign-in, lookup)
    pub auth_url: String,
    /// Base URL of the secure token API (id token refresh)
    pub token_url: String,
    /// Base URL under which remote functions are reachable by name
    pub functions_url: String,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("functions_url", &self.functions_url)
            .finish()
    }
}

impl IdentityConfig {
    /// Create identity config from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        dotenvy::dotenv().ok();

        let provider = std::env::var("IDENTITY_PROVIDER").unwrap_or_else(|_| "mock".to_string());

        let api_key = std::env::var("IDENTITY_API_KEY").unwrap_or_default();

        let auth_url = std::env::var("IDENTITY_AUTH_URL")
            .unwrap_or_else(|_| rest::DEFAULT_AUTH_URL.to_string());
        let token_url = std::env::var("IDENTITY_TOKEN_URL")
            .unwrap_or_else(|_| rest::DEFAULT_TOKEN_URL.to_string());
        let functions_url = std::env::var("IDENTITY_FUNCTIONS_URL")
            .unwrap_or_else(|_| "http://localhost:5001".to_string());

        if provider == "rest" && api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "IDENTITY_API_KEY is required for rest provider".to_string(),
            ));
        }

        Ok(Self {
            provider,
            api_key,
            auth_url,
            token_url,
            functions_url,
        })
    }
}

/// Capabilities the session core needs from an identity provider.
///
/// Implementations own the session; callers only observe it, ask for
/// tokens, and sign in or out through it.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity record of the active session, if any.
    fn current_session(&self) -> Option<ProviderUser>;

    /// Subscribe to session transitions. The current state is delivered
    /// first, then every subsequent transition.
    fn subscribe_to_changes(&self) -> SessionChanges;

    /// Id token of the active session. `force_refresh` bypasses any cached
    /// token. Returns `Ok(None)` when no session is active.
    async fn id_token_result(
        &self,
        force_refresh: bool,
    ) -> Result<Option<IdTokenResult>, ProviderError>;

    /// Re-read the active session's identity record from the provider.
    async fn reload_session(&self) -> Result<(), ProviderError>;

    /// Establish a session from a custom login token.
    async fn sign_in_with_token(&self, token: &str) -> Result<ProviderUser, ProviderError>;

    /// End the active session. Signing out with no session is a no-op.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Invoke a named remote function on behalf of the active session.
    async fn invoke_remote_function(
        &self,
        name: &str,
        data: serde_json::Value,
    ) -> Result<FunctionResponse, ProviderError>;
}

/// Factory for creating IdentityProvider implementations.
pub struct IdentityProviderFactory;

impl IdentityProviderFactory {
    /// Create an IdentityProvider based on configuration.
    pub fn create(config: IdentityConfig) -> Result<Box<dyn IdentityProvider>, ProviderError> {
        match config.provider.as_str() {
            "rest" => {
                tracing::info!("Creating REST identity provider");
                if config.api_key.is_empty() {
                    return Err(ProviderError::Configuration(
                        "IDENTITY_API_KEY is required for rest provider".to_string(),
                    ));
                }
                Ok(Box::new(rest::RestIdentityProvider::new(config)))
            }
            "mock" => {
                tracing::info!("Creating mock identity provider");
                Ok(Box::new(mock::MockIdentityProvider::new()))
            }
            provider => Err(ProviderError::Configuration(format!(
                "Unknown identity provider: {}. Supported providers: rest, mock",
                provider
            ))),
        }
    }
}
