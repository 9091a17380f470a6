//! Session core errors

use sessionsync_events::EmitError;
use sessionsync_identity::ProviderError;
use thiserror::Error;

/// Session core error
#[derive(Error, Debug)]
pub enum AuthError {
    /// An operation that needs a session found none
    #[error("No active session")]
    NoActiveSession,

    /// The provider refused a login token; not retried
    #[error("Login token rejected: {0}")]
    InvalidToken(String),

    /// Network or provider-side failure. Means "unknown", not "signed out".
    #[error("Remote call failed: {0}")]
    RemoteCall(ProviderError),

    #[error("Event emission failed: {0}")]
    Emit(#[from] EmitError),

    #[error("Unexpected remote response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Stable code for logs and for callers on the other side of a
    /// context boundary.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NoActiveSession => "NO_ACTIVE_SESSION",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::RemoteCall(_) => "REMOTE_CALL_FAILED",
            AuthError::Emit(_) => "EMIT_FAILED",
            AuthError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }
}

/// Provider failures outside a token login. A refused id or refresh token
/// leaves the claims unknown, so it stays a `RemoteCall`; only
/// `TokenExchange::login_with_token` reports `InvalidToken`.
impl From<ProviderError> for AuthError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::NoActiveSession | ProviderError::AccountUnavailable(_) => {
                AuthError::NoActiveSession
            }
            other => AuthError::RemoteCall(other),
        }
    }
}
