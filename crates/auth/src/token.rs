//! Login token exchange between execution contexts

use std::sync::Arc;

use sessionsync_identity::{IdentityProvider, ProviderError, LOGIN_TOKEN_FUNCTION};

use crate::error::AuthError;

/// Mints login tokens for the current session and redeems them elsewhere.
#[derive(Clone)]
pub struct TokenExchange {
    provider: Arc<dyn IdentityProvider>,
}

impl TokenExchange {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Ask the remote authority for a single-use, short-lived login token
    /// bound to the current session.
    pub async fn generate_login_token(&self) -> Result<String, AuthError> {
        let uid = self
            .provider
            .current_session()
            .map(|u| u.uid)
            .ok_or(AuthError::NoActiveSession)?;

        let response = self
            .provider
            .invoke_remote_function(LOGIN_TOKEN_FUNCTION, serde_json::Value::Null)
            .await?;

        match response.data.as_str() {
            Some(token) if !token.is_empty() => {
                tracing::info!(uid = %uid, "Generated login token");
                Ok(token.to_string())
            }
            _ => Err(AuthError::InvalidResponse(format!(
                "{} returned no token",
                LOGIN_TOKEN_FUNCTION
            ))),
        }
    }

    /// Establish a session from a login token. The provider's own change
    /// notification announces the new session; nothing is emitted here.
    pub async fn login_with_token(&self, token: &str) -> Result<(), AuthError> {
        match self.provider.sign_in_with_token(token).await {
            Ok(user) => {
                tracing::info!(uid = %user.uid, "Logged in with token");
                Ok(())
            }
            Err(ProviderError::InvalidToken(reason) | ProviderError::AccountUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "Login token rejected");
                Err(AuthError::InvalidToken(reason))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login with token failed");
                Err(e.into())
            }
        }
    }
}
