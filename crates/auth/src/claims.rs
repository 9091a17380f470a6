//! Claims resolution for the active session

use std::sync::Arc;

use sessionsync_common::{AuthenticatedUser, AuthenticatedUserWithClaims, Claims};
use sessionsync_identity::IdentityProvider;

use crate::error::AuthError;

/// Fetches authorization claims for whichever session is active when
/// called. Holds no cache of its own; caching is the provider's business.
#[derive(Clone)]
pub struct ClaimsResolver {
    provider: Arc<dyn IdentityProvider>,
}

impl ClaimsResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Claims of the current session, `None` when signed out.
    ///
    /// `force_refresh` bypasses the provider's cached token and may cost a
    /// round trip. Errors mean the claims are unknown, not that the session
    /// is gone.
    pub async fn get_claims(&self, force_refresh: bool) -> Result<Option<Claims>, AuthError> {
        tracing::debug!(force_refresh, "Resolving claims");
        let token = self.provider.id_token_result(force_refresh).await?;
        Ok(token.map(|t| t.claims))
    }

    /// Merge the current session's claims into `user`.
    pub async fn with_claims(
        &self,
        user: Option<AuthenticatedUser>,
        force_refresh: bool,
    ) -> Result<Option<AuthenticatedUserWithClaims>, AuthError> {
        let Some(user) = user else {
            return Ok(None);
        };
        let claims = self.get_claims(force_refresh).await?;
        Ok(Some(user.with_claims(claims)))
    }
}
