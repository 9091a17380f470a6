//! Public session surface
//!
//! `AuthSession` is what the rest of the application talks to. It holds
//! no session state of its own: every answer is derived from the provider
//! at the moment it is asked for.

use std::sync::Arc;

use sessionsync_common::{AuthenticatedUserWithClaims, Claims, EventOrdering};
use sessionsync_events::{AuthEvent, AuthEventSink};
use sessionsync_identity::{IdentityProvider, REFRESH_CLAIMS_FUNCTION};

use crate::claims::ClaimsResolver;
use crate::error::AuthError;
use crate::observer::SessionObserver;
use crate::projector::project_user;
use crate::token::TokenExchange;

pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    resolver: ClaimsResolver,
    observer: SessionObserver,
    tokens: TokenExchange,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_event_ordering(provider, EventOrdering::default())
    }

    pub fn with_event_ordering(provider: Arc<dyn IdentityProvider>, ordering: EventOrdering) -> Self {
        Self {
            resolver: ClaimsResolver::new(provider.clone()),
            observer: SessionObserver::new(provider.clone(), ordering),
            tokens: TokenExchange::new(provider.clone()),
            provider,
        }
    }

    /// Snapshot of the current session, built the same way as an
    /// `onAuthStateChanged` emission.
    pub async fn get_current_user(&self) -> Result<Option<AuthenticatedUserWithClaims>, AuthError> {
        let user = project_user(self.provider.current_session().as_ref());
        self.resolver.with_claims(user, false).await
    }

    /// Route every session transition to `sink` from now on.
    pub fn register_auth_emitter(&self, sink: Arc<dyn AuthEventSink>) {
        self.observer.register(sink);
    }

    /// Detach the registered sink and release the provider subscription.
    pub fn unregister_auth_emitter(&self) {
        self.observer.unregister();
    }

    pub async fn get_user_claims(&self, force_refresh: bool) -> Result<Option<Claims>, AuthError> {
        self.resolver.get_claims(force_refresh).await
    }

    /// Regenerate claims server-side, reload the session, and emit the
    /// fresh snapshot without waiting for the provider to notify.
    ///
    /// Fails with `NoActiveSession` if the session is gone at any point,
    /// rather than emitting a signed-out snapshot.
    pub async fn refresh(&self) -> Result<AuthenticatedUserWithClaims, AuthError> {
        if self.provider.current_session().is_none() {
            return Err(AuthError::NoActiveSession);
        }

        self.provider
            .invoke_remote_function(REFRESH_CLAIMS_FUNCTION, serde_json::json!({}))
            .await?;
        self.provider.reload_session().await?;

        let slot = self.observer.reserve();
        let user = project_user(self.provider.current_session().as_ref())
            .ok_or(AuthError::NoActiveSession)?;
        let claims = self.resolver.get_claims(true).await?;
        let snapshot = user.with_claims(claims);

        tracing::info!(uid = %snapshot.uid, "Claims refreshed");
        slot.emit(AuthEvent::AuthStateChanged(Some(snapshot.clone())))?;

        Ok(snapshot)
    }

    pub async fn generate_login_token(&self) -> Result<String, AuthError> {
        self.tokens.generate_login_token().await
    }

    pub async fn login_with_token(&self, token: &str) -> Result<(), AuthError> {
        self.tokens.login_with_token(token).await
    }

    /// End the provider session. The sign-out reaches subscribers through
    /// the normal change notification.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.provider.sign_out().await?;
        Ok(())
    }
}
