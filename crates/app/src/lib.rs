//! SessionSync application composition root
//!
//! Wires configuration, the identity provider and an event transport into
//! a running `AuthSession`.

use std::sync::Arc;

use sessionsync_auth::AuthSession;
use sessionsync_common::config::Config;
use sessionsync_events::{ChannelEmitter, EventListener};
use sessionsync_identity::{IdentityConfig, IdentityProvider, IdentityProviderFactory};

/// A wired session plus the listening end of its event channel.
pub struct App {
    pub session: AuthSession,
    pub provider: Arc<dyn IdentityProvider>,
    pub listener: EventListener,
}

/// Install the global tracing subscriber.
///
/// `log_format = "json"` selects structured JSON output; anything else
/// gets the human-readable formatter.
pub fn init_tracing(log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .init();
    }
}

/// Build the session from configuration and register a channel emitter.
///
/// Must be called inside a tokio runtime.
pub fn create_app(config: &Config, identity_config: IdentityConfig) -> Result<App, anyhow::Error> {
    let provider: Arc<dyn IdentityProvider> =
        Arc::from(IdentityProviderFactory::create(identity_config)?);

    let session = AuthSession::with_event_ordering(provider.clone(), config.event_ordering);

    let (emitter, listener) = ChannelEmitter::pair();
    session.register_auth_emitter(Arc::new(emitter));

    Ok(App {
        session,
        provider,
        listener,
    })
}
