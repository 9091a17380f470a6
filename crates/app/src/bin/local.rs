// SessionSync - Local Session Monitor

use tokio::signal;
use tracing::{error, info, warn};

use sessionsync_common::config::Config;
use sessionsync_identity::IdentityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    sessionsync_app::init_tracing(&config.log_format);

    info!("Starting SessionSync local session monitor");

    let identity_config = IdentityConfig::from_env().map_err(|e| {
        error!("Failed to load identity configuration: {}", e);
        e
    })?;

    info!(provider = %identity_config.provider, "Configuration loaded successfully");

    let mut app = sessionsync_app::create_app(&config, identity_config).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    if let Ok(token) = std::env::var("LOGIN_TOKEN") {
        info!("Signing in with LOGIN_TOKEN");
        if let Err(e) = app.session.login_with_token(&token).await {
            warn!(code = e.code(), "Login with token failed: {}", e);
        }
    }

    loop {
        tokio::select! {
            event = app.listener.recv() => {
                let Some(event) = event else {
                    info!("Event channel closed");
                    break;
                };
                match event.user() {
                    Some(user) => info!(
                        event = event.name(),
                        uid = %user.uid,
                        email = ?user.email,
                        claims = user.claims.as_ref().map_or(0, |c| c.len()),
                        "Session active"
                    ),
                    None => info!(event = event.name(), "Signed out"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C signal, shutting down");
                break;
            }
        }
    }

    app.session.unregister_auth_emitter();
    info!(
        signed_in = app.provider.current_session().is_some(),
        "Session monitor shutdown complete"
    );
    Ok(())
}
