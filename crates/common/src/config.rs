//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use std::env;
use std::str::FromStr;

/// How the session observer orders emissions when provider
/// notifications overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrdering {
    /// Emit each notification as soon as its claims resolve, even if a
    /// newer notification already emitted.
    #[default]
    Unordered,
    /// Drop an emission when a newer notification has already emitted.
    /// Refresh snapshots take part in the same sequence.
    Supersede,
}

impl FromStr for EventOrdering {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unordered" => Ok(EventOrdering::Unordered),
            "supersede" => Ok(EventOrdering::Supersede),
            other => Err(anyhow::anyhow!(
                "Unknown event ordering: {}. Supported: unordered, supersede",
                other
            )),
        }
    }
}

impl std::fmt::Display for EventOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOrdering::Unordered => write!(f, "unordered"),
            EventOrdering::Supersede => write!(f, "supersede"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Ordering policy for the session observer
    pub event_ordering: EventOrdering,

    /// Runtime configuration
    pub rust_log: String,
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let event_ordering = match env::var("EVENT_ORDERING") {
            Ok(value) => value.parse()?,
            Err(_) => EventOrdering::default(),
        };

        let config = Self {
            event_ordering,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "sessionsync=debug".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        };

        tracing::debug!(event_ordering = %config.event_ordering, "Configuration loaded");

        Ok(config)
    }
}
