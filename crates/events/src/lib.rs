//! SessionSync Auth Events
//!
//! Outbound side of the session core:
//! - `AuthEvent`, the tagged message every subscriber receives
//! - `AuthEventSink`, the capability the core emits through
//! - `ChannelEmitter`, a JSON-framed transport for delivery to another
//!   execution context
//! - `MockEventSink`, an in-memory recorder for tests

pub mod channel;
pub mod mock;

use serde::{Deserialize, Serialize};
use sessionsync_common::AuthenticatedUserWithClaims;
use thiserror::Error;

pub use channel::{ChannelEmitter, EventListener};
pub use mock::MockEventSink;

/// Wire name of the session snapshot event.
pub const AUTH_STATE_CHANGED: &str = "onAuthStateChanged";

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("Event channel closed")]
    Closed,

    #[error("Event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Message sent to auth event subscribers.
///
/// Serialized as `{"kind": "<event name>", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum AuthEvent {
    /// Complete session snapshot; `None` means signed out.
    #[serde(rename = "onAuthStateChanged")]
    AuthStateChanged(Option<AuthenticatedUserWithClaims>),
}

impl AuthEvent {
    /// Event name as seen by subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::AuthStateChanged(_) => AUTH_STATE_CHANGED,
        }
    }

    /// The session snapshot carried by a state change.
    pub fn user(&self) -> Option<&AuthenticatedUserWithClaims> {
        match self {
            AuthEvent::AuthStateChanged(user) => user.as_ref(),
        }
    }
}

/// Outbound event channel the session core emits through.
///
/// Delivery is fire-and-forget: no acknowledgement is awaited and
/// at-most-once delivery is acceptable.
pub trait AuthEventSink: Send + Sync {
    fn emit(&self, event: AuthEvent) -> Result<(), EmitError>;
}
