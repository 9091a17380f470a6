//! Session projection types
//!
//! These are the shapes the rest of the application sees. They are rebuilt
//! from the identity provider on every read and never cached locally.

use serde::{Deserialize, Serialize};

/// Authorization claims, copied verbatim from the provider's id token.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Minimal view of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    /// Stable provider identifier
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl AuthenticatedUser {
    /// Attach the result of a claims lookup to this user.
    pub fn with_claims(self, claims: Option<Claims>) -> AuthenticatedUserWithClaims {
        AuthenticatedUserWithClaims {
            uid: self.uid,
            display_name: self.display_name,
            email: self.email,
            email_verified: self.email_verified,
            claims,
        }
    }
}

/// A user together with the claims resolved for their session.
///
/// `claims` is `None` when resolution was attempted but yielded nothing,
/// e.g. after a provider error in the session observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUserWithClaims {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub claims: Option<Claims>,
}

impl AuthenticatedUserWithClaims {
    /// Look up a single claim by key.
    pub fn claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.claims.as_ref().and_then(|c| c.get(key))
    }
}
