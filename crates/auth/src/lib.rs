//! Session core for SessionSync
//!
//! Keeps the application's view of the identity provider's session:
//! projects provider records into `AuthenticatedUser`, merges in claims,
//! broadcasts every transition as `onAuthStateChanged`, and carries the
//! token exchange used to log another execution context in.

mod claims;
mod error;
mod observer;
mod projector;
mod session;
mod token;

pub use claims::ClaimsResolver;
pub use error::AuthError;
pub use observer::SessionObserver;
pub use projector::project_user;
pub use session::AuthSession;
pub use token::TokenExchange;
