//! Shared types and configuration for SessionSync
//!
//! This crate provides functionality used across the SessionSync workspace:
//! - The domain's session projection types (`AuthenticatedUser`, `Claims`)
//! - Configuration management following 12-factor principles

pub mod config;
pub mod types;

pub use config::{Config, EventOrdering};
pub use types::{AuthenticatedUser, AuthenticatedUserWithClaims, Claims};
