//! OIDC authentication middleware for HTTP services.
//!
//! This crate provides:
//! - The authorization-code flow with PKCE against a single configured IdP
//! - A transport-free per-request interception state machine
//! - An axum integration layer and extractors
//! - An in-memory reference implementation of the store contracts
//!
//! The store contracts, session types and error taxonomy live in
//! [`authgate_core`].

mod config;
mod controller;
mod error;
mod extractors;
mod layer;
mod middleware;
mod provider;
mod state;
mod store;
mod token;

pub use config::{AuthConfig, CookieConfig, ProviderEndpoints, SameSitePolicy};
pub use controller::{CallbackOutcome, CallbackParams, LogoutOutcome, OidcController};
pub use error::{status_for, HttpAuthError};
pub use extractors::{CurrentUser, OptionalUser};
pub use layer::intercept;
pub use middleware::{AuthMiddleware, CookieAction, Decision, RequestFacts, SessionCookie};
pub use state::AuthState;
pub use store::MemoryStore;
