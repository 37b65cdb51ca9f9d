//! Functional core for authgate OIDC authentication.
//!
//! Pure types, the error taxonomy, expiry math and the store contracts
//! shared by the middleware crate. No I/O happens here.

mod error;
mod functions;
mod traits;
mod types;
mod validation;

pub use error::AuthError;
pub use functions::{
    calculate_expiry, generate_session_id, generate_state, is_session_expired, truncate_for_log,
};
pub use traits::{FlowStateStore, Result, SessionStore};
pub use types::{FlowState, Identity, Session, SessionId};
pub use validation::{matches_excluded_path, validate_return_to};
