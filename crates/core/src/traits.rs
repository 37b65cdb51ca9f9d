use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AuthError, FlowState, Session, SessionId};

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Session storage abstraction.
///
/// All operations must be safe under concurrent invocation for the same
/// id, and `put`/`delete` are atomic with respect to `get`: no reader
/// observes a partially written session. Backend failures surface as
/// `AuthError::StoreUnavailable`, never as absence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a session under its id. `ttl` is an eviction hint for
    /// backends with native expiry; the session's own timestamps remain
    /// authoritative on the read path.
    async fn put(&self, session: &Session, ttl: Duration) -> Result<()>;

    /// Fetch a live session. Entries past their absolute or idle expiry
    /// are reported absent even if physical deletion is lazy.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Delete a session. Absent ids are not an error.
    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// Move the idle expiry forward. A no-op for absent ids.
    async fn touch(&self, id: &SessionId, idle_expires_at: DateTime<Utc>) -> Result<()>;
}

/// Short-lived storage for in-flight login attempts, keyed by state nonce.
#[async_trait]
pub trait FlowStateStore: Send + Sync {
    /// Store an in-flight login attempt with a short TTL.
    async fn create(&self, nonce: &str, flow: &FlowState, ttl: Duration) -> Result<()>;

    /// Atomic get-and-delete. Of two concurrent consumers of the same
    /// nonce, exactly one receives the flow state; the other observes
    /// absence. Entries past their TTL are never returned.
    async fn consume(&self, nonce: &str) -> Result<Option<FlowState>>;
}
