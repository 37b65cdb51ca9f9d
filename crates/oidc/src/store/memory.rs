//! In-memory reference implementation of the store contracts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authgate_core::{
    calculate_expiry, is_session_expired, FlowState, FlowStateStore, Result, Session, SessionId,
    SessionStore,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

struct FlowEntry {
    flow: FlowState,
    expires_at: DateTime<Utc>,
}

/// In-memory session and flow-state store for development and testing.
///
/// Data lives in `HashMap`s behind `Arc<RwLock<_>>` and is lost when the
/// store is dropped. Expiry is enforced on the read path: expired entries
/// are reported absent (and dropped) even though deletion is lazy.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    flows: Arc<RwLock<HashMap<String, FlowEntry>>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically present sessions, expired or not. Diagnostics
    /// and test support.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put(&self, session: &Session, _ttl: Duration) -> Result<()> {
        // The session's own timestamps are authoritative on read, so the
        // eviction hint is not tracked separately here.
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.as_str().to_string(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id.as_str()) {
                Some(session) if !is_session_expired(session, Utc::now()) => {
                    return Ok(Some(session.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired but still present: drop it and report absence.
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(id.as_str())
            .is_some_and(|s| is_session_expired(s, Utc::now()))
        {
            sessions.remove(id.as_str());
        }
        Ok(None)
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id.as_str());
        Ok(())
    }

    async fn touch(&self, id: &SessionId, idle_expires_at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id.as_str()) {
            session.idle_expires_at = idle_expires_at;
        }
        Ok(())
    }
}

#[async_trait]
impl FlowStateStore for MemoryStore {
    async fn create(&self, nonce: &str, flow: &FlowState, ttl: Duration) -> Result<()> {
        let mut flows = self.flows.write().await;
        flows.insert(
            nonce.to_string(),
            FlowEntry {
                flow: flow.clone(),
                expires_at: calculate_expiry(Utc::now(), ttl),
            },
        );
        Ok(())
    }

    async fn consume(&self, nonce: &str) -> Result<Option<FlowState>> {
        // Remove-then-check under the write lock: of two racing consumers
        // exactly one sees the entry, and an expired entry stays deleted.
        let mut flows = self.flows.write().await;
        let Some(entry) = flows.remove(nonce) else {
            return Ok(None);
        };
        if entry.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(entry.flow))
    }
}
