//! Session Store
//!
//! Each conversation gets its own [`MedDataAssistant`] (and therefore its own
//! memory). The handle's async mutex serializes questions within a session;
//! different sessions never share mutable state.

use crate::assistant::{AssistantContext, MedDataAssistant};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub type SessionHandle = Arc<Mutex<MedDataAssistant>>;

/// Fresh session id
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub trait SessionStore: Send + Sync {
    /// Assistant for `session_id`, created on first use
    fn get_or_create(&self, session_id: &str) -> SessionHandle;

    /// Drop a session; returns whether it existed
    fn remove(&self, session_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemorySessionStore {
    context: AssistantContext,
    sessions: DashMap<String, SessionHandle>,
}

impl InMemorySessionStore {
    pub fn new(context: AssistantContext) -> Self {
        Self {
            context,
            sessions: DashMap::new(),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Some(existing) = self.sessions.get(session_id) {
            return Arc::clone(&existing);
        }

        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("Creating session {}", session_id);
                Arc::new(Mutex::new(MedDataAssistant::new(self.context.clone())))
            });
        Arc::clone(&handle)
    }

    fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
