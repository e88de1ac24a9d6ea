//! Session registry
//!
//! Sessions are isolated actors; the registry only maps ids to handles.

use super::session_orchestrator::{SessionDeps, SessionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
    deps: SessionDeps,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            deps,
        }
    }

    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    /// Connect: spawn a new session actor
    pub async fn create(&self) -> SessionHandle {
        let id = Uuid::new_v4();
        let handle = SessionHandle::spawn(id, self.deps.clone());
        self.sessions.write().await.insert(id, handle.clone());
        info!(session_id = %id, "Session created");
        handle
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Sessions ordered by creation time
    pub async fn list(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        handles.sort_by_key(|h| h.created_at());
        handles
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove and close a session
    pub async fn remove(&self, id: Uuid) -> Option<SessionHandle> {
        let handle = self.sessions.write().await.remove(&id)?;
        if let Err(e) = handle.close().await {
            warn!(session_id = %id, error = %e, "Session already stopped");
        }
        Some(handle)
    }
}
