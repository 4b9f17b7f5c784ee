use std::collections::HashMap;

use {palaver_common::Context, tokio::sync::Mutex, tracing::debug};

use crate::error::{Error, Result};

/// Durable conversation state for one external user.
#[derive(Debug, Clone)]
pub struct Session {
    /// Synthesized primary key.
    pub id: String,
    /// Remote chat-platform user this session belongs to.
    pub external_user_id: String,
    /// Conversational state, opaque to the engine.
    pub context: Context,
}

/// In-memory keyed registry of conversation sessions.
///
/// All access goes through one async mutex, which both serializes
/// per-key operations (no lost updates) and makes `resolve_or_create`
/// idempotent under concurrent lookups for the same user.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the session for an external user, creating one with an
    /// empty context on first contact. Returns the session id.
    pub async fn resolve_or_create(&self, external_user_id: &str) -> String {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions
            .values()
            .find(|s| s.external_user_id == external_user_id)
        {
            return session.id.clone();
        }

        let id = uuid::Uuid::new_v4().to_string();
        debug!(session_id = %id, external_user_id, "created session");
        sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                external_user_id: external_user_id.to_string(),
                context: Context::new(),
            },
        );
        id
    }

    /// Fetch a session by id.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::not_found(session_id))
    }

    /// Wholesale overwrite of a session's context (not a merge). Called
    /// only at the end of a completed dispatch loop, never mid-turn.
    pub async fn replace_context(&self, session_id: &str, context: Context) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::not_found(session_id))?;
        session.context = context;
        Ok(())
    }

    /// Remove a session. Subsequent `get` calls fail with `NotFound`.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions
            .lock()
            .await
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(session_id))
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
