use std::sync::Arc;

use {
    async_trait::async_trait,
    palaver_actions::{ActionRegistry, EffectAction, ErrorHook, MergeAction},
    palaver_common::{Context, MessagePayload},
    palaver_outbound::MessageGateway,
    palaver_sessions::SessionStore,
    tracing::{error, warn},
};

/// `say`: deliver the NLU-provided payload to the session's user.
///
/// Transport failures are recovered here — logged, never re-raised — so a
/// failed send does not terminate the dispatch loop.
pub struct SendMessageAction {
    store: Arc<SessionStore>,
    outbound: Arc<MessageGateway>,
}

impl SendMessageAction {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, outbound: Arc<MessageGateway>) -> Self {
        Self { store, outbound }
    }

    fn payload_from(value: &serde_json::Value) -> MessagePayload {
        if let Some(text) = value.as_str() {
            return MessagePayload::text(text);
        }
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EffectAction for SendMessageAction {
    async fn run(
        &self,
        session_id: &str,
        _context: &Context,
        payload: &serde_json::Value,
    ) -> anyhow::Result<Option<Context>> {
        let session = self.store.get(session_id).await?;
        let message = Self::payload_from(payload);
        if message == MessagePayload::default() {
            warn!(session_id, "say action with empty payload, nothing to send");
            return Ok(None);
        }

        if let Err(e) = self
            .outbound
            .send_payload(&session.external_user_id, &message)
            .await
        {
            warn!(session_id, error = %e, "say action send failed, continuing");
        }
        Ok(None)
    }
}

/// Default `merge`: insert the first value of each extracted entity into
/// the context. Business logic that needs richer slot handling registers
/// its own merge handler instead.
pub struct EntityMergeAction;

#[async_trait]
impl MergeAction for EntityMergeAction {
    async fn run(
        &self,
        _session_id: &str,
        context: &Context,
        entities: &serde_json::Value,
        _message: Option<&str>,
    ) -> anyhow::Result<Option<Context>> {
        let Some(map) = entities.as_object() else {
            return Ok(None);
        };

        let mut next = context.clone();
        for (key, candidates) in map {
            let first = candidates
                .get(0)
                .map(|c| c.get("value").cloned().unwrap_or_else(|| c.clone()));
            if let Some(value) = first {
                next.insert(key.clone(), value);
            }
        }
        Ok(Some(next))
    }
}

/// Default error hook: log the NLU failure for observability.
pub struct LogErrorHook;

#[async_trait]
impl ErrorHook for LogErrorHook {
    async fn run(&self, session_id: &str, _context: &Context, error: &str) {
        error!(session_id, error, "nlu engine reported a turn failure");
    }
}

/// Registry with the bundled `say` / `merge` / `error` handlers.
#[must_use]
pub fn default_registry(store: Arc<SessionStore>, outbound: Arc<MessageGateway>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register_effect("say", Arc::new(SendMessageAction::new(store, outbound)));
    registry.register_merge(Arc::new(EntityMergeAction));
    registry.register_error_hook(Arc::new(LogErrorHook));
    registry
}
