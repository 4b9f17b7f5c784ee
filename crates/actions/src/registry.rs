use std::{collections::HashMap, sync::Arc};

use {async_trait::async_trait, palaver_common::Context};

use crate::error::{Error, Result};

/// Reserved name for the entity-merge handler (shape 2).
pub const MERGE_ACTION: &str = "merge";

/// Reserved name for the terminal error hook (shape 4).
pub const ERROR_ACTION: &str = "error";

/// Side-effecting action with an extra payload from the NLU decision
/// (shape 1). The returned future completing is the continuation; the
/// dispatch loop suspends until then. Return `Some` to replace the
/// context for the next turn, `None` to keep it.
#[async_trait]
pub trait EffectAction: Send + Sync {
    async fn run(
        &self,
        session_id: &str,
        context: &Context,
        payload: &serde_json::Value,
    ) -> anyhow::Result<Option<Context>>;
}

/// Entity-merge action (shape 2): receives the NLU-extracted entities and
/// the candidate message for this turn.
#[async_trait]
pub trait MergeAction: Send + Sync {
    async fn run(
        &self,
        session_id: &str,
        context: &Context,
        entities: &serde_json::Value,
        message: Option<&str>,
    ) -> anyhow::Result<Option<Context>>;
}

impl std::fmt::Debug for dyn MergeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MergeAction")
    }
}

/// Pure continuation action (shape 3): no extra arguments.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, session_id: &str, context: &Context)
    -> anyhow::Result<Option<Context>>;
}

/// Terminal error hook (shape 4): invoked for observability when the NLU
/// engine reports a failure. No continuation — the loop does not resume.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn run(&self, session_id: &str, context: &Context, error: &str);
}

/// A registered handler with an explicit shape discriminant.
#[derive(Clone)]
pub enum Handler {
    Effect(Arc<dyn EffectAction>),
    Merge(Arc<dyn MergeAction>),
    Step(Arc<dyn StepAction>),
    Error(Arc<dyn ErrorHook>),
}

impl Handler {
    const fn shape(&self) -> &'static str {
        match self {
            Self::Effect(_) => "effect",
            Self::Merge(_) => "merge",
            Self::Step(_) => "step",
            Self::Error(_) => "error",
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler").field(&self.shape()).finish()
    }
}

/// Mapping from action name to handler.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Handler>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_effect(&mut self, name: impl Into<String>, action: Arc<dyn EffectAction>) {
        self.handlers.insert(name.into(), Handler::Effect(action));
    }

    pub fn register_step(&mut self, name: impl Into<String>, action: Arc<dyn StepAction>) {
        self.handlers.insert(name.into(), Handler::Step(action));
    }

    pub fn register_merge(&mut self, action: Arc<dyn MergeAction>) {
        self.handlers
            .insert(MERGE_ACTION.into(), Handler::Merge(action));
    }

    pub fn register_error_hook(&mut self, hook: Arc<dyn ErrorHook>) {
        self.handlers
            .insert(ERROR_ACTION.into(), Handler::Error(hook));
    }

    /// Resolve a named action. Fails with `UnknownAction` when nothing is
    /// registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&Handler> {
        self.handlers
            .get(name)
            .ok_or_else(|| Error::unknown_action(name))
    }

    /// The merge handler, if one is registered.
    pub fn merge(&self) -> Result<&Arc<dyn MergeAction>> {
        match self.handlers.get(MERGE_ACTION) {
            Some(Handler::Merge(action)) => Ok(action),
            Some(_) => Err(Error::WrongShape {
                name: MERGE_ACTION.into(),
                expected: "merge",
            }),
            None => Err(Error::unknown_action(MERGE_ACTION)),
        }
    }

    /// The terminal error hook, if one is registered.
    #[must_use]
    pub fn error_hook(&self) -> Option<Arc<dyn ErrorHook>> {
        match self.handlers.get(ERROR_ACTION) {
            Some(Handler::Error(hook)) => Some(Arc::clone(hook)),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl StepAction for Noop {
        async fn run(
            &self,
            _session_id: &str,
            _context: &Context,
        ) -> anyhow::Result<Option<Context>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl MergeAction for Noop {
        async fn run(
            &self,
            _session_id: &str,
            _context: &Context,
            _entities: &serde_json::Value,
            _message: Option<&str>,
        ) -> anyhow::Result<Option<Context>> {
            Ok(None)
        }
    }

    #[test]
    fn lookup_missing_is_unknown_action() {
        let registry = ActionRegistry::new();
        let err = registry.lookup("nonexistent_action").unwrap_err();
        assert!(matches!(err, Error::UnknownAction { name } if name == "nonexistent_action"));
    }

    #[test]
    fn registered_step_resolves_with_its_shape() {
        let mut registry = ActionRegistry::new();
        registry.register_step("list_schedule", Arc::new(Noop));

        assert!(registry.contains("list_schedule"));
        let handler = registry.lookup("list_schedule").unwrap();
        assert!(matches!(handler, Handler::Step(_)));
    }

    #[test]
    fn merge_accessor_requires_merge_shape() {
        let mut registry = ActionRegistry::new();
        assert!(matches!(
            registry.merge().unwrap_err(),
            Error::UnknownAction { .. }
        ));

        registry.register_merge(Arc::new(Noop));
        assert!(registry.merge().is_ok());
    }

    #[test]
    fn merge_accessor_rejects_wrong_shape() {
        let mut registry = ActionRegistry::new();
        registry.register_step(MERGE_ACTION, Arc::new(Noop));
        assert!(matches!(
            registry.merge().unwrap_err(),
            Error::WrongShape { .. }
        ));
    }

    #[test]
    fn error_hook_absent_by_default() {
        let registry = ActionRegistry::new();
        assert!(registry.error_hook().is_none());
    }
}
