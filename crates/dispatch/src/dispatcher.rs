use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    palaver_actions::{ActionRegistry, Error as ActionError, Handler, MERGE_ACTION},
    palaver_common::Context,
    palaver_sessions::SessionStore,
    tracing::{debug, warn},
};

use crate::{
    engine::{Decision, NluEngine},
    error::{Error, Result},
};

/// Drives the continuation-passing action loop for sessions.
///
/// States per dispatch: awaiting an NLU decision, executing the decided
/// action, back to awaiting, until a stop decision (done) or a failure.
/// The context fed into turn N+1 is always the context produced by turn
/// N's completed handler, never a stale snapshot.
pub struct Dispatcher {
    store: Arc<SessionStore>,
    registry: Arc<ActionRegistry>,
    nlu: Arc<dyn NluEngine>,
    max_turns: Option<usize>,
    turn_timeout: Option<Duration>,
    // Per-session guards; tokio mutexes wake waiters in FIFO order, which
    // is what gives queued same-session messages their arrival ordering.
    turn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<ActionRegistry>,
        nlu: Arc<dyn NluEngine>,
    ) -> Self {
        Self {
            store,
            registry,
            nlu,
            max_turns: None,
            turn_timeout: None,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Cap the number of turns per dispatch. Guards against a misbehaving
    /// NLU engine cycling merge/action decisions forever.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Force `FAILED` with a timeout error when the NLU engine or a
    /// handler never completes a turn within `timeout`.
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    fn turn_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    async fn await_turn<T>(&self, turn: usize, fut: impl Future<Output = T>) -> Result<T> {
        match self.turn_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| Error::Timeout {
                    turn,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            None => Ok(fut.await),
        }
    }

    /// Run one dispatch loop for a session.
    ///
    /// Exchanges turns with the NLU engine until it decides to stop, then
    /// persists the final context wholesale and returns it. On any
    /// loop-level failure the session's stored context is left untouched.
    pub async fn dispatch(&self, session_id: &str, utterance: Option<&str>) -> Result<Context> {
        let lock = self.turn_lock(session_id);
        let _guard = lock.lock().await;

        let mut context = self.store.get(session_id).await?.context;
        let mut utterance = utterance;
        let mut turn = 0usize;

        loop {
            if let Some(limit) = self.max_turns
                && turn >= limit
            {
                warn!(session_id, limit, "dispatch turn limit reached");
                return Err(Error::TurnLimit { limit });
            }

            let decided = self
                .await_turn(turn, self.nlu.decide(session_id, utterance, &context))
                .await?;
            let decision = match decided {
                Ok(decision) => decision,
                Err(nlu_err) => {
                    let message = nlu_err.to_string();
                    warn!(session_id, turn, error = %message, "nlu engine failed");
                    if let Some(hook) = self.registry.error_hook() {
                        hook.run(session_id, &context, &message).await;
                    }
                    return Err(Error::Nlu { message });
                },
            };
            utterance = None;
            turn += 1;

            match decision {
                Decision::Stop => {
                    debug!(session_id, turns = turn, "dispatch complete");
                    self.store
                        .replace_context(session_id, context.clone())
                        .await?;
                    return Ok(context);
                },
                Decision::Merge { entities, message } => {
                    debug!(session_id, turn, "executing merge");
                    let handler = Arc::clone(self.registry.merge()?);
                    let updated = self
                        .await_turn(
                            turn,
                            handler.run(session_id, &context, &entities, message.as_deref()),
                        )
                        .await?
                        .map_err(|source| Error::Handler {
                            name: MERGE_ACTION.into(),
                            source,
                        })?;
                    if let Some(next) = updated {
                        context = next;
                    }
                },
                Decision::Action { name, payload } => {
                    debug!(session_id, turn, action = %name, "executing action");
                    let handler = self.registry.lookup(&name)?.clone();
                    let completed = match handler {
                        Handler::Effect(action) => {
                            self.await_turn(turn, action.run(session_id, &context, &payload))
                                .await?
                        },
                        Handler::Step(action) => {
                            self.await_turn(turn, action.run(session_id, &context))
                                .await?
                        },
                        Handler::Merge(_) | Handler::Error(_) => {
                            return Err(Error::Action(ActionError::WrongShape {
                                name,
                                expected: "effect or step",
                            }));
                        },
                    };
                    let updated = completed.map_err(|source| Error::Handler { name, source })?;
                    if let Some(next) = updated {
                        context = next;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex as StdMutex};

    use {
        async_trait::async_trait,
        palaver_actions::{EffectAction, ErrorHook, MergeAction, StepAction},
        serde_json::json,
    };

    use {super::*, crate::engine::NluError};

    type Script = StdMutex<VecDeque<std::result::Result<Decision, NluError>>>;

    /// NLU double that replays a fixed decision script and records what it
    /// was asked.
    struct ScriptedEngine {
        script: Script,
        seen_utterances: StdMutex<Vec<Option<String>>>,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedEngine {
        fn new(
            decisions: Vec<std::result::Result<Decision, NluError>>,
            log: Arc<StdMutex<Vec<String>>>,
        ) -> Self {
            Self {
                script: StdMutex::new(decisions.into()),
                seen_utterances: StdMutex::new(Vec::new()),
                log,
            }
        }
    }

    #[async_trait]
    impl NluEngine for ScriptedEngine {
        async fn decide(
            &self,
            _session_id: &str,
            utterance: Option<&str>,
            _context: &Context,
        ) -> std::result::Result<Decision, NluError> {
            self.log.lock().unwrap().push("decide".into());
            self.seen_utterances
                .lock()
                .unwrap()
                .push(utterance.map(str::to_string));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted engine ran out of decisions")
        }
    }

    /// NLU double whose decision never completes.
    struct StalledEngine;

    #[async_trait]
    impl NluEngine for StalledEngine {
        async fn decide(
            &self,
            _session_id: &str,
            _utterance: Option<&str>,
            _context: &Context,
        ) -> std::result::Result<Decision, NluError> {
            futures::future::pending().await
        }
    }

    /// Step action that appends a marker to the context and the log.
    struct Marker {
        name: &'static str,
        log: Arc<StdMutex<Vec<String>>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl StepAction for Marker {
        async fn run(
            &self,
            _session_id: &str,
            context: &Context,
        ) -> anyhow::Result<Option<Context>> {
            self.log.lock().unwrap().push(format!("{}:start", self.name));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut next = context.clone();
            let seen = next
                .get("seen")
                .and_then(|v| v.as_str())
                .map(|s| format!("{s},{}", self.name))
                .unwrap_or_else(|| self.name.to_string());
            next.insert("seen".into(), json!(seen));
            self.log.lock().unwrap().push(format!("{}:end", self.name));
            Ok(Some(next))
        }
    }

    /// Effect action that records its payload as one outbound send.
    struct RecordingSender {
        sends: Arc<StdMutex<Vec<serde_json::Value>>>,
    }

    #[async_trait]
    impl EffectAction for RecordingSender {
        async fn run(
            &self,
            _session_id: &str,
            _context: &Context,
            payload: &serde_json::Value,
        ) -> anyhow::Result<Option<Context>> {
            self.sends.lock().unwrap().push(payload.clone());
            Ok(Some(Context::new()))
        }
    }

    struct EntityRecorder {
        entities: Arc<StdMutex<Vec<(serde_json::Value, Option<String>)>>>,
    }

    #[async_trait]
    impl MergeAction for EntityRecorder {
        async fn run(
            &self,
            _session_id: &str,
            context: &Context,
            entities: &serde_json::Value,
            message: Option<&str>,
        ) -> anyhow::Result<Option<Context>> {
            self.entities
                .lock()
                .unwrap()
                .push((entities.clone(), message.map(str::to_string)));
            let mut next = context.clone();
            next.insert("merged".into(), json!(true));
            Ok(Some(next))
        }
    }

    struct FailingStep;

    #[async_trait]
    impl StepAction for FailingStep {
        async fn run(
            &self,
            _session_id: &str,
            _context: &Context,
        ) -> anyhow::Result<Option<Context>> {
            anyhow::bail!("downstream exploded")
        }
    }

    struct RecordingHook {
        errors: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl ErrorHook for RecordingHook {
        async fn run(&self, _session_id: &str, _context: &Context, error: &str) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    fn log() -> Arc<StdMutex<Vec<String>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    async fn seeded_session(store: &SessionStore, user: &str) -> String {
        store.resolve_or_create(user).await
    }

    #[tokio::test]
    async fn handlers_run_in_decision_order_with_threaded_context() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut registry = ActionRegistry::new();
        registry.register_step(
            "first",
            Arc::new(Marker {
                name: "first",
                log: Arc::clone(&log),
                delay: None,
            }),
        );
        registry.register_step(
            "second",
            Arc::new(Marker {
                name: "second",
                log: Arc::clone(&log),
                delay: None,
            }),
        );

        let engine = ScriptedEngine::new(
            vec![
                Ok(Decision::Action {
                    name: "first".into(),
                    payload: json!(null),
                }),
                Ok(Decision::Action {
                    name: "second".into(),
                    payload: json!(null),
                }),
                Ok(Decision::Stop),
            ],
            Arc::clone(&log),
        );
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), Arc::new(engine));

        let context = dispatcher
            .dispatch(&session_id, Some("hello"))
            .await
            .unwrap();

        // Turn N+1 saw the context produced by turn N's continuation.
        assert_eq!(context["seen"], "first,second");
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "decide",
                "first:start",
                "first:end",
                "decide",
                "second:start",
                "second:end",
                "decide"
            ]
        );
        // The final context was persisted atomically at stop.
        assert_eq!(store.get(&session_id).await.unwrap().context, context);
    }

    #[tokio::test]
    async fn utterance_is_submitted_only_on_the_first_turn() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut registry = ActionRegistry::new();
        registry.register_step(
            "noop",
            Arc::new(Marker {
                name: "noop",
                log: Arc::clone(&log),
                delay: None,
            }),
        );
        let engine = Arc::new(ScriptedEngine::new(
            vec![
                Ok(Decision::Action {
                    name: "noop".into(),
                    payload: json!(null),
                }),
                Ok(Decision::Stop),
            ],
            Arc::clone(&log),
        ));
        let dispatcher = Dispatcher::new(store, Arc::new(registry), engine.clone());

        dispatcher
            .dispatch(&session_id, Some("schedule tonight"))
            .await
            .unwrap();

        assert_eq!(
            *engine.seen_utterances.lock().unwrap(),
            vec![Some("schedule tonight".to_string()), None]
        );
    }

    #[tokio::test]
    async fn merge_decision_routes_entities_to_the_merge_handler() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let entities = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register_merge(Arc::new(EntityRecorder {
            entities: Arc::clone(&entities),
        }));

        let engine = ScriptedEngine::new(
            vec![
                Ok(Decision::Merge {
                    entities: json!({"datetime": [{"value": "tonight"}]}),
                    message: Some("schedule tonight".into()),
                }),
                Ok(Decision::Stop),
            ],
            Arc::clone(&log),
        );
        let dispatcher = Dispatcher::new(store, Arc::new(registry), Arc::new(engine));

        let context = dispatcher
            .dispatch(&session_id, Some("schedule tonight"))
            .await
            .unwrap();

        assert_eq!(context["merged"], true);
        let seen = entities.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0["datetime"][0]["value"], "tonight");
        assert_eq!(seen[0].1.as_deref(), Some("schedule tonight"));
    }

    #[tokio::test]
    async fn unknown_action_fails_without_persisting_or_sending() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut seeded = Context::new();
        seeded.insert("stable".into(), json!(1));
        store
            .replace_context(&session_id, seeded.clone())
            .await
            .unwrap();

        let sends = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register_effect(
            "say",
            Arc::new(RecordingSender {
                sends: Arc::clone(&sends),
            }),
        );

        let engine = ScriptedEngine::new(
            vec![Ok(Decision::Action {
                name: "nonexistent_action".into(),
                payload: json!(null),
            })],
            Arc::clone(&log),
        );
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), Arc::new(engine));

        let err = dispatcher.dispatch(&session_id, Some("hi")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Action(ActionError::UnknownAction { ref name }) if name == "nonexistent_action"
        ));
        // Stored context unchanged from before the loop started.
        assert_eq!(store.get(&session_id).await.unwrap().context, seeded);
        assert!(sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn nlu_failure_invokes_hook_and_skips_persistence() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let errors = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register_error_hook(Arc::new(RecordingHook {
            errors: Arc::clone(&errors),
        }));
        registry.register_step(
            "noop",
            Arc::new(Marker {
                name: "noop",
                log: Arc::clone(&log),
                delay: None,
            }),
        );

        let engine = ScriptedEngine::new(
            vec![
                Ok(Decision::Action {
                    name: "noop".into(),
                    payload: json!(null),
                }),
                Err(NluError::new("decision service unavailable")),
            ],
            Arc::clone(&log),
        );
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(registry), Arc::new(engine));

        let err = dispatcher.dispatch(&session_id, Some("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Nlu { .. }));
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["decision service unavailable".to_string()]
        );
        // The first turn succeeded but the loop failed: nothing persisted.
        assert!(store.get(&session_id).await.unwrap().context.is_empty());
    }

    #[tokio::test]
    async fn handler_failure_fails_the_loop_without_retry() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut registry = ActionRegistry::new();
        registry.register_step("explode", Arc::new(FailingStep));

        let engine = ScriptedEngine::new(
            vec![Ok(Decision::Action {
                name: "explode".into(),
                payload: json!(null),
            })],
            Arc::clone(&log),
        );
        let dispatcher = Dispatcher::new(store, Arc::new(registry), Arc::new(engine));

        let err = dispatcher.dispatch(&session_id, Some("hi")).await.unwrap_err();
        match err {
            Error::Handler { name, source } => {
                assert_eq!(name, "explode");
                assert!(source.to_string().contains("downstream exploded"));
            },
            other => panic!("expected handler error, got {other:?}"),
        }
        // One decide call, no retry of the failed action.
        assert_eq!(log.lock().unwrap().iter().filter(|e| *e == "decide").count(), 1);
    }

    #[tokio::test]
    async fn wrong_shape_handler_is_rejected() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut registry = ActionRegistry::new();
        registry.register_merge(Arc::new(EntityRecorder {
            entities: Arc::new(StdMutex::new(Vec::new())),
        }));

        // The NLU engine names the merge handler as a plain action.
        let engine = ScriptedEngine::new(
            vec![Ok(Decision::Action {
                name: MERGE_ACTION.into(),
                payload: json!(null),
            })],
            Arc::clone(&log),
        );
        let dispatcher = Dispatcher::new(store, Arc::new(registry), Arc::new(engine));

        let err = dispatcher.dispatch(&session_id, None).await.unwrap_err();
        assert!(matches!(err, Error::Action(ActionError::WrongShape { .. })));
    }

    #[tokio::test]
    async fn turn_cap_stops_a_cycling_engine() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut registry = ActionRegistry::new();
        registry.register_step(
            "loop",
            Arc::new(Marker {
                name: "loop",
                log: Arc::clone(&log),
                delay: None,
            }),
        );

        let looping = Ok(Decision::Action {
            name: "loop".into(),
            payload: json!(null),
        });
        let engine = ScriptedEngine::new(
            vec![looping.clone(), looping.clone(), looping],
            Arc::clone(&log),
        );
        let dispatcher =
            Dispatcher::new(store, Arc::new(registry), Arc::new(engine)).with_max_turns(2);

        let err = dispatcher.dispatch(&session_id, Some("hi")).await.unwrap_err();
        assert!(matches!(err, Error::TurnLimit { limit: 2 }));
    }

    #[tokio::test]
    async fn stalled_engine_times_out() {
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let dispatcher = Dispatcher::new(
            store,
            Arc::new(ActionRegistry::new()),
            Arc::new(StalledEngine),
        )
        .with_turn_timeout(Duration::from_millis(20));

        let err = dispatcher.dispatch(&session_id, Some("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { turn: 0, .. }));
    }

    #[tokio::test]
    async fn independent_sessions_never_share_context() {
        let store = Arc::new(SessionStore::new());
        let s1 = seeded_session(&store, "u1").await;
        let s2 = seeded_session(&store, "u2").await;

        let log1 = log();
        let mut r1 = ActionRegistry::new();
        r1.register_step(
            "mark",
            Arc::new(Marker {
                name: "one",
                log: Arc::clone(&log1),
                delay: Some(Duration::from_millis(10)),
            }),
        );
        let e1 = ScriptedEngine::new(
            vec![
                Ok(Decision::Action {
                    name: "mark".into(),
                    payload: json!(null),
                }),
                Ok(Decision::Stop),
            ],
            Arc::clone(&log1),
        );
        let d1 = Arc::new(Dispatcher::new(store.clone(), Arc::new(r1), Arc::new(e1)));

        let log2 = log();
        let mut r2 = ActionRegistry::new();
        r2.register_step(
            "mark",
            Arc::new(Marker {
                name: "two",
                log: Arc::clone(&log2),
                delay: Some(Duration::from_millis(10)),
            }),
        );
        let e2 = ScriptedEngine::new(
            vec![
                Ok(Decision::Action {
                    name: "mark".into(),
                    payload: json!(null),
                }),
                Ok(Decision::Stop),
            ],
            Arc::clone(&log2),
        );
        let d2 = Arc::new(Dispatcher::new(store.clone(), Arc::new(r2), Arc::new(e2)));

        let (c1, c2) = tokio::join!(
            {
                let d1 = Arc::clone(&d1);
                let s1 = s1.clone();
                async move { d1.dispatch(&s1, Some("a")).await }
            },
            {
                let d2 = Arc::clone(&d2);
                let s2 = s2.clone();
                async move { d2.dispatch(&s2, Some("b")).await }
            }
        );

        assert_eq!(c1.unwrap()["seen"], "one");
        assert_eq!(c2.unwrap()["seen"], "two");
        assert_eq!(store.get(&s1).await.unwrap().context["seen"], "one");
        assert_eq!(store.get(&s2).await.unwrap().context["seen"], "two");
    }

    #[tokio::test]
    async fn same_session_dispatches_queue_in_arrival_order() {
        let log = log();
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;

        let mut registry = ActionRegistry::new();
        registry.register_step(
            "slow",
            Arc::new(Marker {
                name: "slow",
                log: Arc::clone(&log),
                delay: Some(Duration::from_millis(50)),
            }),
        );

        let engine = ScriptedEngine::new(
            vec![
                // First dispatch: one slow action, then stop.
                Ok(Decision::Action {
                    name: "slow".into(),
                    payload: json!(null),
                }),
                Ok(Decision::Stop),
                // Second dispatch: stop immediately.
                Ok(Decision::Stop),
            ],
            Arc::clone(&log),
        );
        let dispatcher = Arc::new(Dispatcher::new(store, Arc::new(registry), Arc::new(engine)));

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            let session_id = session_id.clone();
            tokio::spawn(async move { dispatcher.dispatch(&session_id, Some("one")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let dispatcher = Arc::clone(&dispatcher);
            let session_id = session_id.clone();
            tokio::spawn(async move { dispatcher.dispatch(&session_id, Some("two")).await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // The second loop's decide must come after the first loop fully
        // completed (slow handler and its stop decision included).
        assert_eq!(
            *log.lock().unwrap(),
            vec!["decide", "slow:start", "slow:end", "decide", "decide"]
        );
    }

    #[tokio::test]
    async fn dispatch_for_deleted_session_is_not_found() {
        let store = Arc::new(SessionStore::new());
        let session_id = seeded_session(&store, "u1").await;
        store.delete(&session_id).await.unwrap();

        let engine = ScriptedEngine::new(vec![], log());
        let dispatcher = Dispatcher::new(store, Arc::new(ActionRegistry::new()), Arc::new(engine));

        let err = dispatcher.dispatch(&session_id, Some("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }
}
