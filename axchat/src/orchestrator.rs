//! Session-to-runner orchestration: turn admission, cancellation, fallback, and persistence.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use axcommon::{RetryPolicy, SessionId, TurnId};
use axprovider::{Message, Role};
use axstore::{
    MessageRecord, MessageRole, MessageStatus, RecordStore, SessionRecord, StoreError,
    ToolCallRecord,
};
use futures_timer::Delay;
use futures_util::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ChatConfig, ProviderSettings, ToolEndpoint};
use crate::factory::{AgentRunnerFactory, RunnerFactory};
use crate::hooks::{NoopTurnLifecycleHooks, TurnLifecycleHooks};
use crate::observer::{SafeTurnObserver, ToolCallEvent, TurnObserver};
use crate::pump::{
    DEFAULT_DELIVERY_MODES, DeliveryMode, DeliveryOutcome, ToolCallRecorder, TurnPump,
};
use crate::runner::Runner;
use crate::session::{ChatFuture, InMemorySessionService, SessionKey, SessionService};
use crate::ChatError;

pub const DEFAULT_HISTORY_SEED_LIMIT: usize = 50;
pub const SESSION_TITLE_MAX_CHARS: usize = 48;

pub struct ChatOrchestratorBuilder {
    store: Arc<dyn RecordStore>,
    sessions: Arc<dyn SessionService>,
    factory: Arc<dyn RunnerFactory>,
    config: ChatConfig,
    hooks: Arc<dyn TurnLifecycleHooks>,
    store_retry: RetryPolicy,
    delivery_modes: Vec<DeliveryMode>,
    history_seed_limit: usize,
}

impl ChatOrchestratorBuilder {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionService>,
        factory: Arc<dyn RunnerFactory>,
    ) -> Self {
        Self {
            store,
            sessions,
            factory,
            config: ChatConfig::default(),
            hooks: Arc::new(NoopTurnLifecycleHooks),
            store_retry: RetryPolicy::default(),
            delivery_modes: DEFAULT_DELIVERY_MODES.to_vec(),
            history_seed_limit: DEFAULT_HISTORY_SEED_LIMIT,
        }
    }

    pub fn config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn TurnLifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn store_retry(mut self, store_retry: RetryPolicy) -> Self {
        self.store_retry = store_retry;
        self
    }

    pub fn delivery_modes(mut self, delivery_modes: Vec<DeliveryMode>) -> Self {
        self.delivery_modes = delivery_modes;
        self
    }

    pub fn history_seed_limit(mut self, history_seed_limit: usize) -> Self {
        self.history_seed_limit = history_seed_limit;
        self
    }

    pub fn build(self) -> Result<ChatOrchestrator, ChatError> {
        if self.delivery_modes.is_empty() {
            return Err(ChatError::invalid_request(
                "at least one delivery mode is required",
            ));
        }

        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> ChatOrchestrator {
        ChatOrchestrator {
            inner: Arc::new(OrchestratorInner {
                store: self.store,
                sessions: self.sessions,
                factory: self.factory,
                hooks: self.hooks,
                store_retry: self.store_retry,
                delivery_modes: self.delivery_modes,
                history_seed_limit: self.history_seed_limit,
                state: RwLock::new(OrchestratorState {
                    config: self.config,
                    config_generation: 0,
                    session_generations: HashMap::new(),
                    runners: HashMap::new(),
                    active_turns: HashMap::new(),
                }),
            }),
        }
    }
}

/// Maps chat sessions to cached runners and drives one turn per session at a time.
///
/// Cloning is cheap; clones share the runner cache and the in-flight turn table.
#[derive(Clone)]
pub struct ChatOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    store: Arc<dyn RecordStore>,
    sessions: Arc<dyn SessionService>,
    factory: Arc<dyn RunnerFactory>,
    hooks: Arc<dyn TurnLifecycleHooks>,
    store_retry: RetryPolicy,
    delivery_modes: Vec<DeliveryMode>,
    history_seed_limit: usize,
    state: RwLock<OrchestratorState>,
}

struct OrchestratorState {
    config: ChatConfig,
    /// Bumped whenever `config` changes.
    config_generation: u64,
    /// Bumped whenever a session's runner is evicted.
    session_generations: HashMap<SessionId, u64>,
    runners: HashMap<SessionId, Arc<dyn Runner>>,
    active_turns: HashMap<SessionId, ActiveTurn>,
}

impl OrchestratorState {
    fn generation(&self, session_id: &SessionId) -> CacheGeneration {
        CacheGeneration {
            config: self.config_generation,
            session: self.session_generations.get(session_id).copied().unwrap_or(0),
        }
    }
}

/// Cache state a runner was built against; a runner built under an older generation is not cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheGeneration {
    config: u64,
    session: u64,
}

/// Provider settings captured for one turn.
struct ResolvedProvider {
    provider: ProviderSettings,
    tool_endpoints: Vec<ToolEndpoint>,
    generation: CacheGeneration,
}

struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancellationToken,
}

/// Handle to a spawned turn.
#[derive(Debug)]
pub struct TurnHandle {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub user_message_id: String,
    pub assistant_message_id: String,
    task: JoinHandle<Result<TurnOutcome, ChatError>>,
}

impl TurnHandle {
    /// Waits for the turn to finish and its assistant message to be written.
    pub async fn wait(self) -> Result<TurnOutcome, ChatError> {
        self.task
            .await
            .map_err(|error| ChatError::internal(format!("turn task failed: {error}")))?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub assistant_message_id: String,
    pub status: MessageStatus,
    pub content: String,
    pub delivered_by: Option<DeliveryMode>,
}

impl ChatOrchestrator {
    pub fn builder(
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionService>,
        factory: Arc<dyn RunnerFactory>,
    ) -> ChatOrchestratorBuilder {
        ChatOrchestratorBuilder::new(store, sessions, factory)
    }

    /// Orchestrator backed by in-memory remote sessions and the HTTP runner factory.
    pub fn with_defaults(store: Arc<dyn RecordStore>, config: ChatConfig) -> Self {
        let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
        let factory = Arc::new(AgentRunnerFactory::new(sessions.clone()));
        ChatOrchestratorBuilder::new(store, sessions, factory)
            .config(config)
            .build_unchecked()
    }

    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.inner.store.clone()
    }

    pub fn config(&self) -> ChatConfig {
        self.inner.read_state().config.clone()
    }

    /// Replaces provider and tool configuration. Cached runners are evicted when it changed.
    pub fn update_config(&self, config: ChatConfig) -> bool {
        let mut state = self.inner.write_state();
        if state.config == config {
            return false;
        }

        state.config = config;
        state.config_generation += 1;
        let evicted = state.runners.len();
        state.runners.clear();
        drop(state);

        tracing::info!(evicted, "configuration updated; runner cache cleared");
        true
    }

    /// Starts a turn and returns once the user and assistant messages are persisted.
    ///
    /// The reply streams to `observer` from a background task.
    pub async fn send_message(
        &self,
        session_id: impl Into<SessionId>,
        text: &str,
        observer: Arc<dyn TurnObserver>,
    ) -> Result<TurnHandle, ChatError> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(ChatError::invalid_request("session id must not be empty"));
        }

        let resolved = self.inner.resolve_provider(&session_id)?;
        if text.trim().is_empty() {
            return Err(ChatError::invalid_request("message text must not be empty"));
        }

        let mut reservation = self.inner.reserve_turn(&session_id)?;
        let runner = self.inner.runner_for(&session_id, &resolved)?;
        let provider = resolved.provider;
        self.inner.ensure_remote_session(&session_id).await?;
        self.inner
            .ensure_session_record(&session_id, text, &provider)
            .await?;

        let store = self.inner.store.clone();
        let user = self
            .inner
            .retry_store("create_message", || {
                store.create_message(MessageRecord::new(
                    session_id.as_str(),
                    MessageRole::User,
                    text,
                ))
            })
            .await?;
        let assistant = self
            .inner
            .retry_store("create_message", || {
                store.create_message(
                    MessageRecord::new(session_id.as_str(), MessageRole::Assistant, "")
                        .with_status(MessageStatus::InProgress)
                        .with_metadata("turn_id", reservation.turn_id.as_str()),
                )
            })
            .await?;

        let turn_id = reservation.turn_id.clone();
        let cancel = reservation.cancel.clone();
        reservation.armed = true;

        tracing::info!(
            session_id = %session_id,
            turn_id = %turn_id,
            provider = %provider.id,
            "turn queued"
        );

        let handle = TurnHandle {
            session_id: session_id.clone(),
            turn_id: turn_id.clone(),
            user_message_id: user.id.clone(),
            assistant_message_id: assistant.id.clone(),
            task: tokio::spawn(self.inner.clone().run_turn(PendingTurn {
                session_id,
                turn_id,
                text: text.to_string(),
                runner,
                assistant,
                observer: SafeTurnObserver::new(observer),
                cancel,
                reservation,
            })),
        };

        Ok(handle)
    }

    /// Evicts the cached runner and cancels any in-flight turn of the session.
    pub fn remove_runner(&self, session_id: &SessionId) {
        let mut state = self.inner.write_state();
        *state
            .session_generations
            .entry(session_id.clone())
            .or_insert(0) += 1;
        let runner = state.runners.remove(session_id);
        let turn = state.active_turns.remove(session_id);
        drop(state);

        if let Some(turn) = &turn {
            turn.cancel.cancel();
        }

        tracing::debug!(
            session_id = %session_id,
            had_runner = runner.is_some(),
            cancelled_turn = turn.is_some(),
            "runner removed"
        );
    }

    /// Requests cancellation of the in-flight turn. Returns false when none is active.
    pub fn cancel_turn(&self, session_id: &SessionId) -> bool {
        let state = self.inner.read_state();
        match state.active_turns.get(session_id) {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_turn_active(&self, session_id: &SessionId) -> bool {
        self.inner.read_state().active_turns.contains_key(session_id)
    }

    pub fn has_runner(&self, session_id: &SessionId) -> bool {
        self.inner.read_state().runners.contains_key(session_id)
    }

    /// Cancels and evicts the session, forgets its remote history, and deletes its records.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<(), ChatError> {
        self.remove_runner(session_id);
        self.inner
            .sessions
            .delete(&SessionKey::desktop(session_id.clone()))
            .await?;

        let store = self.inner.store.clone();
        self.inner
            .retry_store("delete_session", || store.delete_session(session_id.as_str()))
            .await?;
        Ok(())
    }
}

struct PendingTurn {
    session_id: SessionId,
    turn_id: TurnId,
    text: String,
    runner: Arc<dyn Runner>,
    assistant: MessageRecord,
    observer: SafeTurnObserver,
    cancel: CancellationToken,
    reservation: TurnReservation,
}

/// Holds a session's in-flight slot; releases it on drop unless a newer turn took it over.
struct TurnReservation {
    inner: Arc<OrchestratorInner>,
    session_id: SessionId,
    turn_id: TurnId,
    cancel: CancellationToken,
    armed: bool,
    released: bool,
}

impl TurnReservation {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut state = self.inner.write_state();
        let owned = state
            .active_turns
            .get(&self.session_id)
            .is_some_and(|turn| turn.turn_id == self.turn_id);
        if owned {
            state.active_turns.remove(&self.session_id);
        }
    }
}

impl Drop for TurnReservation {
    fn drop(&mut self) {
        if !self.armed {
            tracing::debug!(session_id = %self.session_id, "releasing unstarted turn");
        }
        self.release();
    }
}

impl OrchestratorInner {
    fn read_state(&self) -> RwLockReadGuard<'_, OrchestratorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, OrchestratorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_provider(&self, session_id: &SessionId) -> Result<ResolvedProvider, ChatError> {
        let state = self.read_state();
        let provider = state
            .config
            .active_provider()
            .ok_or_else(|| ChatError::configuration("no active provider is configured"))?;

        if !provider.has_credentials() {
            return Err(ChatError::configuration(format!(
                "provider '{}' has no API key configured",
                provider.id
            )));
        }

        if provider.model.trim().is_empty() {
            return Err(ChatError::configuration(format!(
                "provider '{}' has no model configured",
                provider.id
            )));
        }

        Ok(ResolvedProvider {
            provider: provider.clone(),
            tool_endpoints: state.config.tool_endpoints.clone(),
            generation: state.generation(session_id),
        })
    }

    fn reserve_turn(self: &Arc<Self>, session_id: &SessionId) -> Result<TurnReservation, ChatError> {
        let mut state = self.write_state();
        if state.active_turns.contains_key(session_id) {
            return Err(ChatError::session_busy(format!(
                "session '{session_id}' already has a turn in flight"
            )));
        }

        let turn_id = TurnId::new(uuid::Uuid::new_v4().to_string());
        let cancel = CancellationToken::new();
        state.active_turns.insert(
            session_id.clone(),
            ActiveTurn {
                turn_id: turn_id.clone(),
                cancel: cancel.clone(),
            },
        );

        Ok(TurnReservation {
            inner: self.clone(),
            session_id: session_id.clone(),
            turn_id,
            cancel,
            armed: false,
            released: false,
        })
    }

    fn runner_for(
        &self,
        session_id: &SessionId,
        resolved: &ResolvedProvider,
    ) -> Result<Arc<dyn Runner>, ChatError> {
        {
            let state = self.read_state();
            if state.generation(session_id) == resolved.generation
                && let Some(runner) = state.runners.get(session_id)
            {
                return Ok(runner.clone());
            }
        }

        let built = self.factory.build_runner(
            session_id,
            &resolved.provider,
            &resolved.tool_endpoints,
        )?;

        let mut state = self.write_state();
        if state.generation(session_id) != resolved.generation {
            tracing::debug!(
                session_id = %session_id,
                "runner settings changed during build; using the runner for this turn only"
            );
            return Ok(built);
        }

        Ok(state
            .runners
            .entry(session_id.clone())
            .or_insert(built)
            .clone())
    }

    async fn ensure_remote_session(&self, session_id: &SessionId) -> Result<(), ChatError> {
        let key = SessionKey::desktop(session_id.clone());
        if self.sessions.get(&key).await?.is_some() {
            return Ok(());
        }

        let seed = self.seed_history(session_id).await?;
        let created = self.sessions.create(&key, seed).await?;
        tracing::debug!(
            session_id = %session_id,
            seeded = created.message_count,
            "remote session created"
        );
        Ok(())
    }

    async fn seed_history(&self, session_id: &SessionId) -> Result<Vec<Message>, ChatError> {
        if self.history_seed_limit == 0 {
            return Ok(Vec::new());
        }

        let records = self.store.list_messages(session_id.as_str(), 0, 0).await?;
        let mut seed = records
            .into_iter()
            .filter(|record| record.status == MessageStatus::Completed)
            .filter(|record| !record.content.is_empty())
            .filter_map(|record| match record.role {
                MessageRole::User => Some(Message::new(Role::User, record.content)),
                MessageRole::Assistant => Some(Message::new(Role::Assistant, record.content)),
                MessageRole::System | MessageRole::Tool => None,
            })
            .take(self.history_seed_limit)
            .collect::<Vec<_>>();
        seed.reverse();
        Ok(seed)
    }

    async fn ensure_session_record(
        &self,
        session_id: &SessionId,
        text: &str,
        provider: &ProviderSettings,
    ) -> Result<(), ChatError> {
        if self.store.get_session(session_id.as_str()).await?.is_some() {
            return Ok(());
        }

        let record = SessionRecord::new(session_title(text), provider.model.clone())
            .with_id(session_id.as_str())
            .with_provider_id(provider.id.clone());
        self.retry_store("create_session", || self.store.create_session(record.clone()))
            .await?;
        Ok(())
    }

    async fn retry_store<T, Op, Fut>(&self, operation: &str, mut op: Op) -> Result<T, StoreError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if self.store_retry.should_retry(attempt, error.retryable) => {
                    let delay = self.store_retry.backoff_for_attempt(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying store write"
                    );
                    Delay::new(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn run_turn(self: Arc<Self>, turn: PendingTurn) -> Result<TurnOutcome, ChatError> {
        let PendingTurn {
            session_id,
            turn_id,
            text,
            runner,
            mut assistant,
            observer,
            cancel,
            mut reservation,
        } = turn;
        let started = Instant::now();
        self.hooks.on_turn_start(&session_id, &turn_id);
        observer.on_debug(&format!("session={session_id} start"));

        let recorder = StoreToolCallRecorder {
            inner: &self,
            session_id: &session_id,
            message_id: &assistant.id,
            recorded: Mutex::new(HashMap::new()),
        };
        let pump = TurnPump {
            cancel: &cancel,
            runner: runner.as_ref(),
            session_id: &session_id,
            observer: &observer,
            recorder: &recorder,
        };

        let mut buffer = String::new();
        let delivery = AssertUnwindSafe(pump.deliver_with_fallback(
            &text,
            &self.delivery_modes,
            &mut buffer,
        ))
        .catch_unwind()
        .await;

        let outcome = match delivery {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(session_id = %session_id, turn_id = %turn_id, "runner panicked");
                observer.on_message(MessageRole::System, "Error: the runner stopped unexpectedly");
                DeliveryOutcome::default()
            }
        };

        let status = final_status(&outcome);
        reservation.release();

        assistant.content = buffer;
        assistant.status = status;
        assistant.metadata.insert(
            "delivery".to_string(),
            Value::String(
                outcome
                    .delivered_by
                    .map(DeliveryMode::as_str)
                    .unwrap_or("none")
                    .to_string(),
            ),
        );

        let persisted = self
            .retry_store("update_message", || self.store.update_message(assistant.clone()))
            .await;
        if let Err(error) = self
            .retry_store("touch_session", || self.store.touch_session(session_id.as_str()))
            .await
        {
            tracing::warn!(session_id = %session_id, error = %error, "failed to touch session");
        }

        match persisted {
            Ok(()) => {
                let elapsed = started.elapsed();
                self.hooks
                    .on_turn_complete(&session_id, &turn_id, status, elapsed);
                tracing::info!(
                    session_id = %session_id,
                    turn_id = %turn_id,
                    status = %status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "turn finished"
                );

                Ok(TurnOutcome {
                    session_id,
                    turn_id,
                    assistant_message_id: assistant.id,
                    status,
                    content: assistant.content,
                    delivered_by: outcome.delivered_by,
                })
            }
            Err(error) => {
                let error = ChatError::from(error);
                tracing::error!(
                    session_id = %session_id,
                    turn_id = %turn_id,
                    error = %error,
                    "failed to persist assistant message"
                );
                self.hooks.on_turn_failure(&session_id, &turn_id, &error);
                Err(error)
            }
        }
    }
}

fn final_status(outcome: &DeliveryOutcome) -> MessageStatus {
    if outcome.cancelled {
        MessageStatus::Cancelled
    } else if outcome.delivered() && outcome.clean() {
        MessageStatus::Completed
    } else {
        MessageStatus::Failed
    }
}

fn session_title(text: &str) -> String {
    text.trim().chars().take(SESSION_TITLE_MAX_CHARS).collect()
}

/// Persists tool activity against the turn's assistant message as it streams.
struct StoreToolCallRecorder<'a> {
    inner: &'a OrchestratorInner,
    session_id: &'a SessionId,
    message_id: &'a str,
    /// Tool call id to record id.
    recorded: Mutex<HashMap<String, String>>,
}

impl StoreToolCallRecorder<'_> {
    fn record_id(&self, call_id: &str) -> Option<String> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call_id)
            .cloned()
    }

    async fn persist(&self, event: &ToolCallEvent) -> Result<(), StoreError> {
        let store = &self.inner.store;

        if !event.is_response() {
            let record = ToolCallRecord::new(
                self.session_id.as_str(),
                self.message_id,
                event.name.clone(),
                event.args.clone().unwrap_or_default(),
            );
            let created = self
                .inner
                .retry_store("create_tool_call", || store.create_tool_call(record.clone()))
                .await?;
            self.recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(event.call_id.clone(), created.id);
            return Ok(());
        }

        match self.record_id(&event.call_id) {
            Some(id) => {
                self.inner
                    .retry_store("update_tool_call", || {
                        store.update_tool_call(&id, event.result.clone(), event.error.clone())
                    })
                    .await
            }
            None => {
                let mut record = ToolCallRecord::new(
                    self.session_id.as_str(),
                    self.message_id,
                    event.name.clone(),
                    Default::default(),
                );
                record.result = event.result.clone();
                record.error = event.error.clone();
                self.inner
                    .retry_store("create_tool_call", || store.create_tool_call(record.clone()))
                    .await
                    .map(|_| ())
            }
        }
    }
}

impl ToolCallRecorder for StoreToolCallRecorder<'_> {
    fn record<'a>(&'a self, event: &'a ToolCallEvent) -> ChatFuture<'a, ()> {
        Box::pin(async move {
            if let Err(error) = self.persist(event).await {
                tracing::warn!(
                    session_id = %self.session_id,
                    tool = %event.name,
                    error = %error,
                    "failed to persist tool call"
                );
            }
        })
    }
}
