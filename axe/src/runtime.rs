//! Runtime wiring: record store, remote sessions, runner factory, and orchestrator.

use std::sync::Arc;

use axchat::{AgentRunnerFactory, ChatError, ChatOrchestrator, InMemorySessionService, SessionService};
use axobserve::standard_hooks;
use axstore::{RecordStore, RecordStoreConfig, create_record_store};

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AxeRuntime {
    pub config: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub sessions: Arc<dyn SessionService>,
    pub orchestrator: ChatOrchestrator,
}

/// HTTP-backed runner factory over `sessions`, logging and counting provider and tool activity.
pub fn runner_factory(sessions: Arc<dyn SessionService>) -> AgentRunnerFactory {
    let hooks = Arc::new(standard_hooks());
    AgentRunnerFactory::new(sessions)
        .with_provider_hooks(hooks.clone())
        .with_tool_hooks(hooks)
}

/// Opens the SQLite database at `config.db_path` and wires the orchestrator to it.
pub fn build_runtime(config: AppConfig) -> Result<AxeRuntime, ChatError> {
    let store = create_record_store(RecordStoreConfig::Sqlite {
        path: config.db_path.clone(),
    })?;
    let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    build_runtime_with(config, store, runner_factory(sessions))
}

pub fn build_in_memory_runtime(config: AppConfig) -> Result<AxeRuntime, ChatError> {
    let store = create_record_store(RecordStoreConfig::InMemory)?;
    let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
    build_runtime_with(config, store, runner_factory(sessions))
}

/// Wires an orchestrator around `store` and `factory`; runners share the factory's sessions.
pub fn build_runtime_with(
    config: AppConfig,
    store: Arc<dyn RecordStore>,
    factory: AgentRunnerFactory,
) -> Result<AxeRuntime, ChatError> {
    let sessions = factory.sessions();
    let orchestrator = ChatOrchestrator::builder(store.clone(), sessions.clone(), Arc::new(factory))
        .config(config.chat.clone())
        .hooks(Arc::new(standard_hooks()))
        .build()?;

    tracing::info!(
        db_path = %config.db_path.display(),
        providers = config.chat.providers.len(),
        tool_endpoints = config.chat.tool_endpoints.len(),
        "runtime ready"
    );

    Ok(AxeRuntime {
        config,
        store,
        sessions,
        orchestrator,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex, OnceLock};

    use axchat::{ChatErrorKind, NoopTurnObserver};
    use axobserve::metric_names;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use axprovider::{
        BoxedEventStream, Message, ModelProvider, ModelRequest, ModelResponse, OutputItem,
        ProviderError, ProviderFuture, ProviderKind, Role, StopReason, StreamEvent, TokenUsage,
        VecEventStream,
    };
    use axstore::{InMemoryRecordStore, MessageRole, MessageStatus};

    use super::*;

    struct FakeProvider;

    fn done(model: String) -> ModelResponse {
        ModelResponse {
            provider: ProviderKind::Gemini,
            model,
            output: vec![OutputItem::Message(Message::new(Role::Assistant, "done"))],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    impl ModelProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        fn complete<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
            Box::pin(async move { Ok(done(request.model)) })
        }

        fn stream<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async move {
                let stream = VecEventStream::new(vec![
                    Ok(StreamEvent::TextDelta("done".to_string())),
                    Ok(StreamEvent::ResponseComplete(done(request.model))),
                ]);
                Ok(Box::pin(stream) as BoxedEventStream<'a>)
            })
        }
    }

    fn keyed_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::defaults_in(dir);
        config.chat.tool_endpoints.clear();
        config.apply_api_key("test-key");
        config
    }

    #[tokio::test]
    async fn in_memory_runtime_rejects_unkeyed_provider() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let runtime = build_in_memory_runtime(AppConfig::defaults_in(dir.path()))
            .expect("runtime should build");

        let error = runtime
            .orchestrator
            .send_message("s-1", "hello", Arc::new(NoopTurnObserver))
            .await
            .expect_err("unkeyed provider should be rejected");

        assert_eq!(error.kind, ChatErrorKind::Configuration);
    }

    #[tokio::test]
    async fn runtime_with_injected_model_completes_a_turn() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
        let factory = runner_factory(sessions)
            .with_model_clients(|_| Ok(Arc::new(FakeProvider) as Arc<dyn ModelProvider>));
        let runtime = build_runtime_with(
            keyed_config(dir.path()),
            Arc::new(InMemoryRecordStore::new()),
            factory,
        )
        .expect("runtime should build");

        let outcome = runtime
            .orchestrator
            .send_message("s-1", "hello", Arc::new(NoopTurnObserver))
            .await
            .expect("send should start a turn")
            .wait()
            .await
            .expect("turn should finish");

        assert_eq!(outcome.status, MessageStatus::Completed);
        assert_eq!(outcome.content, "done");

        let messages = runtime
            .store
            .list_messages("s-1", 0, 0)
            .await
            .expect("messages should list");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::Assistant);
    }

    /// Process-wide recorder keeping the name and labels of every series registered.
    #[derive(Clone, Default)]
    struct SeriesRecorder {
        series: Arc<Mutex<Vec<String>>>,
    }

    impl SeriesRecorder {
        fn note(&self, key: &Key) {
            let labels = key
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect::<Vec<_>>()
                .join(",");
            self.series
                .lock()
                .expect("series lock should not be poisoned")
                .push(format!("{}{{{labels}}}", key.name()));
        }

        fn contains(&self, name: &str, label: &str) -> bool {
            self.series
                .lock()
                .expect("series lock should not be poisoned")
                .iter()
                .any(|entry| entry.starts_with(&format!("{name}{{")) && entry.contains(label))
        }
    }

    impl Recorder for SeriesRecorder {
        fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _text: SharedString) {}

        fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _text: SharedString) {}

        fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _text: SharedString) {}

        fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
            self.note(key);
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
            self.note(key);
            Gauge::noop()
        }

        fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
            self.note(key);
            Histogram::noop()
        }
    }

    fn global_series() -> &'static SeriesRecorder {
        static RECORDER: OnceLock<SeriesRecorder> = OnceLock::new();
        RECORDER.get_or_init(|| {
            let recorder = SeriesRecorder::default();
            metrics::set_global_recorder(recorder.clone())
                .expect("no other recorder should be installed in this test binary");
            recorder
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runtime_reports_model_calls_and_turns_as_metrics() {
        let series = global_series();
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let sessions: Arc<dyn SessionService> = Arc::new(InMemorySessionService::new());
        let factory = runner_factory(sessions)
            .with_model_clients(|_| Ok(Arc::new(FakeProvider) as Arc<dyn ModelProvider>));
        let runtime = build_runtime_with(
            keyed_config(dir.path()),
            Arc::new(InMemoryRecordStore::new()),
            factory,
        )
        .expect("runtime should build");

        let outcome = runtime
            .orchestrator
            .send_message("s-metrics", "hello", Arc::new(NoopTurnObserver))
            .await
            .expect("send should start a turn")
            .wait()
            .await
            .expect("turn should finish");
        assert_eq!(outcome.status, MessageStatus::Completed);

        assert!(series.contains(metric_names::TURNS, "outcome=started"));
        assert!(series.contains(metric_names::TURNS, "outcome=completed"));
        assert!(series.contains(metric_names::MODEL_CALLS, "provider=gemini"));
    }

    #[test]
    fn sqlite_runtime_creates_database_directory() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut config = keyed_config(dir.path());
        config.db_path = dir.path().join("data").join("axe-desktop.db");

        let runtime = build_runtime(config).expect("runtime should build");

        assert!(runtime.config.db_path.exists());
    }
}
