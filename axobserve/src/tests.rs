use std::sync::{Arc, Mutex};
use std::time::Duration;

use axchat::{ChatError, TurnLifecycleHooks};
use axcommon::{SessionId, TurnId};
use axprovider::{ProviderError, ProviderKind, ProviderOperationHooks, ToolCall};
use axstore::MessageStatus;
use axtooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};

use crate::{
    FanoutHooks, MetricsObservabilityHooks, SafeHooks, TracingObservabilityHooks, metric_names,
    standard_hooks,
};

fn sample_tool_call() -> ToolCall {
    ToolCall {
        id: "call-1".to_string(),
        name: "web_search_exa".to_string(),
        arguments: r#"{"query":"rust"}"#.to_string(),
    }
}

fn sample_tool_context() -> ToolExecutionContext {
    ToolExecutionContext::new("session-1").with_turn_id("turn-1")
}

fn sample_tool_result() -> ToolExecutionResult {
    ToolExecutionResult::from_call(&sample_tool_call(), "3 results")
}

fn session() -> SessionId {
    SessionId::from("session-1")
}

fn turn() -> TurnId {
    TurnId::from("turn-1")
}

fn exercise_provider_hooks(hooks: &dyn ProviderOperationHooks) {
    let provider_error = ProviderError::timeout("provider timeout");

    hooks.on_attempt_start(ProviderKind::Gemini, "stream", 1);
    hooks.on_retry_scheduled(
        ProviderKind::Gemini,
        "stream",
        1,
        Duration::from_millis(10),
        &provider_error,
    );
    hooks.on_success(ProviderKind::Gemini, "stream", 2);
    hooks.on_failure(ProviderKind::OpenAi, "complete", 2, &provider_error);
}

fn exercise_tool_hooks(hooks: &dyn ToolRuntimeHooks) {
    let tool_error = ToolError::execution("tool failed");

    hooks.on_execution_start(&sample_tool_call(), &sample_tool_context());
    hooks.on_execution_success(
        &sample_tool_call(),
        &sample_tool_context(),
        &sample_tool_result(),
        Duration::from_millis(20),
    );
    hooks.on_execution_failure(
        &sample_tool_call(),
        &sample_tool_context(),
        &tool_error,
        Duration::from_millis(20),
    );
}

fn exercise_turn_hooks(hooks: &dyn TurnLifecycleHooks) {
    hooks.on_turn_start(&session(), &turn());
    hooks.on_turn_complete(
        &session(),
        &turn(),
        MessageStatus::Cancelled,
        Duration::from_millis(30),
    );
    hooks.on_turn_failure(&session(), &turn(), &ChatError::store("disk full"));
}

#[test]
fn tracing_hooks_smoke_test_all_callbacks() {
    let hooks = TracingObservabilityHooks;

    exercise_provider_hooks(&hooks);
    exercise_tool_hooks(&hooks);
    exercise_turn_hooks(&hooks);
}

#[test]
fn metrics_hooks_smoke_test_all_callbacks() {
    let hooks = MetricsObservabilityHooks;

    exercise_provider_hooks(&hooks);
    exercise_tool_hooks(&hooks);
    exercise_turn_hooks(&hooks);
}

#[derive(Default, Clone)]
struct Recording {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl Recording {
    fn push(&self, event: &'static str) {
        self.events.lock().expect("events lock").push(event);
    }

    fn events(&self) -> Vec<&'static str> {
        self.events.lock().expect("events lock").clone()
    }
}

impl ProviderOperationHooks for Recording {
    fn on_attempt_start(&self, _provider: ProviderKind, _operation: &str, _attempt: u32) {
        self.push("attempt_start");
    }

    fn on_retry_scheduled(
        &self,
        _provider: ProviderKind,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
        self.push("retry_scheduled");
    }

    fn on_success(&self, _provider: ProviderKind, _operation: &str, _attempts: u32) {
        self.push("success");
    }

    fn on_failure(
        &self,
        _provider: ProviderKind,
        _operation: &str,
        _attempts: u32,
        _error: &ProviderError,
    ) {
        self.push("failure");
    }
}

impl ToolRuntimeHooks for Recording {
    fn on_execution_start(&self, _tool_call: &ToolCall, _context: &ToolExecutionContext) {
        self.push("tool_start");
    }

    fn on_execution_success(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        _elapsed: Duration,
    ) {
        self.push("tool_success");
    }

    fn on_execution_failure(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _error: &ToolError,
        _elapsed: Duration,
    ) {
        self.push("tool_failure");
    }
}

impl TurnLifecycleHooks for Recording {
    fn on_turn_start(&self, _session_id: &SessionId, _turn_id: &TurnId) {
        self.push("turn_start");
    }

    fn on_turn_complete(
        &self,
        _session_id: &SessionId,
        _turn_id: &TurnId,
        _status: MessageStatus,
        _elapsed: Duration,
    ) {
        self.push("turn_complete");
    }

    fn on_turn_failure(&self, _session_id: &SessionId, _turn_id: &TurnId, _error: &ChatError) {
        self.push("turn_failure");
    }
}

struct Panicking;

impl ProviderOperationHooks for Panicking {
    fn on_attempt_start(&self, _provider: ProviderKind, _operation: &str, _attempt: u32) {
        panic!("attempt_start panic");
    }

    fn on_retry_scheduled(
        &self,
        _provider: ProviderKind,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &ProviderError,
    ) {
        panic!("retry_scheduled panic");
    }

    fn on_success(&self, _provider: ProviderKind, _operation: &str, _attempts: u32) {
        panic!("success panic");
    }

    fn on_failure(
        &self,
        _provider: ProviderKind,
        _operation: &str,
        _attempts: u32,
        _error: &ProviderError,
    ) {
        panic!("failure panic");
    }
}

impl ToolRuntimeHooks for Panicking {
    fn on_execution_start(&self, _tool_call: &ToolCall, _context: &ToolExecutionContext) {
        panic!("start panic");
    }

    fn on_execution_success(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        _elapsed: Duration,
    ) {
        panic!("success panic");
    }

    fn on_execution_failure(
        &self,
        _tool_call: &ToolCall,
        _context: &ToolExecutionContext,
        _error: &ToolError,
        _elapsed: Duration,
    ) {
        panic!("failure panic");
    }
}

impl TurnLifecycleHooks for Panicking {
    fn on_turn_start(&self, _session_id: &SessionId, _turn_id: &TurnId) {
        panic!("turn start panic");
    }

    fn on_turn_complete(
        &self,
        _session_id: &SessionId,
        _turn_id: &TurnId,
        _status: MessageStatus,
        _elapsed: Duration,
    ) {
        panic!("turn complete panic");
    }

    fn on_turn_failure(&self, _session_id: &SessionId, _turn_id: &TurnId, _error: &ChatError) {
        panic!("turn failure panic");
    }
}

#[test]
fn safe_hooks_forward_every_callback_in_order() {
    let inner = Recording::default();
    let hooks = SafeHooks::new(inner.clone());

    exercise_provider_hooks(&hooks);
    exercise_tool_hooks(&hooks);
    exercise_turn_hooks(&hooks);

    assert_eq!(
        inner.events(),
        vec![
            "attempt_start",
            "retry_scheduled",
            "success",
            "failure",
            "tool_start",
            "tool_success",
            "tool_failure",
            "turn_start",
            "turn_complete",
            "turn_failure",
        ]
    );
}

#[test]
fn safe_hooks_swallow_panics() {
    let hooks = SafeHooks::new(Panicking);

    exercise_provider_hooks(&hooks);
    exercise_tool_hooks(&hooks);
    exercise_turn_hooks(&hooks);
}

#[test]
fn fanout_reaches_both_sinks_first_then_second() {
    let first = Recording::default();
    let second = Recording::default();
    let hooks = FanoutHooks::new(first.clone(), second.clone());

    exercise_turn_hooks(&hooks);
    exercise_tool_hooks(&hooks);

    let expected = vec![
        "turn_start",
        "turn_complete",
        "turn_failure",
        "tool_start",
        "tool_success",
        "tool_failure",
    ];
    assert_eq!(first.events(), expected);
    assert_eq!(second.events(), expected);
}

#[test]
fn panic_in_a_guarded_sink_does_not_escape_to_the_caller() {
    let recording = Recording::default();
    let hooks = FanoutHooks::new(recording.clone(), SafeHooks::new(Panicking));

    exercise_provider_hooks(&hooks);

    assert_eq!(
        recording.events(),
        vec!["attempt_start", "retry_scheduled", "success", "failure"]
    );
}

/// Records `name{label=value,..}` for every series a hook touches.
#[derive(Default)]
struct SeriesRecorder {
    series: Mutex<Vec<String>>,
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

    fn series(&self) -> Vec<String> {
        self.series
            .lock()
            .expect("series lock should not be poisoned")
            .clone()
    }
}

impl Recorder for SeriesRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {
    }

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

#[test]
fn model_call_metrics_carry_an_outcome_label() {
    let recorder = SeriesRecorder::default();

    metrics::with_local_recorder(&recorder, || {
        exercise_provider_hooks(&MetricsObservabilityHooks);
    });

    let series = recorder.series();
    assert!(series.contains(&format!(
        "{}{{provider=gemini,operation=stream,outcome=retry}}",
        metric_names::MODEL_CALLS
    )));
    assert!(series.contains(&format!(
        "{}{{provider=gemini,operation=stream,outcome=ok}}",
        metric_names::MODEL_CALLS
    )));
    assert!(series.contains(&format!(
        "{}{{provider=openai,operation=complete,outcome=error}}",
        metric_names::MODEL_CALL_ATTEMPTS
    )));
    assert!(
        !series.iter().any(|entry| entry.contains("outcome=started")),
        "attempt starts should not be counted as model calls: {series:?}"
    );
}

#[test]
fn turn_and_tool_metrics_use_status_and_tool_name() {
    let recorder = SeriesRecorder::default();

    metrics::with_local_recorder(&recorder, || {
        exercise_tool_hooks(&MetricsObservabilityHooks);
        exercise_turn_hooks(&MetricsObservabilityHooks);
    });

    let series = recorder.series();
    for expected in [
        format!("{}{{tool=web_search_exa,outcome=started}}", metric_names::TOOL_CALLS),
        format!("{}{{tool=web_search_exa,outcome=error}}", metric_names::TOOL_CALL_SECONDS),
        format!("{}{{outcome=started}}", metric_names::TURNS),
        format!("{}{{outcome=cancelled}}", metric_names::TURN_SECONDS),
        format!("{}{{outcome=unsaved}}", metric_names::TURNS),
    ] {
        assert!(series.contains(&expected), "missing {expected} in {series:?}");
    }
}

#[test]
fn standard_hooks_drive_tracing_and_metrics_together() {
    let recorder = SeriesRecorder::default();
    let hooks = standard_hooks();

    metrics::with_local_recorder(&recorder, || {
        exercise_provider_hooks(&hooks);
        exercise_tool_hooks(&hooks);
        exercise_turn_hooks(&hooks);
    });

    assert!(
        recorder
            .series()
            .iter()
            .any(|entry| entry.starts_with(metric_names::TURNS)),
        "standard hooks should emit turn metrics"
    );
}
