//! Drives runner event streams for one turn and translates them into observer callbacks.

use axcommon::SessionId;
use axstore::MessageRole;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::observer::{ToolCallEvent, TurnObserver};
use crate::runner::{ContentPart, RunConfig, Runner, StreamingMode, TurnEvent};
use crate::session::ChatFuture;

pub const CANCELLED_MARKER: &str = "\n[Cancelled]";
pub const NO_RESPONSE_NOTICE: &str = "No response received. Check the model name and API key.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Streaming,
    NonStreaming,
}

impl DeliveryMode {
    pub fn streaming_mode(self) -> StreamingMode {
        match self {
            Self::Streaming => StreamingMode::Sse,
            Self::NonStreaming => StreamingMode::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::NonStreaming => "non_streaming",
        }
    }
}

pub const DEFAULT_DELIVERY_MODES: [DeliveryMode; 2] =
    [DeliveryMode::Streaming, DeliveryMode::NonStreaming];

/// What one pass over a runner stream observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptReport {
    /// At least one non-empty text fragment arrived.
    pub got_content: bool,
    /// The attempt ended on a transport error or an error event.
    pub errored: bool,
    pub cancelled: bool,
    pub events: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered_by: Option<DeliveryMode>,
    pub cancelled: bool,
    pub attempts: Vec<(DeliveryMode, AttemptReport)>,
}

impl DeliveryOutcome {
    pub fn delivered(&self) -> bool {
        self.delivered_by.is_some()
    }

    /// The delivering attempt finished without an error.
    pub fn clean(&self) -> bool {
        match self.delivered_by {
            Some(mode) => self
                .attempts
                .iter()
                .rev()
                .find(|(attempted, _)| *attempted == mode)
                .is_some_and(|(_, report)| !report.errored),
            None => false,
        }
    }
}

/// Receives tool activity as it streams, independent of observer delivery.
pub trait ToolCallRecorder: Send + Sync {
    fn record<'a>(&'a self, event: &'a ToolCallEvent) -> ChatFuture<'a, ()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolCallRecorder;

impl ToolCallRecorder for NoopToolCallRecorder {
    fn record<'a>(&'a self, _event: &'a ToolCallEvent) -> ChatFuture<'a, ()> {
        Box::pin(async {})
    }
}

pub struct TurnPump<'a> {
    pub cancel: &'a CancellationToken,
    pub runner: &'a dyn Runner,
    pub session_id: &'a SessionId,
    pub observer: &'a dyn TurnObserver,
    pub recorder: &'a dyn ToolCallRecorder,
}

impl TurnPump<'_> {
    fn debug(&self, line: &str) {
        tracing::debug!(session_id = %self.session_id, "{line}");
        self.observer.on_debug(line);
    }

    /// Consumes one runner stream in `mode`, appending text to `buffer`.
    ///
    /// Cancellation is checked when each event arrives, before the event is handled. A cancelled
    /// stream is dropped without draining.
    pub async fn run_attempt(
        &self,
        user_content: &str,
        mode: DeliveryMode,
        buffer: &mut String,
    ) -> AttemptReport {
        let streaming_mode = mode.streaming_mode();
        self.debug(&format!("streaming_mode={}", streaming_mode.as_str()));

        let mut report = AttemptReport::default();
        let mut saw_content = false;
        let mut events = self.runner.run(
            self.session_id.clone(),
            user_content.to_string(),
            RunConfig { streaming_mode },
        );

        while let Some(item) = events.next().await {
            report.events += 1;

            if self.cancel.is_cancelled() {
                report.cancelled = true;
                self.emit_cancelled(buffer);
                break;
            }

            match item {
                Err(error) => {
                    report.errored = true;
                    self.observer
                        .on_message(MessageRole::System, &format!("Error: {error}"));
                    self.debug(&format!("error={error}"));
                    break;
                }
                Ok(TurnEvent::Error { code, message }) => {
                    report.errored = true;
                    self.observer
                        .on_message(MessageRole::System, &format!("Error: {code} - {message}"));
                    self.debug(&format!("error={code} message={message}"));
                    break;
                }
                Ok(TurnEvent::Done) => {}
                Ok(TurnEvent::Content(parts)) => {
                    if !saw_content {
                        saw_content = true;
                        self.debug("content=present");
                    }

                    for part in parts {
                        self.deliver_part(part, buffer, &mut report).await;
                    }
                }
            }
        }

        if report.events == 0 {
            self.debug("runner returned 0 events");
        }

        report
    }

    fn emit_cancelled(&self, buffer: &str) {
        self.observer
            .on_message(MessageRole::Assistant, &format!("{buffer}{CANCELLED_MARKER}"));
        self.debug("cancelled");
    }

    async fn deliver_part(&self, part: ContentPart, buffer: &mut String, report: &mut AttemptReport) {
        match part {
            ContentPart::Text(text) => {
                if text.is_empty() {
                    return;
                }
                buffer.push_str(&text);
                report.got_content = true;
                self.observer.on_message(MessageRole::Assistant, buffer.as_str());
            }
            ContentPart::FunctionCall { id, name, args } => {
                let event = ToolCallEvent::call(id, name, args);
                self.observer.on_tool_call(&event);
                self.recorder.record(&event).await;
                self.debug(&format!("tool_call={}", event.name));
            }
            ContentPart::FunctionResponse {
                id,
                name,
                response,
                error,
            } => {
                let event = ToolCallEvent::response(id, name, response, error);
                self.observer.on_tool_call(&event);
                self.recorder.record(&event).await;
                self.debug(&format!("tool_response={}", event.name));
            }
        }
    }

    /// Tries each mode in order until one delivers text or the turn is cancelled.
    ///
    /// No further mode is started once the turn is cancelled.
    pub async fn deliver_with_fallback(
        &self,
        user_content: &str,
        modes: &[DeliveryMode],
        buffer: &mut String,
    ) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();

        for &mode in modes {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                self.emit_cancelled(buffer);
                break;
            }

            let report = self.run_attempt(user_content, mode, buffer).await;
            let cancelled = report.cancelled;
            let got_content = report.got_content;
            outcome.attempts.push((mode, report));

            if cancelled {
                outcome.cancelled = true;
                break;
            }

            if got_content {
                outcome.delivered_by = Some(mode);
                break;
            }
        }

        if !outcome.delivered() && !outcome.cancelled {
            self.observer
                .on_message(MessageRole::System, NO_RESPONSE_NOTICE);
            self.debug("no_response");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axstore::JsonMap;
    use futures_util::stream;

    use super::*;
    use crate::ChatError;
    use crate::runner::TurnEventStream;

    /// Replies per streaming mode from fixed scripts.
    struct ScriptedRunner {
        streaming: Vec<Result<TurnEvent, ChatError>>,
        non_streaming: Vec<Result<TurnEvent, ChatError>>,
        runs: Mutex<Vec<StreamingMode>>,
    }

    impl Runner for ScriptedRunner {
        fn run(
            &self,
            _session_id: SessionId,
            _user_content: String,
            config: RunConfig,
        ) -> TurnEventStream<'_> {
            self.runs.lock().expect("runs lock").push(config.streaming_mode);
            let events = match config.streaming_mode {
                StreamingMode::Sse => self.streaming.clone(),
                StreamingMode::None => self.non_streaming.clone(),
            };
            Box::pin(stream::iter(events))
        }
    }

    #[derive(Default)]
    struct Captured {
        messages: Mutex<Vec<(MessageRole, String)>>,
        debug: Mutex<Vec<String>>,
        tools: Mutex<Vec<ToolCallEvent>>,
    }

    impl TurnObserver for Captured {
        fn on_message(&self, role: MessageRole, content: &str) {
            self.messages
                .lock()
                .expect("messages lock")
                .push((role, content.to_string()));
        }

        fn on_tool_call(&self, event: &ToolCallEvent) {
            self.tools.lock().expect("tools lock").push(event.clone());
        }

        fn on_debug(&self, line: &str) {
            self.debug.lock().expect("debug lock").push(line.to_string());
        }
    }

    fn runner(
        streaming: Vec<Result<TurnEvent, ChatError>>,
        non_streaming: Vec<Result<TurnEvent, ChatError>>,
    ) -> ScriptedRunner {
        ScriptedRunner {
            streaming,
            non_streaming,
            runs: Mutex::new(Vec::new()),
        }
    }

    async fn deliver(
        runner: &ScriptedRunner,
        observer: &Captured,
        cancel: &CancellationToken,
    ) -> (DeliveryOutcome, String) {
        let session_id = SessionId::new("s-1");
        let pump = TurnPump {
            cancel,
            runner,
            session_id: &session_id,
            observer,
            recorder: &NoopToolCallRecorder,
        };
        let mut buffer = String::new();
        let outcome = pump
            .deliver_with_fallback("hello", &DEFAULT_DELIVERY_MODES, &mut buffer)
            .await;
        (outcome, buffer)
    }

    #[tokio::test]
    async fn streaming_text_is_re_emitted_as_growing_prefixes() {
        let runner = runner(
            vec![
                Ok(TurnEvent::text("Hi")),
                Ok(TurnEvent::text(" there")),
                Ok(TurnEvent::Done),
            ],
            Vec::new(),
        );
        let observer = Captured::default();

        let (outcome, buffer) = deliver(&runner, &observer, &CancellationToken::new()).await;

        assert_eq!(buffer, "Hi there");
        assert_eq!(outcome.delivered_by, Some(DeliveryMode::Streaming));
        assert!(outcome.clean());
        assert_eq!(
            *observer.messages.lock().expect("messages lock"),
            vec![
                (MessageRole::Assistant, "Hi".to_string()),
                (MessageRole::Assistant, "Hi there".to_string()),
            ]
        );
        assert_eq!(*runner.runs.lock().expect("runs lock"), vec![StreamingMode::Sse]);

        let debug = observer.debug.lock().expect("debug lock");
        assert_eq!(debug[0], "streaming_mode=sse");
        assert_eq!(debug.iter().filter(|line| *line == "content=present").count(), 1);
    }

    #[tokio::test]
    async fn empty_streaming_falls_back_to_non_streaming_once() {
        let runner = runner(Vec::new(), vec![Ok(TurnEvent::text("OK"))]);
        let observer = Captured::default();

        let (outcome, buffer) = deliver(&runner, &observer, &CancellationToken::new()).await;

        assert_eq!(buffer, "OK");
        assert_eq!(outcome.delivered_by, Some(DeliveryMode::NonStreaming));
        assert_eq!(
            *runner.runs.lock().expect("runs lock"),
            vec![StreamingMode::Sse, StreamingMode::None]
        );
        assert!(
            observer
                .debug
                .lock()
                .expect("debug lock")
                .contains(&"runner returned 0 events".to_string())
        );
        assert!(
            !observer
                .messages
                .lock()
                .expect("messages lock")
                .iter()
                .any(|(_, content)| content == NO_RESPONSE_NOTICE)
        );
    }

    #[tokio::test]
    async fn no_text_from_either_mode_emits_the_notice() {
        let runner = runner(vec![Ok(TurnEvent::Done)], vec![Ok(TurnEvent::Done)]);
        let observer = Captured::default();

        let (outcome, buffer) = deliver(&runner, &observer, &CancellationToken::new()).await;

        assert!(!outcome.delivered());
        assert!(buffer.is_empty());
        assert_eq!(
            observer.messages.lock().expect("messages lock").last(),
            Some(&(MessageRole::System, NO_RESPONSE_NOTICE.to_string()))
        );
        assert!(
            observer
                .debug
                .lock()
                .expect("debug lock")
                .contains(&"no_response".to_string())
        );
    }

    #[tokio::test]
    async fn errors_after_content_end_the_attempt_without_fallback() {
        let runner = runner(
            vec![
                Ok(TurnEvent::text("Partial")),
                Err(ChatError::provider("Protocol: stream reset")),
                Ok(TurnEvent::text(" never seen")),
            ],
            vec![Ok(TurnEvent::text("unused"))],
        );
        let observer = Captured::default();

        let (outcome, buffer) = deliver(&runner, &observer, &CancellationToken::new()).await;

        assert_eq!(buffer, "Partial");
        assert_eq!(outcome.delivered_by, Some(DeliveryMode::Streaming));
        assert!(!outcome.clean());
        let messages = observer.messages.lock().expect("messages lock");
        assert_eq!(messages[1].0, MessageRole::System);
        assert!(messages[1].1.starts_with("Error: "));
        assert_eq!(runner.runs.lock().expect("runs lock").len(), 1);
    }

    #[tokio::test]
    async fn error_events_surface_code_and_message() {
        let runner = runner(
            vec![Ok(TurnEvent::error("CONTENT_FILTERED", "blocked"))],
            vec![Ok(TurnEvent::text("fallback"))],
        );
        let observer = Captured::default();

        let (outcome, _) = deliver(&runner, &observer, &CancellationToken::new()).await;

        assert_eq!(outcome.delivered_by, Some(DeliveryMode::NonStreaming));
        assert_eq!(
            observer.messages.lock().expect("messages lock")[0],
            (
                MessageRole::System,
                "Error: CONTENT_FILTERED - blocked".to_string()
            )
        );
    }

    #[tokio::test]
    async fn cancelled_turns_emit_partial_text_with_marker() {
        let runner = runner(vec![Ok(TurnEvent::text("ignored"))], Vec::new());
        let observer = Captured::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (outcome, buffer) = deliver(&runner, &observer, &cancel).await;

        assert!(outcome.cancelled);
        assert!(buffer.is_empty());
        assert!(outcome.attempts.is_empty());
        assert!(runner.runs.lock().expect("runs lock").is_empty());
        assert_eq!(
            *observer.messages.lock().expect("messages lock"),
            vec![(MessageRole::Assistant, CANCELLED_MARKER.to_string())]
        );
    }

    #[tokio::test]
    async fn cancellation_during_a_silent_attempt_skips_the_fallback() {
        /// Cancels the turn from inside the streaming attempt, then ends without events.
        struct CancellingRunner {
            cancel: CancellationToken,
            runs: Mutex<Vec<StreamingMode>>,
        }

        impl Runner for CancellingRunner {
            fn run(
                &self,
                _session_id: SessionId,
                _user_content: String,
                config: RunConfig,
            ) -> TurnEventStream<'_> {
                self.runs.lock().expect("runs lock").push(config.streaming_mode);
                self.cancel.cancel();
                Box::pin(stream::iter(Vec::<Result<TurnEvent, ChatError>>::new()))
            }
        }

        let cancel = CancellationToken::new();
        let runner = CancellingRunner {
            cancel: cancel.clone(),
            runs: Mutex::new(Vec::new()),
        };
        let observer = Captured::default();
        let session_id = SessionId::new("s-1");
        let pump = TurnPump {
            cancel: &cancel,
            runner: &runner,
            session_id: &session_id,
            observer: &observer,
            recorder: &NoopToolCallRecorder,
        };

        let mut buffer = String::new();
        let outcome = pump
            .deliver_with_fallback("hello", &DEFAULT_DELIVERY_MODES, &mut buffer)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(*runner.runs.lock().expect("runs lock"), vec![StreamingMode::Sse]);
        let messages = observer.messages.lock().expect("messages lock");
        assert_eq!(
            *messages,
            vec![(MessageRole::Assistant, CANCELLED_MARKER.to_string())]
        );
    }

    #[tokio::test]
    async fn tool_parts_reach_observer_and_recorder() {
        struct Recorder(Mutex<Vec<String>>);

        impl ToolCallRecorder for Recorder {
            fn record<'a>(&'a self, event: &'a ToolCallEvent) -> ChatFuture<'a, ()> {
                Box::pin(async move {
                    let kind = if event.is_response() { "response" } else { "call" };
                    self.0
                        .lock()
                        .expect("recorder lock")
                        .push(format!("{kind}:{}", event.name));
                })
            }
        }

        let mut args = JsonMap::new();
        args.insert("query".to_string(), "rust".into());
        let runner = runner(
            vec![
                Ok(TurnEvent::Content(vec![ContentPart::FunctionCall {
                    id: "c-1".to_string(),
                    name: "web_search".to_string(),
                    args,
                }])),
                Ok(TurnEvent::Content(vec![ContentPart::FunctionResponse {
                    id: "c-1".to_string(),
                    name: "web_search".to_string(),
                    response: JsonMap::new(),
                    error: Some("rate limited".to_string()),
                }])),
                Ok(TurnEvent::text("Done searching")),
            ],
            Vec::new(),
        );
        let observer = Captured::default();
        let recorder = Recorder(Mutex::new(Vec::new()));
        let session_id = SessionId::new("s-1");
        let cancel = CancellationToken::new();
        let pump = TurnPump {
            cancel: &cancel,
            runner: &runner,
            session_id: &session_id,
            observer: &observer,
            recorder: &recorder,
        };

        let mut buffer = String::new();
        let report = pump
            .run_attempt("search", DeliveryMode::Streaming, &mut buffer)
            .await;

        assert!(report.got_content);
        assert_eq!(report.events, 3);
        assert_eq!(
            *recorder.0.lock().expect("recorder lock"),
            vec!["call:web_search".to_string(), "response:web_search".to_string()]
        );
        let tools = observer.tools.lock().expect("tools lock");
        assert_eq!(tools[0].args.as_ref().map(|args| args["query"].clone()), Some("rust".into()));
        assert_eq!(tools[1].error.as_deref(), Some("rate limited"));

        let debug = observer.debug.lock().expect("debug lock");
        assert!(debug.contains(&"tool_call=web_search".to_string()));
        assert!(debug.contains(&"tool_response=web_search".to_string()));
    }
}
