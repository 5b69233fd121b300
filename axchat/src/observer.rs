//! Presentation callbacks for one turn.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use axchat::{FnTurnObserver, TurnObserver};
//! use axstore::MessageRole;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let observer = FnTurnObserver::new().on_message(move |role, content| {
//!     sink.lock().expect("sink lock").push(format!("{role}:{content}"));
//! });
//!
//! TurnObserver::on_message(&observer, MessageRole::Assistant, "Hi");
//! assert_eq!(*seen.lock().expect("seen lock"), vec!["assistant:Hi".to_string()]);
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use axstore::{JsonMap, MessageRole};

/// A tool invocation or its outcome, as surfaced to the presentation layer.
///
/// Calls carry `args`; responses carry `result` and, when the tool failed, `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallEvent {
    pub call_id: String,
    pub name: String,
    pub args: Option<JsonMap>,
    pub result: Option<JsonMap>,
    pub error: Option<String>,
}

impl ToolCallEvent {
    pub fn call(call_id: impl Into<String>, name: impl Into<String>, args: JsonMap) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args: Some(args),
            result: None,
            error: None,
        }
    }

    pub fn response(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: JsonMap,
        error: Option<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args: None,
            result: Some(result),
            error,
        }
    }

    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }
}

/// Receives turn output. Callbacks run on the turn task and must not block.
///
/// `on_message` always carries the full content so far, never a delta.
pub trait TurnObserver: Send + Sync {
    fn on_message(&self, _role: MessageRole, _content: &str) {}

    fn on_tool_call(&self, _event: &ToolCallEvent) {}

    fn on_debug(&self, _line: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTurnObserver;

impl TurnObserver for NoopTurnObserver {}

type MessageCallback = dyn Fn(MessageRole, &str) + Send + Sync;
type ToolCallCallback = dyn Fn(&ToolCallEvent) + Send + Sync;
type DebugCallback = dyn Fn(&str) + Send + Sync;

/// Closure-backed observer; unset callbacks are ignored.
#[derive(Default)]
pub struct FnTurnObserver {
    message: Option<Box<MessageCallback>>,
    tool_call: Option<Box<ToolCallCallback>>,
    debug: Option<Box<DebugCallback>>,
}

impl FnTurnObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(MessageRole, &str) + Send + Sync + 'static,
    {
        self.message = Some(Box::new(callback));
        self
    }

    pub fn on_tool_call<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ToolCallEvent) + Send + Sync + 'static,
    {
        self.tool_call = Some(Box::new(callback));
        self
    }

    pub fn on_debug<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.debug = Some(Box::new(callback));
        self
    }
}

impl TurnObserver for FnTurnObserver {
    fn on_message(&self, role: MessageRole, content: &str) {
        if let Some(callback) = &self.message {
            callback(role, content);
        }
    }

    fn on_tool_call(&self, event: &ToolCallEvent) {
        if let Some(callback) = &self.tool_call {
            callback(event);
        }
    }

    fn on_debug(&self, line: &str) {
        if let Some(callback) = &self.debug {
            callback(line);
        }
    }
}

/// Swallows observer panics so turn cleanup always runs.
#[derive(Clone)]
pub struct SafeTurnObserver {
    inner: Arc<dyn TurnObserver>,
}

impl SafeTurnObserver {
    pub fn new(inner: Arc<dyn TurnObserver>) -> Self {
        Self { inner }
    }
}

impl TurnObserver for SafeTurnObserver {
    fn on_message(&self, role: MessageRole, content: &str) {
        if catch_unwind(AssertUnwindSafe(|| self.inner.on_message(role, content))).is_err() {
            tracing::warn!(callback = "on_message", "turn observer panicked");
        }
    }

    fn on_tool_call(&self, event: &ToolCallEvent) {
        if catch_unwind(AssertUnwindSafe(|| self.inner.on_tool_call(event))).is_err() {
            tracing::warn!(callback = "on_tool_call", "turn observer panicked");
        }
    }

    fn on_debug(&self, line: &str) {
        if catch_unwind(AssertUnwindSafe(|| self.inner.on_debug(line))).is_err() {
            tracing::warn!(callback = "on_debug", "turn observer panicked");
        }
    }
}
