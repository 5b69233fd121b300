//! Counters and histograms through the `metrics` facade; install any recorder to collect them.
//!
//! Every series carries an `outcome` label instead of one series per result:
//!
//! | metric | labels |
//! |---|---|
//! | [`names::MODEL_CALLS`] | `provider`, `operation`, `outcome` = `ok` / `retry` / `error` |
//! | [`names::MODEL_CALL_ATTEMPTS`] | `provider`, `operation`, `outcome` |
//! | [`names::TOOL_CALLS`] | `tool`, `outcome` = `started` / `ok` / `error` |
//! | [`names::TOOL_CALL_SECONDS`] | `tool`, `outcome` |
//! | [`names::TURNS`] | `outcome` = `started`, a message status, or `unsaved` |
//! | [`names::TURN_SECONDS`] | `outcome` |
//!
//! ```rust
//! use axchat::TurnLifecycleHooks;
//! use axobserve::MetricsObservabilityHooks;
//!
//! fn accepts_turn_hooks(_hooks: &dyn TurnLifecycleHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_turn_hooks(&hooks);
//! ```

use std::time::Duration;

use axchat::{ChatError, TurnLifecycleHooks};
use axcommon::{SessionId, TurnId};
use axprovider::{ProviderError, ProviderKind, ProviderOperationHooks, ToolCall};
use axstore::MessageStatus;
use axtooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};

pub mod names {
    pub const MODEL_CALLS: &str = "axe_model_calls_total";
    pub const MODEL_CALL_ATTEMPTS: &str = "axe_model_call_attempts";
    pub const MODEL_RETRY_DELAY_SECONDS: &str = "axe_model_retry_delay_seconds";
    pub const TOOL_CALLS: &str = "axe_tool_calls_total";
    pub const TOOL_CALL_SECONDS: &str = "axe_tool_call_seconds";
    pub const TURNS: &str = "axe_turns_total";
    pub const TURN_SECONDS: &str = "axe_turn_seconds";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

fn model_call(provider: ProviderKind, operation: &str, outcome: &'static str) {
    metrics::counter!(
        names::MODEL_CALLS,
        "provider" => provider.to_string(),
        "operation" => operation.to_owned(),
        "outcome" => outcome
    )
    .increment(1);
}

fn model_attempts(provider: ProviderKind, operation: &str, outcome: &'static str, attempts: u32) {
    metrics::histogram!(
        names::MODEL_CALL_ATTEMPTS,
        "provider" => provider.to_string(),
        "operation" => operation.to_owned(),
        "outcome" => outcome
    )
    .record(f64::from(attempts));
}

fn record_tool_call(name: &str, outcome: &'static str, elapsed: Option<Duration>) {
    metrics::counter!(names::TOOL_CALLS, "tool" => name.to_owned(), "outcome" => outcome)
        .increment(1);
    if let Some(elapsed) = elapsed {
        metrics::histogram!(
            names::TOOL_CALL_SECONDS,
            "tool" => name.to_owned(),
            "outcome" => outcome
        )
        .record(elapsed.as_secs_f64());
    }
}

impl ProviderOperationHooks for MetricsObservabilityHooks {
    fn on_retry_scheduled(
        &self,
        provider: ProviderKind,
        operation: &str,
        _attempt: u32,
        delay: Duration,
        _error: &ProviderError,
    ) {
        model_call(provider, operation, "retry");
        metrics::histogram!(
            names::MODEL_RETRY_DELAY_SECONDS,
            "provider" => provider.to_string()
        )
        .record(delay.as_secs_f64());
    }

    fn on_success(&self, provider: ProviderKind, operation: &str, attempts: u32) {
        model_call(provider, operation, "ok");
        model_attempts(provider, operation, "ok", attempts);
    }

    fn on_failure(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempts: u32,
        _error: &ProviderError,
    ) {
        model_call(provider, operation, "error");
        model_attempts(provider, operation, "error", attempts);
    }
}

impl ToolRuntimeHooks for MetricsObservabilityHooks {
    fn on_execution_start(&self, call: &ToolCall, _context: &ToolExecutionContext) {
        record_tool_call(&call.name, "started", None);
    }

    fn on_execution_success(
        &self,
        call: &ToolCall,
        _context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        record_tool_call(&call.name, "ok", Some(elapsed));
    }

    fn on_execution_failure(
        &self,
        call: &ToolCall,
        _context: &ToolExecutionContext,
        _error: &ToolError,
        elapsed: Duration,
    ) {
        record_tool_call(&call.name, "error", Some(elapsed));
    }
}

impl TurnLifecycleHooks for MetricsObservabilityHooks {
    fn on_turn_start(&self, _session_id: &SessionId, _turn_id: &TurnId) {
        metrics::counter!(names::TURNS, "outcome" => "started").increment(1);
    }

    fn on_turn_complete(
        &self,
        _session_id: &SessionId,
        _turn_id: &TurnId,
        status: MessageStatus,
        elapsed: Duration,
    ) {
        metrics::counter!(names::TURNS, "outcome" => status.as_str()).increment(1);
        metrics::histogram!(names::TURN_SECONDS, "outcome" => status.as_str())
            .record(elapsed.as_secs_f64());
    }

    fn on_turn_failure(&self, _session_id: &SessionId, _turn_id: &TurnId, _error: &ChatError) {
        metrics::counter!(names::TURNS, "outcome" => "unsaved").increment(1);
    }
}
