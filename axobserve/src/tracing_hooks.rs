//! Log lines for model calls, tool runs, and chat turns through `tracing`.
//!
//! ```rust
//! use axobserve::TracingObservabilityHooks;
//! use axprovider::ProviderOperationHooks;
//!
//! fn accepts_provider_hooks(_hooks: &dyn ProviderOperationHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_provider_hooks(&hooks);
//! ```

use std::time::Duration;

use axchat::{ChatError, TurnLifecycleHooks};
use axcommon::{SessionId, TurnId};
use axprovider::{ProviderError, ProviderKind, ProviderOperationHooks, ToolCall};
use axstore::MessageStatus;
use axtooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn turn_of(context: &ToolExecutionContext) -> &str {
    context.turn_id.as_ref().map_or("-", |id| id.as_str())
}

impl ProviderOperationHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, provider: ProviderKind, operation: &str, attempt: u32) {
        tracing::debug!(%provider, operation, attempt, "model call started");
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        tracing::warn!(
            %provider,
            operation,
            attempt,
            retry_in_ms = millis(delay),
            kind = ?error.kind,
            "model call failed, retrying: {error}"
        );
    }

    fn on_success(&self, provider: ProviderKind, operation: &str, attempts: u32) {
        if attempts > 1 {
            tracing::info!(%provider, operation, attempts, "model call succeeded after retries");
        } else {
            tracing::debug!(%provider, operation, "model call succeeded");
        }
    }

    fn on_failure(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempts: u32,
        error: &ProviderError,
    ) {
        tracing::error!(
            %provider,
            operation,
            attempts,
            kind = ?error.kind,
            retryable = error.retryable,
            "model call gave up: {error}"
        );
    }
}

impl ToolRuntimeHooks for TracingObservabilityHooks {
    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        tracing::info!(
            session = %context.session_id,
            turn = turn_of(context),
            tool = %tool_call.name,
            call = %tool_call.id,
            "running tool"
        );
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        tracing::info!(
            session = %context.session_id,
            turn = turn_of(context),
            tool = %tool_call.name,
            call = %tool_call.id,
            output_bytes = result.output.len(),
            elapsed_ms = millis(elapsed),
            "tool finished"
        );
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        tracing::warn!(
            session = %context.session_id,
            turn = turn_of(context),
            tool = %tool_call.name,
            call = %tool_call.id,
            kind = ?error.kind,
            elapsed_ms = millis(elapsed),
            "tool failed: {error}"
        );
    }
}

impl TurnLifecycleHooks for TracingObservabilityHooks {
    fn on_turn_start(&self, session_id: &SessionId, turn_id: &TurnId) {
        tracing::info!(session = %session_id, turn = %turn_id, "turn started");
    }

    fn on_turn_complete(
        &self,
        session_id: &SessionId,
        turn_id: &TurnId,
        status: MessageStatus,
        elapsed: Duration,
    ) {
        tracing::info!(
            session = %session_id,
            turn = %turn_id,
            status = status.as_str(),
            elapsed_ms = millis(elapsed),
            "turn finished"
        );
    }

    fn on_turn_failure(&self, session_id: &SessionId, turn_id: &TurnId, error: &ChatError) {
        tracing::error!(
            session = %session_id,
            turn = %turn_id,
            kind = ?error.kind,
            "turn could not run: {error}"
        );
    }
}
