use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use axchat::{ChatError, TurnLifecycleHooks};
use axcommon::{SessionId, TurnId};
use axprovider::{ProviderError, ProviderKind, ProviderOperationHooks, ToolCall};
use axstore::MessageStatus;
use axtooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};

/// Runs every callback of `H` behind `catch_unwind`; a panicking hook is logged and skipped.
///
/// Provider and tool hooks run inside model retries and tool calls, turn hooks on the turn task.
/// None of them may abort the work they observe.
#[derive(Debug, Clone, Default)]
pub struct SafeHooks<H> {
    inner: H,
}

impl<H> SafeHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

fn guarded(callback: &'static str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        tracing::warn!(callback, "observability hook panicked");
    }
}

impl<H: ProviderOperationHooks> ProviderOperationHooks for SafeHooks<H> {
    fn on_attempt_start(&self, provider: ProviderKind, operation: &str, attempt: u32) {
        guarded("provider.attempt_start", || {
            self.inner.on_attempt_start(provider, operation, attempt)
        });
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        guarded("provider.retry_scheduled", || {
            self.inner
                .on_retry_scheduled(provider, operation, attempt, delay, error)
        });
    }

    fn on_success(&self, provider: ProviderKind, operation: &str, attempts: u32) {
        guarded("provider.success", || {
            self.inner.on_success(provider, operation, attempts)
        });
    }

    fn on_failure(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempts: u32,
        error: &ProviderError,
    ) {
        guarded("provider.failure", || {
            self.inner.on_failure(provider, operation, attempts, error)
        });
    }
}

impl<H: ToolRuntimeHooks> ToolRuntimeHooks for SafeHooks<H> {
    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        guarded("tool.start", || self.inner.on_execution_start(tool_call, context));
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        guarded("tool.success", || {
            self.inner
                .on_execution_success(tool_call, context, result, elapsed)
        });
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        guarded("tool.failure", || {
            self.inner
                .on_execution_failure(tool_call, context, error, elapsed)
        });
    }
}

impl<H: TurnLifecycleHooks> TurnLifecycleHooks for SafeHooks<H> {
    fn on_turn_start(&self, session_id: &SessionId, turn_id: &TurnId) {
        guarded("turn.start", || self.inner.on_turn_start(session_id, turn_id));
    }

    fn on_turn_complete(
        &self,
        session_id: &SessionId,
        turn_id: &TurnId,
        status: MessageStatus,
        elapsed: Duration,
    ) {
        guarded("turn.complete", || {
            self.inner
                .on_turn_complete(session_id, turn_id, status, elapsed)
        });
    }

    fn on_turn_failure(&self, session_id: &SessionId, turn_id: &TurnId, error: &ChatError) {
        guarded("turn.failure", || {
            self.inner.on_turn_failure(session_id, turn_id, error)
        });
    }
}
