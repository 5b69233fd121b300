//! Forwarding of one hook callback to two sinks, first then second.

use std::time::Duration;

use axchat::{ChatError, TurnLifecycleHooks};
use axcommon::{SessionId, TurnId};
use axprovider::{ProviderError, ProviderKind, ProviderOperationHooks, ToolCall};
use axstore::MessageStatus;
use axtooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};

#[derive(Debug, Clone, Default)]
pub struct FanoutHooks<A, B> {
    first: A,
    second: B,
}

impl<A, B> FanoutHooks<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A, B> ProviderOperationHooks for FanoutHooks<A, B>
where
    A: ProviderOperationHooks,
    B: ProviderOperationHooks,
{
    fn on_attempt_start(&self, provider: ProviderKind, operation: &str, attempt: u32) {
        self.first.on_attempt_start(provider, operation, attempt);
        self.second.on_attempt_start(provider, operation, attempt);
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        self.first
            .on_retry_scheduled(provider, operation, attempt, delay, error);
        self.second
            .on_retry_scheduled(provider, operation, attempt, delay, error);
    }

    fn on_success(&self, provider: ProviderKind, operation: &str, attempts: u32) {
        self.first.on_success(provider, operation, attempts);
        self.second.on_success(provider, operation, attempts);
    }

    fn on_failure(
        &self,
        provider: ProviderKind,
        operation: &str,
        attempts: u32,
        error: &ProviderError,
    ) {
        self.first.on_failure(provider, operation, attempts, error);
        self.second.on_failure(provider, operation, attempts, error);
    }
}

impl<A, B> ToolRuntimeHooks for FanoutHooks<A, B>
where
    A: ToolRuntimeHooks,
    B: ToolRuntimeHooks,
{
    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        self.first.on_execution_start(tool_call, context);
        self.second.on_execution_start(tool_call, context);
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        self.first
            .on_execution_success(tool_call, context, result, elapsed);
        self.second
            .on_execution_success(tool_call, context, result, elapsed);
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        self.first
            .on_execution_failure(tool_call, context, error, elapsed);
        self.second
            .on_execution_failure(tool_call, context, error, elapsed);
    }
}

impl<A, B> TurnLifecycleHooks for FanoutHooks<A, B>
where
    A: TurnLifecycleHooks,
    B: TurnLifecycleHooks,
{
    fn on_turn_start(&self, session_id: &SessionId, turn_id: &TurnId) {
        self.first.on_turn_start(session_id, turn_id);
        self.second.on_turn_start(session_id, turn_id);
    }

    fn on_turn_complete(
        &self,
        session_id: &SessionId,
        turn_id: &TurnId,
        status: MessageStatus,
        elapsed: Duration,
    ) {
        self.first
            .on_turn_complete(session_id, turn_id, status, elapsed);
        self.second
            .on_turn_complete(session_id, turn_id, status, elapsed);
    }

    fn on_turn_failure(&self, session_id: &SessionId, turn_id: &TurnId, error: &ChatError) {
        self.first.on_turn_failure(session_id, turn_id, error);
        self.second.on_turn_failure(session_id, turn_id, error);
    }
}
