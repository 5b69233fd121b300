//! Common `axprovider` imports for downstream crates.

pub use crate::{
    BoxedEventStream, Message, ModelEventStream, ModelProvider, ModelRequest, ModelRequestBuilder,
    ModelResponse, NoopOperationHooks, OutputItem, ProviderBuilder, ProviderError,
    ProviderErrorKind, ProviderKind, ProviderOperationHooks, RetryPolicy, Role, StopReason,
    StreamEvent, TokenUsage, ToolCall, ToolDefinition, ToolResult, execute_with_retry,
};
pub use axcommon::{BoxFuture, MetadataMap};
