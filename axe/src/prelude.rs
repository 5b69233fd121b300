//! Common imports for axe applications.

pub use crate::{
    AppConfig, AxeRuntime, build_in_memory_runtime, build_runtime, build_runtime_with, config_dir,
    runner_factory,
};
pub use crate::{
    ChatConfig, ChatError, ChatErrorKind, ChatOrchestrator, DeliveryMode, FnTurnObserver,
    MessageRole, MessageStatus, NoopTurnObserver, ProviderSettings, ProviderType, RecordStore,
    SessionId, ToolCallEvent, ToolEndpoint, TurnHandle, TurnObserver, TurnOutcome,
};
