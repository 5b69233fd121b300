//! Unified facade over the axe workspace crates.
//!
//! Most applications depend on this crate alone: it re-exports the chat, provider, store, and
//! tooling crates, loads the on-disk configuration, and wires a ready [`AxeRuntime`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axe::prelude::*;
//!
//! # async fn run() -> Result<(), ChatError> {
//! axe::logging::init_tracing("info");
//! let runtime = build_runtime(AppConfig::load()?)?;
//!
//! let observer = FnTurnObserver::new().on_message(|role, content| println!("{role}: {content}"));
//! let outcome = runtime
//!     .orchestrator
//!     .send_message("s-1", "What's new in Rust?", Arc::new(observer))
//!     .await?
//!     .wait()
//!     .await?;
//! println!("{}", outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod prelude;
pub mod runtime;

pub use axchat;
pub use axcommon;
pub use axobserve;
pub use axprovider;
pub use axstore;
pub use axtooling;

pub use axchat::{
    AgentConfig, AgentRunner, AgentRunnerFactory, BuildStage, ChatConfig, ChatError,
    ChatErrorKind, ChatOrchestrator, ChatOrchestratorBuilder, ContentPart, DeliveryMode,
    FnTurnObserver, InMemorySessionService, NoopTurnObserver, ProviderSettings, ProviderType,
    RunConfig, Runner, RunnerFactory, SessionService, StreamingMode, ToolCallEvent, ToolEndpoint,
    ToolTransport, TurnEvent, TurnHandle, TurnLifecycleHooks, TurnObserver, TurnOutcome,
};
pub use axcommon::{BoxFuture, MetadataMap, RetryPolicy, SessionId, TurnId};
pub use axobserve::{
    FanoutHooks, MetricsObservabilityHooks, SafeHooks, StandardHooks, TracingObservabilityHooks,
    standard_hooks,
};
pub use axprovider::{
    Message, ModelProvider, ModelRequest, ModelResponse, ProviderError, ProviderErrorKind,
    ProviderKind, Role, SecretString, StopReason, StreamEvent, ToolCall, ToolDefinition,
};
pub use axstore::{
    InMemoryRecordStore, MessageRecord, MessageRole, MessageStatus, RecordStore,
    RecordStoreConfig, SessionRecord, SqliteRecordStore, StoreError, StoreErrorKind,
    ToolCallRecord,
};
pub use axtooling::{FunctionTool, StaticToolset, Tool, ToolError, ToolErrorKind, Toolset};

pub use config::{AppConfig, config_dir, env_api_key};
pub use runtime::{
    AxeRuntime, build_in_memory_runtime, build_runtime, build_runtime_with, runner_factory,
};
