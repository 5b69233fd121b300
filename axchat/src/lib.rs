//! Conversation orchestration for the axe desktop chat client.
//!
//! A [`ChatOrchestrator`] maps chat sessions to cached [`Runner`]s, persists each turn through a
//! [`axstore::RecordStore`], and streams replies to a [`TurnObserver`]. Runners are built lazily
//! by a [`RunnerFactory`] from the active provider and the configured tool endpoints.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use axchat::{ChatConfig, ChatErrorKind, ChatOrchestrator, NoopTurnObserver, ProviderSettings, ProviderType};
//! use axstore::InMemoryRecordStore;
//!
//! # tokio_test_block(async {
//! let config = ChatConfig::new()
//!     .with_provider(ProviderSettings::new("default-gemini", ProviderType::Gemini, "gemini-2.0-flash"));
//! let orchestrator = ChatOrchestrator::with_defaults(Arc::new(InMemoryRecordStore::new()), config);
//!
//! let error = orchestrator
//!     .send_message("s-1", "Hello", Arc::new(NoopTurnObserver))
//!     .await
//!     .expect_err("a provider without an API key is rejected");
//! assert_eq!(error.kind, ChatErrorKind::Configuration);
//! # });
//! # fn tokio_test_block(future: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().expect("runtime").block_on(future);
//! # }
//! ```

mod agent;
mod config;
mod error;
mod factory;
mod hooks;
mod observer;
mod orchestrator;
mod pump;
mod runner;
mod session;

pub mod prelude {
    pub use crate::{
        AgentConfig, AgentRunner, AgentRunnerFactory, BuildStage, ChatConfig, ChatError,
        ChatErrorKind, ChatOrchestrator, ChatOrchestratorBuilder, ContentPart, DeliveryMode,
        FnTurnObserver, InMemorySessionService, NoopTurnLifecycleHooks, NoopTurnObserver,
        ProviderSettings, ProviderType, RunConfig, Runner, RunnerFactory, SessionService,
        StreamingMode, ToolCallEvent, ToolEndpoint, ToolTransport, TurnEvent, TurnHandle,
        TurnLifecycleHooks, TurnObserver, TurnOutcome,
    };
    pub use axcommon::{SessionId, TurnId};
    pub use axstore::{MessageRole, MessageStatus, RecordStore};
}

pub use agent::{
    AGENT_DESCRIPTION, AGENT_INSTRUCTION, AGENT_NAME, AgentConfig, AgentRunner,
    AgentRunnerBuilder, CONTENT_FILTERED_CODE, DEFAULT_MAX_TOOL_ROUND_TRIPS, MAX_TOOL_ROUNDS_CODE,
};
pub use config::{ChatConfig, ProviderSettings, ProviderType, ToolEndpoint, ToolTransport};
pub use error::{BuildStage, ChatError, ChatErrorKind};
pub use factory::{AgentRunnerFactory, ModelClientFactory, RunnerFactory};
pub use hooks::{NoopTurnLifecycleHooks, TurnLifecycleHooks};
pub use observer::{FnTurnObserver, NoopTurnObserver, SafeTurnObserver, ToolCallEvent, TurnObserver};
pub use orchestrator::{
    ChatOrchestrator, ChatOrchestratorBuilder, DEFAULT_HISTORY_SEED_LIMIT,
    SESSION_TITLE_MAX_CHARS, TurnHandle, TurnOutcome,
};
pub use pump::{
    AttemptReport, CANCELLED_MARKER, DEFAULT_DELIVERY_MODES, DeliveryMode, DeliveryOutcome,
    NO_RESPONSE_NOTICE, NoopToolCallRecorder, ToolCallRecorder, TurnPump,
};
pub use runner::{ContentPart, RunConfig, Runner, StreamingMode, TurnEvent, TurnEventStream};
pub use session::{
    APP_NAME, ChatFuture, InMemorySessionService, RemoteSession, SessionKey, SessionService,
};
pub use axcommon::{SessionId, TurnId};
