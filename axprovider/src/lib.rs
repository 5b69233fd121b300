//! Model provider contracts and HTTP clients for Gemini and OpenAI.
//!
//! ```rust
//! use axprovider::{Message, ModelRequest, Role};
//!
//! let request = ModelRequest::builder("gemini-2.0-flash")
//!     .system("You are a helpful AI assistant.")
//!     .message(Message::new(Role::User, "hello"))
//!     .streaming(true)
//!     .build()
//!     .expect("request should build");
//!
//! assert!(request.options.stream);
//! ```

pub mod adapters;
pub mod builder;
pub mod credentials;
pub mod error;
pub mod model;
pub mod prelude;
pub mod provider;
pub mod resilience;
pub mod stream;

pub use builder::ProviderBuilder;
pub use credentials::SecretString;
pub use error::{ProviderError, ProviderErrorKind};
pub use model::{
    Message, ModelRequest, ModelRequestBuilder, ModelResponse, OutputItem, ProviderKind, Role,
    StopReason, TokenUsage, ToolCall, ToolDefinition, ToolResult,
};
pub use provider::{ModelProvider, ProviderFuture};
pub use resilience::{
    NoopOperationHooks, ProviderOperationHooks, RetryPolicy, execute_with_retry,
};
pub use stream::{BoxedEventStream, ModelEventStream, StreamEvent, VecEventStream};
