//! Runner contract: one user turn in, a finite stream of agent events out.
//!
//! ```rust
//! use axchat::{ContentPart, RunConfig, StreamingMode, TurnEvent};
//!
//! let config = RunConfig::streaming();
//! assert_eq!(config.streaming_mode, StreamingMode::Sse);
//!
//! let event = TurnEvent::text("hello");
//! assert_eq!(event, TurnEvent::Content(vec![ContentPart::Text("hello".into())]));
//! ```

use std::pin::Pin;

use axcommon::SessionId;
use axstore::JsonMap;
use futures_core::Stream;

use crate::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    /// Incremental text deltas.
    Sse,
    /// A single aggregated response per model call.
    None,
}

impl StreamingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::None => "none",
        }
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Sse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub streaming_mode: StreamingMode,
}

impl RunConfig {
    pub fn streaming() -> Self {
        Self {
            streaming_mode: StreamingMode::Sse,
        }
    }

    pub fn non_streaming() -> Self {
        Self {
            streaming_mode: StreamingMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    FunctionCall {
        id: String,
        name: String,
        args: JsonMap,
    },
    FunctionResponse {
        id: String,
        name: String,
        response: JsonMap,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Content(Vec<ContentPart>),
    /// Agent-level failure reported in-band, such as a blocked response.
    Error {
        code: String,
        message: String,
    },
    Done,
}

impl TurnEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Content(vec![ContentPart::Text(text.into())])
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type TurnEventStream<'a> = Pin<Box<dyn Stream<Item = Result<TurnEvent, ChatError>> + Send + 'a>>;

/// Executes one user turn against a remote session.
///
/// The returned stream is lazy, finite, and not restartable. An `Err` item ends the turn.
pub trait Runner: Send + Sync {
    fn run(
        &self,
        session_id: SessionId,
        user_content: String,
        config: RunConfig,
    ) -> TurnEventStream<'_>;
}
