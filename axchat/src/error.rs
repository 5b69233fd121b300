//! Orchestration errors and classification.

use std::error::Error;
use std::fmt::{Display, Formatter};

use axprovider::ProviderError;
use axstore::StoreError;
use axtooling::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    InvalidRequest,
    Configuration,
    Construction,
    SessionBusy,
    Provider,
    Store,
    Tooling,
    Internal,
}

/// Runner construction stage that produced a [`ChatErrorKind::Construction`] error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    ModelClient,
    Agent,
    Runner,
}

impl BuildStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelClient => "model_client",
            Self::Agent => "agent",
            Self::Runner => "runner",
        }
    }
}

impl Display for BuildStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
    pub stage: Option<BuildStage>,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stage: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::InvalidRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Configuration, message)
    }

    pub fn construction(stage: BuildStage, message: impl Into<String>) -> Self {
        Self {
            kind: ChatErrorKind::Construction,
            message: message.into(),
            stage: Some(stage),
        }
    }

    pub fn session_busy(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::SessionBusy, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Provider, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Store, message)
    }

    pub fn tooling(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Tooling, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Internal, message)
    }

    /// True for failures the caller can fix by editing configuration or input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind,
            ChatErrorKind::InvalidRequest | ChatErrorKind::Configuration | ChatErrorKind::SessionBusy
        )
    }
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{:?} ({stage}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl Error for ChatError {}

impl From<ProviderError> for ChatError {
    fn from(value: ProviderError) -> Self {
        ChatError::provider(value.to_string())
    }
}

impl From<StoreError> for ChatError {
    fn from(value: StoreError) -> Self {
        ChatError::store(value.to_string())
    }
}

impl From<ToolError> for ChatError {
    fn from(value: ToolError) -> Self {
        ChatError::tooling(value.to_string())
    }
}
