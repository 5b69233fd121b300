//! Durable chat records: sessions, messages, and tool calls.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::StoreError;

pub const DEFAULT_USER_ID: &str = "default";

pub type JsonMap = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl Display for MessageRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            _ => Err(StoreError::storage(format!(
                "unknown message role value '{value}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl Display for MessageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            _ => Err(StoreError::storage(format!(
                "unknown message status value '{value}'"
            ))),
        }
    }
}

/// A chat session. An empty `id` asks the store to assign one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub model: String,
    pub provider_id: String,
    pub system_prompt: String,
    pub summary: Option<String>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    pub archived_at: Option<SystemTime>,
}

impl SessionRecord {
    pub fn new(title: impl Into<String>, model: impl Into<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: String::new(),
            user_id: DEFAULT_USER_ID.to_string(),
            title: title.into(),
            model: model.into(),
            provider_id: String::new(),
            system_prompt: String::new(),
            summary: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub token_count: Option<u32>,
    pub metadata: JsonMap,
    pub created_at: SystemTime,
}

impl MessageRecord {
    pub fn new(session_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            status: MessageStatus::Completed,
            token_count: None,
            metadata: JsonMap::new(),
            created_at: SystemTime::now(),
        }
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub tool_name: String,
    pub args: JsonMap,
    pub result: Option<JsonMap>,
    pub error: Option<String>,
    pub created_at: SystemTime,
}

impl ToolCallRecord {
    pub fn new(
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: JsonMap,
    ) -> Self {
        Self {
            id: String::new(),
            session_id: session_id.into(),
            message_id: message_id.into(),
            tool_name: tool_name.into(),
            args,
            result: None,
            error: None,
            created_at: SystemTime::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_result(mut self, result: JsonMap) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub(crate) fn assign_id(id: &mut String) {
    if id.trim().is_empty() {
        *id = uuid::Uuid::new_v4().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_role_round_trip_through_storage_names() {
        for status in [
            MessageStatus::InProgress,
            MessageStatus::Completed,
            MessageStatus::Cancelled,
            MessageStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(status));
        }

        assert_eq!("tool".parse::<MessageRole>(), Ok(MessageRole::Tool));
        assert!("robot".parse::<MessageRole>().is_err());
        assert!(!MessageStatus::InProgress.is_terminal());
    }

    #[test]
    fn blank_ids_are_replaced_with_uuids() {
        let mut id = String::new();
        assign_id(&mut id);
        assert_eq!(id.len(), 36);

        let mut fixed = "session-1".to_string();
        assign_id(&mut fixed);
        assert_eq!(fixed, "session-1");
    }
}
