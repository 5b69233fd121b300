//! Gemini adapter types and provider-agnostic conversion logic.

use serde_json::{Value, json};

use crate::{
    Message, ModelResponse, OutputItem, ProviderKind, Role, StopReason, StreamEvent, TokenUsage,
    ToolCall, ToolDefinition,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub contents: Vec<GeminiContent>,
    pub tools: Vec<GeminiFunctionDeclaration>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeminiRole {
    User,
    Model,
}

impl GeminiRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiContent {
    pub role: GeminiRole,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeminiPart {
    Text(String),
    FunctionCall { name: String, args: Value },
    FunctionResponse { name: String, response: Value },
}

/// Folds provider-agnostic history into Gemini contents.
///
/// System messages are dropped here; callers lift them into `system_instruction`.
/// Adjacent messages that map to the same Gemini role share one content entry.
pub(crate) fn contents_from_messages(messages: Vec<Message>) -> Vec<GeminiContent> {
    let mut contents: Vec<GeminiContent> = Vec::new();

    for message in messages {
        let (role, parts) = match message.role {
            Role::System => continue,
            Role::User => (GeminiRole::User, vec![GeminiPart::Text(message.content)]),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !message.content.is_empty() {
                    parts.push(GeminiPart::Text(message.content));
                }
                parts.extend(message.tool_calls.into_iter().map(|call| {
                    GeminiPart::FunctionCall {
                        args: serde_json::from_str(&call.arguments).unwrap_or_else(|_| json!({})),
                        name: call.name,
                    }
                }));
                (GeminiRole::Model, parts)
            }
            Role::Tool => {
                let Some(result) = message.tool_result else {
                    continue;
                };
                let payload = serde_json::from_str::<Value>(&result.output)
                    .unwrap_or_else(|_| Value::String(result.output.clone()));
                let key = if result.is_error { "error" } else { "output" };
                let mut response = serde_json::Map::new();
                response.insert(key.to_string(), payload);
                (
                    GeminiRole::User,
                    vec![GeminiPart::FunctionResponse {
                        name: result.tool_name,
                        response: Value::Object(response),
                    }],
                )
            }
        };

        if parts.is_empty() {
            continue;
        }

        match contents.last_mut() {
            Some(last) if last.role == role => last.parts.extend(parts),
            _ => contents.push(GeminiContent { role, parts }),
        }
    }

    contents
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters_schema: String,
}

impl From<ToolDefinition> for GeminiFunctionDeclaration {
    fn from(value: ToolDefinition) -> Self {
        Self {
            name: value.name,
            description: value.description,
            parameters_schema: value.input_schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiResponse {
    pub model: String,
    pub parts: Vec<GeminiPart>,
    pub finish_reason: GeminiFinishReason,
    pub usage: GeminiUsage,
}

impl GeminiResponse {
    pub(crate) fn into_model_response(self) -> ModelResponse {
        let mut output = Vec::new();
        let mut call_index = 0;

        for part in self.parts {
            match part {
                GeminiPart::Text(text) if !text.is_empty() => {
                    match output.last_mut() {
                        Some(OutputItem::Message(message)) => message.content.push_str(&text),
                        _ => output.push(OutputItem::Message(Message::new(Role::Assistant, text))),
                    }
                }
                GeminiPart::FunctionCall { name, args } => {
                    output.push(OutputItem::ToolCall(function_call(call_index, name, &args)));
                    call_index += 1;
                }
                _ => {}
            }
        }

        let has_tool_calls = output
            .iter()
            .any(|item| matches!(item, OutputItem::ToolCall(_)));
        let stop_reason = match self.finish_reason {
            GeminiFinishReason::Stop if has_tool_calls => StopReason::ToolUse,
            other => other.into(),
        };

        ModelResponse {
            provider: ProviderKind::Gemini,
            model: self.model,
            output,
            stop_reason,
            usage: self.usage.into(),
        }
    }
}

/// Gemini function calls carry no id; ids are positional within one response.
pub(crate) fn function_call(index: usize, name: String, args: &Value) -> ToolCall {
    ToolCall {
        id: format!("call_{index}"),
        arguments: args.to_string(),
        name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeminiFinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other,
}

impl From<GeminiFinishReason> for StopReason {
    fn from(value: GeminiFinishReason) -> Self {
        match value {
            GeminiFinishReason::Stop => Self::EndTurn,
            GeminiFinishReason::MaxTokens => Self::MaxTokens,
            GeminiFinishReason::Safety => Self::ContentFiltered,
            GeminiFinishReason::Other => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeminiUsage {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
}

impl From<GeminiUsage> for TokenUsage {
    fn from(value: GeminiUsage) -> Self {
        Self {
            input_tokens: value.prompt_token_count,
            output_tokens: value.candidates_token_count,
            total_tokens: value.total_token_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeminiStreamChunk {
    TextDelta(String),
    FunctionCall(ToolCall),
    ResponseComplete(GeminiResponse),
}

impl From<GeminiStreamChunk> for StreamEvent {
    fn from(value: GeminiStreamChunk) -> Self {
        match value {
            GeminiStreamChunk::TextDelta(delta) => Self::TextDelta(delta),
            GeminiStreamChunk::FunctionCall(call) => Self::ToolCallDelta(call),
            GeminiStreamChunk::ResponseComplete(response) => {
                Self::ResponseComplete(response.into_model_response())
            }
        }
    }
}
