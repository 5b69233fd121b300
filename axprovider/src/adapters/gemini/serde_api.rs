//! Gemini `generateContent` wire payloads and conversion helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProviderError;

use super::types::{
    GeminiContent, GeminiFinishReason, GeminiFunctionDeclaration, GeminiPart, GeminiRequest,
    GeminiUsage,
};

pub(crate) fn build_api_request(request: GeminiRequest) -> Result<GeminiApiRequest, ProviderError> {
    if request.contents.is_empty() {
        return Err(ProviderError::invalid_request(
            "Gemini request requires at least one content entry",
        ));
    }

    let tools = if request.tools.is_empty() {
        None
    } else {
        let declarations = request
            .tools
            .into_iter()
            .map(GeminiApiFunctionDeclaration::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Some(vec![GeminiApiTool {
            function_declarations: declarations,
        }])
    };

    let generation_config = if request.temperature.is_some() || request.max_output_tokens.is_some()
    {
        Some(GeminiApiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        })
    } else {
        None
    };

    Ok(GeminiApiRequest {
        contents: request.contents.into_iter().map(GeminiApiContent::from).collect(),
        system_instruction: request
            .system_instruction
            .filter(|instruction| !instruction.trim().is_empty())
            .map(|instruction| GeminiApiContent {
                role: None,
                parts: vec![GeminiApiPart::text(instruction)],
            }),
        tools,
        generation_config,
    })
}

pub(crate) fn parse_finish_reason(value: Option<&str>) -> GeminiFinishReason {
    match value {
        Some("STOP") => GeminiFinishReason::Stop,
        Some("MAX_TOKENS") => GeminiFinishReason::MaxTokens,
        Some("SAFETY")
        | Some("RECITATION")
        | Some("BLOCKLIST")
        | Some("PROHIBITED_CONTENT")
        | Some("SPII") => GeminiFinishReason::Safety,
        _ => GeminiFinishReason::Other,
    }
}

pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<GeminiApiErrorEnvelope>(body).ok()?;
    Some(match parsed.error.status {
        Some(status) => format!("{status}: {}", parsed.error.message),
        None => parsed.error.message,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiApiErrorEnvelope {
    pub error: GeminiApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiApiError {
    pub message: String,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiRequest {
    pub contents: Vec<GeminiApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiApiGenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiTool {
    pub function_declarations: Vec<GeminiApiFunctionDeclaration>,
}

/// Tool schemas travel as full JSON Schema; `parameters` only accepts the OpenAPI subset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiFunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters_json_schema: Value,
}

impl TryFrom<GeminiFunctionDeclaration> for GeminiApiFunctionDeclaration {
    type Error = ProviderError;

    fn try_from(value: GeminiFunctionDeclaration) -> Result<Self, Self::Error> {
        let parameters_json_schema = serde_json::from_str::<Value>(&value.parameters_schema)
            .map_err(|_| ProviderError::invalid_request("Gemini tool schema must be valid JSON"))?;

        Ok(Self {
            name: value.name,
            description: value.description,
            parameters_json_schema,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiApiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiApiPart>,
}

impl From<GeminiContent> for GeminiApiContent {
    fn from(value: GeminiContent) -> Self {
        Self {
            role: Some(value.role.as_str().to_string()),
            parts: value.parts.into_iter().map(GeminiApiPart::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiApiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiApiFunctionResponse>,
    /// Thought parts are internal reasoning; they are never surfaced as text.
    #[serde(default, skip_serializing)]
    pub thought: Option<bool>,
}

impl GeminiApiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    pub(crate) fn into_part(self) -> Option<GeminiPart> {
        if self.thought == Some(true) {
            return None;
        }

        if let Some(call) = self.function_call {
            return Some(GeminiPart::FunctionCall {
                name: call.name,
                args: call.args.unwrap_or(Value::Object(Default::default())),
            });
        }

        if let Some(response) = self.function_response {
            return Some(GeminiPart::FunctionResponse {
                name: response.name,
                response: response.response,
            });
        }

        self.text.map(GeminiPart::Text)
    }
}

impl From<GeminiPart> for GeminiApiPart {
    fn from(value: GeminiPart) -> Self {
        match value {
            GeminiPart::Text(text) => Self::text(text),
            GeminiPart::FunctionCall { name, args } => Self {
                function_call: Some(GeminiApiFunctionCall {
                    name,
                    args: Some(args),
                }),
                ..Self::default()
            },
            GeminiPart::FunctionResponse { name, response } => Self {
                function_response: Some(GeminiApiFunctionResponse { name, response }),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiApiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiApiFunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiApiCandidate>,
    pub usage_metadata: Option<GeminiApiUsage>,
    pub model_version: Option<String>,
    pub prompt_feedback: Option<GeminiApiPromptFeedback>,
}

impl GeminiApiResponse {
    /// Parts of the first candidate, with thought parts removed.
    pub(crate) fn take_parts(&mut self) -> Vec<GeminiPart> {
        self.candidates
            .first_mut()
            .and_then(|candidate| candidate.content.take())
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(GeminiApiPart::into_part)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn finish_reason(&self) -> Option<GeminiFinishReason> {
        if self
            .prompt_feedback
            .as_ref()
            .is_some_and(|feedback| feedback.block_reason.is_some())
        {
            return Some(GeminiFinishReason::Safety);
        }

        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref())
            .map(|reason| parse_finish_reason(Some(reason)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiCandidate {
    pub content: Option<GeminiApiContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiPromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiApiUsage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

impl From<GeminiApiUsage> for GeminiUsage {
    fn from(value: GeminiApiUsage) -> Self {
        Self {
            prompt_token_count: value.prompt_token_count,
            candidates_token_count: value.candidates_token_count,
            total_token_count: value.total_token_count,
        }
    }
}
