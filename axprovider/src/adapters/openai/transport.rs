//! OpenAI transport trait and reqwest-based HTTP implementation.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_stream::try_stream;
use axcommon::sse::{SseLineBuffer, sse_data_payload};
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, Response};

use crate::adapters::map_reqwest_error;
use crate::{ProviderError, ProviderFuture, SecretString};

use super::serde_api::{
    OpenAiApiResponse, OpenAiApiStreamResponse, build_api_request, extract_error_message,
    parse_finish_reason,
};
use super::types::{
    OpenAiAssistantMessage, OpenAiFinishReason, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk,
    OpenAiToolCall, OpenAiUsage,
};

pub type OpenAiChunkStream<'a> =
    Pin<Box<dyn Stream<Item = Result<OpenAiStreamChunk, ProviderError>> + Send + 'a>>;

pub trait OpenAiTransport: Send + Sync + std::fmt::Debug {
    fn complete<'a>(
        &'a self,
        request: OpenAiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: OpenAiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct OpenAiHttpTransport {
    client: Client,
    base_url: String,
}

impl OpenAiHttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        request: OpenAiRequest,
        api_key: &SecretString,
    ) -> Result<Response, ProviderError> {
        let api_request = build_api_request(request)?;
        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(api_key.expose())
            .json(&api_request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(Self::parse_error(response).await);
        }

        Ok(response)
    }

    async fn parse_error(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| format!("OpenAI request failed with status {status}"));

        ProviderError::from_http_status(status.as_u16(), message)
    }
}

impl OpenAiTransport for OpenAiHttpTransport {
    fn complete<'a>(
        &'a self,
        mut request: OpenAiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async move {
            request.stream = false;
            let response = self.send(request, &api_key).await?;
            let parsed: OpenAiApiResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::protocol(err.to_string()))?;

            OpenAiResponse::try_from(parsed)
        })
    }

    fn stream<'a>(
        &'a self,
        mut request: OpenAiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.stream = true;
            let model_for_fallback = request.model.clone();
            let response = self.send(request, &api_key).await?;

            let stream = try_stream! {
                let mut chunks = response.bytes_stream();
                let mut lines = SseLineBuffer::default();
                let mut finished = false;
                let mut content = String::new();
                let mut tool_calls: BTreeMap<u32, OpenAiToolCall> = BTreeMap::new();
                let mut model = None::<String>;
                let mut finish_reason = OpenAiFinishReason::Other;
                let mut usage = OpenAiUsage::default();

                while !finished {
                    let pending = match chunks.next().await {
                        Some(item) => lines.push(&item.map_err(map_reqwest_error)?),
                        None => {
                            finished = true;
                            lines.finish()
                        }
                    };

                    for line in pending {
                        let Some(payload) = sse_data_payload(&line) else {
                            continue;
                        };

                        if payload == "[DONE]" {
                            finished = true;
                            break;
                        }

                        let parsed: OpenAiApiStreamResponse = serde_json::from_str(payload)
                            .map_err(|err| ProviderError::protocol(err.to_string()))?;

                        if model.is_none() {
                            model = parsed.model.clone();
                        }

                        if let Some(reported) = parsed.usage {
                            usage = reported.into();
                        }

                        let Some(choice) = parsed.choices.first() else {
                            continue;
                        };

                        if let Some(delta_content) = &choice.delta.content
                            && !delta_content.is_empty()
                        {
                            content.push_str(delta_content);
                            yield OpenAiStreamChunk::TextDelta(delta_content.clone());
                        }

                        for delta_call in choice.delta.tool_calls.iter().flatten() {
                            let index = delta_call.index.unwrap_or(0);
                            let entry = tool_calls.entry(index).or_insert_with(|| OpenAiToolCall {
                                id: format!("tool_call_{index}"),
                                name: String::new(),
                                arguments: String::new(),
                            });

                            if let Some(id) = &delta_call.id {
                                entry.id = id.clone();
                            }

                            if let Some(function) = &delta_call.function {
                                if let Some(name) = &function.name {
                                    entry.name = name.clone();
                                }

                                if let Some(arguments) = &function.arguments {
                                    entry.arguments.push_str(arguments);
                                }
                            }

                            yield OpenAiStreamChunk::ToolCallDelta(entry.clone());
                        }

                        if choice.finish_reason.is_some() {
                            finish_reason = parse_finish_reason(choice.finish_reason.as_deref());
                        }
                    }
                }

                yield OpenAiStreamChunk::ResponseComplete(OpenAiResponse {
                    model: model.unwrap_or(model_for_fallback),
                    message: OpenAiAssistantMessage {
                        content,
                        tool_calls: tool_calls.into_values().collect(),
                    },
                    finish_reason,
                    usage,
                });
            };

            Ok(Box::pin(stream) as OpenAiChunkStream<'a>)
        })
    }
}
