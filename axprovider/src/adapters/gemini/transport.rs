//! Gemini transport trait and reqwest-based HTTP implementation.

use std::pin::Pin;

use async_stream::try_stream;
use axcommon::sse::{SseLineBuffer, sse_data_payload};
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, Response};

use crate::adapters::map_reqwest_error;
use crate::{ProviderError, ProviderFuture, SecretString};

use super::serde_api::{GeminiApiResponse, build_api_request, extract_error_message};
use super::types::{
    GeminiFinishReason, GeminiPart, GeminiRequest, GeminiResponse, GeminiStreamChunk, GeminiUsage,
    function_call,
};

pub type GeminiChunkStream<'a> =
    Pin<Box<dyn Stream<Item = Result<GeminiStreamChunk, ProviderError>> + Send + 'a>>;

pub trait GeminiTransport: Send + Sync + std::fmt::Debug {
    fn generate<'a>(
        &'a self,
        request: GeminiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<GeminiResponse, ProviderError>>;

    fn stream_generate<'a>(
        &'a self,
        request: GeminiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<GeminiChunkStream<'a>, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct GeminiHttpTransport {
    client: Client,
    base_url: String,
}

impl GeminiHttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.trim().trim_start_matches("models/");
        format!("{}/models/{model}:{method}", self.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        request: GeminiRequest,
        api_key: &SecretString,
        method: &str,
    ) -> Result<Response, ProviderError> {
        let url = self.endpoint(&request.model, method);
        let api_request = build_api_request(request)?;
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key.expose())
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
            .unwrap_or_else(|| format!("Gemini request failed with status {status}"));

        ProviderError::from_http_status(status.as_u16(), message)
    }
}

impl GeminiTransport for GeminiHttpTransport {
    fn generate<'a>(
        &'a self,
        request: GeminiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<GeminiResponse, ProviderError>> {
        Box::pin(async move {
            let model = request.model.clone();
            let response = self.send(request, &api_key, "generateContent").await?;
            let mut parsed: GeminiApiResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::protocol(err.to_string()))?;

            Ok(GeminiResponse {
                model: parsed.model_version.clone().unwrap_or(model),
                finish_reason: parsed.finish_reason().unwrap_or(GeminiFinishReason::Other),
                parts: parsed.take_parts(),
                usage: parsed.usage_metadata.take().unwrap_or_default().into(),
            })
        })
    }

    fn stream_generate<'a>(
        &'a self,
        request: GeminiRequest,
        api_key: SecretString,
    ) -> ProviderFuture<'a, Result<GeminiChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            let model_for_fallback = request.model.clone();
            let response = self
                .send(request, &api_key, "streamGenerateContent?alt=sse")
                .await?;

            let stream = try_stream! {
                let mut chunks = response.bytes_stream();
                let mut lines = SseLineBuffer::default();
                let mut finished = false;
                let mut text = String::new();
                let mut calls: Vec<GeminiPart> = Vec::new();
                let mut model = None::<String>;
                let mut finish_reason = GeminiFinishReason::Other;
                let mut usage = GeminiUsage::default();

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

                        if payload.is_empty() {
                            continue;
                        }

                        let mut parsed: GeminiApiResponse = serde_json::from_str(payload)
                            .map_err(|err| ProviderError::protocol(err.to_string()))?;

                        if model.is_none() {
                            model = parsed.model_version.clone();
                        }

                        if let Some(reported) = parsed.usage_metadata.take() {
                            usage = reported.into();
                        }

                        if let Some(reason) = parsed.finish_reason() {
                            finish_reason = reason;
                        }

                        for part in parsed.take_parts() {
                            match part {
                                GeminiPart::Text(delta) if !delta.is_empty() => {
                                    text.push_str(&delta);
                                    yield GeminiStreamChunk::TextDelta(delta);
                                }
                                GeminiPart::FunctionCall { name, args } => {
                                    let call = function_call(calls.len(), name.clone(), &args);
                                    calls.push(GeminiPart::FunctionCall { name, args });
                                    yield GeminiStreamChunk::FunctionCall(call);
                                }
                                _ => {}
                            }
                        }
                    }
                }

                let mut parts = Vec::with_capacity(calls.len() + 1);
                if !text.is_empty() {
                    parts.push(GeminiPart::Text(text));
                }
                parts.extend(calls);

                yield GeminiStreamChunk::ResponseComplete(GeminiResponse {
                    model: model.unwrap_or(model_for_fallback),
                    parts,
                    finish_reason,
                    usage,
                });
            };

            Ok(Box::pin(stream) as GeminiChunkStream<'a>)
        })
    }
}
