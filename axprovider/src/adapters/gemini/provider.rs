//! Gemini provider implementation over transport and shared models.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::{
    BoxedEventStream, ModelProvider, ModelRequest, ModelResponse, ProviderError, ProviderFuture,
    ProviderKind, SecretString, StreamEvent,
};

use super::transport::GeminiTransport;
use super::types::{GeminiFunctionDeclaration, GeminiRequest, contents_from_messages};

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: SecretString,
    transport: Arc<dyn GeminiTransport>,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<SecretString>, transport: Arc<dyn GeminiTransport>) -> Self {
        Self {
            api_key: api_key.into(),
            transport,
        }
    }

    fn authorized_key(&self) -> Result<SecretString, ProviderError> {
        if self.api_key.is_blank() {
            return Err(ProviderError::authentication("no Gemini API key configured"));
        }

        Ok(self.api_key.clone())
    }

    pub(crate) fn build_gemini_request(&self, request: ModelRequest) -> GeminiRequest {
        let system_instruction = request.system_instruction();

        GeminiRequest {
            model: request.model,
            system_instruction,
            contents: contents_from_messages(request.messages),
            tools: request
                .tools
                .into_iter()
                .map(GeminiFunctionDeclaration::from)
                .collect(),
            temperature: request.options.temperature,
            max_output_tokens: request.options.max_tokens,
        }
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &self.api_key)
            .field("transport", &self.transport)
            .finish()
    }
}

impl ModelProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let api_key = self.authorized_key()?;
            let gemini_request = self.build_gemini_request(request);
            let response = self.transport.generate(gemini_request, api_key).await?;
            Ok(response.into_model_response())
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let api_key = self.authorized_key()?;
            let gemini_request = self.build_gemini_request(request);
            let mut chunks = self
                .transport
                .stream_generate(gemini_request, api_key)
                .await?;

            let stream = try_stream! {
                while let Some(chunk) = chunks.next().await {
                    yield StreamEvent::from(chunk?);
                }
            };

            Ok(Box::pin(stream) as BoxedEventStream<'a>)
        })
    }
}
