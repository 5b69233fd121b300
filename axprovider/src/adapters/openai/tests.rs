//! Focused unit tests for OpenAI adapter internals.

#![cfg(test)]

use std::sync::Arc;

use futures_util::stream;

use crate::{
    Message, ModelRequest, ProviderError, ProviderFuture, Role, SecretString, ToolCall, ToolResult,
};

use super::provider::OpenAiProvider;
use super::serde_api::{build_api_request, parse_finish_reason};
use super::transport::{OpenAiChunkStream, OpenAiTransport};
use super::types::{OpenAiFinishReason, OpenAiRequest, OpenAiResponse, OpenAiRole};

#[derive(Debug)]
struct NoopTransport;

impl OpenAiTransport for NoopTransport {
    fn complete<'a>(
        &'a self,
        _request: OpenAiRequest,
        _api_key: SecretString,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async { Err(ProviderError::other("not used")) })
    }

    fn stream<'a>(
        &'a self,
        _request: OpenAiRequest,
        _api_key: SecretString,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>> {
        Box::pin(async {
            let output = stream::iter(vec![Err(ProviderError::other("not used"))]);
            Ok(Box::pin(output) as OpenAiChunkStream<'a>)
        })
    }
}

#[test]
fn tool_round_trip_maps_to_assistant_and_tool_messages() {
    let provider = OpenAiProvider::new("sk-test", Arc::new(NoopTransport));
    let request = ModelRequest::new(
        "gpt-4o-mini",
        vec![
            Message::new(Role::User, "search rust news"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "web_search".to_string(),
                    arguments: "{\"query\":\"rust\"}".to_string(),
                }],
            ),
            Message::tool(ToolResult {
                tool_call_id: "call_1".to_string(),
                tool_name: "web_search".to_string(),
                output: "{\"ok\":true}".to_string(),
                is_error: false,
            }),
        ],
    );

    let built = provider.build_openai_request(request, false);
    assert_eq!(built.messages.len(), 3);
    assert_eq!(built.messages[1].tool_calls.len(), 1);
    assert_eq!(built.messages[2].role, OpenAiRole::Tool);
    assert_eq!(built.messages[2].tool_call_id.as_deref(), Some("call_1"));

    let api = build_api_request(built).expect("request should build");
    assert!(api.messages[1].content.is_none());
    assert!(api.messages[1].tool_calls.is_some());
}

#[test]
fn parse_finish_reason_maps_expected_values() {
    assert_eq!(parse_finish_reason(Some("stop")), OpenAiFinishReason::Stop);
    assert_eq!(parse_finish_reason(Some("length")), OpenAiFinishReason::Length);
    assert_eq!(
        parse_finish_reason(Some("tool_calls")),
        OpenAiFinishReason::ToolCalls
    );
    assert_eq!(
        parse_finish_reason(Some("content_filter")),
        OpenAiFinishReason::ContentFilter
    );
    assert_eq!(parse_finish_reason(None), OpenAiFinishReason::Other);
}

#[tokio::test]
async fn blank_api_key_is_rejected_before_transport() {
    use crate::{ModelProvider, ProviderErrorKind};

    let provider = OpenAiProvider::new("  ", Arc::new(NoopTransport));
    let request = ModelRequest::new("gpt-4o-mini", vec![Message::new(Role::User, "hi")]);
    let error = provider
        .complete(request)
        .await
        .expect_err("blank key should fail");
    assert_eq!(error.kind, ProviderErrorKind::Authentication);
}
