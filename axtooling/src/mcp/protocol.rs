//! JSON-RPC envelopes and MCP result payloads.

use axprovider::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ToolError;

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const CLIENT_NAME: &str = "axe-desktop";

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn call(id: i64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        }
    }

    pub fn notification(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// True when this message answers the request with `id`. Server requests and
    /// notifications interleaved on an event stream carry a `method` and are skipped.
    pub fn answers(&self, id: i64) -> bool {
        self.method.is_none() && self.id.as_ref().and_then(Value::as_i64) == Some(id)
    }

    pub fn into_result(self) -> Result<Value, ToolError> {
        if let Some(error) = self.error {
            return Err(ToolError::execution(format!(
                "MCP error {}: {}",
                error.code, error.message
            )));
        }

        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

impl McpToolDescriptor {
    pub fn to_definition(&self) -> ToolDefinition {
        let schema = self
            .input_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object"}));

        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone().unwrap_or_default(),
            input_schema: schema.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Text blocks joined by newlines. Non-text blocks are rendered as JSON.
    pub fn output_text(&self) -> String {
        if self.content.is_empty()
            && let Some(structured) = &self.structured_content
        {
            return structured.to_string();
        }

        self.content
            .iter()
            .map(|block| match (&block.text, block.kind.as_str()) {
                (Some(text), "text") => text.clone(),
                _ => {
                    let mut rendered = block.rest.clone();
                    rendered.insert("type".to_string(), Value::String(block.kind.clone()));
                    Value::Object(rendered).to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn decode<T>(value: Value, method: &str) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value)
        .map_err(|err| ToolError::protocol(format!("invalid '{method}' result: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_omit_id_and_params() {
        let encoded = serde_json::to_value(JsonRpcRequest::notification(
            "notifications/initialized",
        ))
        .expect("notification should encode");

        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        );
    }

    #[test]
    fn rpc_errors_become_execution_errors() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": {"code": -32602, "message": "unknown tool"}
        }))
        .expect("response should parse");

        assert!(response.answers(4));
        let error = response.into_result().expect_err("rpc error should fail");
        assert_eq!(error.kind, crate::ToolErrorKind::Execution);
        assert!(error.message.contains("unknown tool"));
    }

    #[test]
    fn server_requests_do_not_answer_client_calls() {
        let request: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ping"
        }))
        .expect("request should parse");

        assert!(!request.answers(1));
    }

    #[test]
    fn tool_descriptors_default_to_object_schema() {
        let listed: ListToolsResult = decode(
            json!({
                "tools": [
                    {"name": "web_search_exa", "description": "Search", "inputSchema": {"type": "object", "required": ["query"]}},
                    {"name": "ping"}
                ],
                "nextCursor": "page-2"
            }),
            "tools/list",
        )
        .expect("list should decode");

        assert_eq!(listed.next_cursor.as_deref(), Some("page-2"));
        let definition = listed.tools[1].to_definition();
        assert_eq!(definition.name, "ping");
        assert_eq!(definition.input_schema, "{\"type\":\"object\"}");
        assert!(listed.tools[0].to_definition().input_schema.contains("query"));
    }

    #[test]
    fn call_results_join_text_blocks() {
        let result: CallToolResult = decode(
            json!({
                "content": [
                    {"type": "text", "text": "first"},
                    {"type": "resource", "uri": "https://example.com"},
                    {"type": "text", "text": "second"}
                ],
                "isError": false
            }),
            "tools/call",
        )
        .expect("result should decode");

        let output = result.output_text();
        assert!(output.starts_with("first\n"));
        assert!(output.ends_with("\nsecond"));
        assert!(output.contains("https://example.com"));
    }
}
