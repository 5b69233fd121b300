//! Streamable HTTP MCP client: JSON-RPC over POST with JSON or event-stream replies.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use axcommon::sse::{SseLineBuffer, is_event_stream_content_type, sse_data_payload};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::debug;

use super::protocol::{
    CallToolResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult, McpToolDescriptor, decode,
    initialize_params,
};
use crate::ToolError;

const SESSION_HEADER: &str = "Mcp-Session-Id";
const MAX_LIST_PAGES: usize = 32;

#[derive(Debug)]
pub struct McpHttpClient {
    http: Client,
    server: String,
    endpoint: String,
    next_id: AtomicI64,
    session_id: Mutex<Option<String>>,
    initialized: OnceCell<()>,
}

impl McpHttpClient {
    pub fn new(http: Client, server: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            server: server.into(),
            endpoint: endpoint.into(),
            next_id: AtomicI64::new(1),
            session_id: Mutex::new(None),
            initialized: OnceCell::new(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .ok()
            .and_then(|session| session.clone())
    }

    /// Runs the `initialize` handshake once. Concurrent callers wait for the first attempt;
    /// a failed attempt leaves the client uninitialised so the next call retries.
    pub async fn ensure_initialized(&self) -> Result<(), ToolError> {
        self.initialized
            .get_or_try_init(|| async {
                self.request("initialize", Some(initialize_params())).await?;
                self.notify("notifications/initialized").await?;
                debug!(server = %self.server, session_id = ?self.session_id(), "MCP session initialised");
                Ok::<(), ToolError>(())
            })
            .await
            .map(|_| ())
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDescriptor>, ToolError> {
        self.ensure_initialized().await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|cursor| json!({ "cursor": cursor }));
            let page: ListToolsResult =
                decode(self.request("tools/list", params).await?, "tools/list")?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(ToolError::protocol(format!(
            "MCP server '{}' paginated tools/list beyond {MAX_LIST_PAGES} pages",
            self.server
        )))
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ToolError> {
        self.ensure_initialized().await?;
        let result = self
            .request(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        decode(result, "tools/call")
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::call(id, method, params);
        debug!(server = %self.server, method, id, "sending MCP request");

        let response = self.post(&body).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let reply = if is_event_stream_content_type(&content_type) {
            self.read_event_stream(response, id).await?
        } else {
            let bytes = response.bytes().await.map_err(map_reqwest_error)?;
            serde_json::from_slice::<JsonRpcResponse>(&bytes).map_err(|err| {
                ToolError::protocol(format!("invalid JSON-RPC reply to '{method}': {err}"))
            })?
        };

        reply.into_result()
    }

    async fn notify(&self, method: &str) -> Result<(), ToolError> {
        self.post(&JsonRpcRequest::notification(method)).await?;
        Ok(())
    }

    async fn post(&self, body: &JsonRpcRequest<'_>) -> Result<Response, ToolError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);

        if let Some(session_id) = self.session_id() {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(&self.server, status));
        }

        if let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            && let Ok(mut slot) = self.session_id.lock()
        {
            *slot = Some(session_id.to_string());
        }

        Ok(response)
    }

    async fn read_event_stream(
        &self,
        response: Response,
        id: i64,
    ) -> Result<JsonRpcResponse, ToolError> {
        let mut chunks = response.bytes_stream();
        let mut lines = SseLineBuffer::default();

        loop {
            let (pending, done) = match chunks.next().await {
                Some(chunk) => (lines.push(&chunk.map_err(map_reqwest_error)?), false),
                None => (lines.finish(), true),
            };

            for line in pending {
                let Some(payload) = sse_data_payload(&line) else {
                    continue;
                };
                if payload.is_empty() {
                    continue;
                }

                match serde_json::from_str::<JsonRpcResponse>(payload) {
                    Ok(message) if message.answers(id) => return Ok(message),
                    Ok(_) => continue,
                    Err(err) => {
                        return Err(ToolError::protocol(format!(
                            "invalid event-stream payload from '{}': {err}",
                            self.server
                        )));
                    }
                }
            }

            if done {
                return Err(ToolError::protocol(format!(
                    "MCP server '{}' closed the event stream without answering request {id}",
                    self.server
                )));
            }
        }
    }
}

fn status_error(server: &str, status: StatusCode) -> ToolError {
    let message = format!("MCP server '{server}' returned HTTP {status}");
    match status.as_u16() {
        401 | 403 => ToolError::unauthorized(message),
        408 | 504 => ToolError::timeout(message),
        code if code >= 500 || code == 429 => ToolError::transport(message),
        _ => ToolError::protocol(message),
    }
}

fn map_reqwest_error(error: reqwest::Error) -> ToolError {
    if error.is_timeout() {
        ToolError::timeout(error.to_string())
    } else {
        ToolError::transport(error.to_string())
    }
}
