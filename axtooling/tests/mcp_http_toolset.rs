use std::sync::{Arc, Mutex};

use axtooling::mcp::McpHttpToolset;
use axtooling::{Tool, ToolErrorKind, ToolExecutionContext, Toolset};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const SESSION: &str = "session-abc";

#[derive(Debug, Default)]
struct ServerLog {
    methods: Mutex<Vec<String>>,
    sessions: Mutex<Vec<Option<String>>>,
}

async fn spawn_server(log: Arc<ServerLog>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_connection(socket, Arc::clone(&log)));
        }
    });

    format!("http://{addr}/mcp")
}

async fn serve_connection(socket: TcpStream, log: Arc<ServerLog>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let mut content_length = 0usize;
        let mut session = None;
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                let value = value.trim().to_string();
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.parse().unwrap_or(0);
                } else if name.eq_ignore_ascii_case("mcp-session-id") {
                    session = Some(value);
                }
            }
        }

        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }

        let request: Value = serde_json::from_slice(&body).expect("client should send JSON");
        let method = request["method"].as_str().unwrap_or_default().to_string();
        log.methods.lock().expect("methods lock").push(method.clone());
        log.sessions.lock().expect("sessions lock").push(session);

        let response = respond(&method, &request);
        if write.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn respond(method: &str, request: &Value) -> String {
    let id = request["id"].clone();
    match method {
        "initialize" => http_ok(
            "application/json",
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake-exa", "version": "1.0.0"}
                }
            })
            .to_string(),
            true,
        ),
        "notifications/initialized" => {
            "HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\n\r\n".to_string()
        }
        "tools/list" if request["params"]["cursor"] == "page-2" => http_ok(
            "application/json",
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"tools": [{"name": "fetch", "description": "Fetch a page"}]}
            })
            .to_string(),
            false,
        ),
        "tools/list" => http_ok(
            "application/json",
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "tools": [{
                        "name": "web_search_exa",
                        "description": "Search the web",
                        "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
                    }],
                    "nextCursor": "page-2"
                }
            })
            .to_string(),
            false,
        ),
        "tools/call" if request["params"]["name"] == "fetch" => http_ok(
            "application/json",
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": "fetch failed"}], "isError": true}
            })
            .to_string(),
            false,
        ),
        "tools/call" => {
            let query = request["params"]["arguments"]["query"]
                .as_str()
                .unwrap_or_default();
            let progress = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
            let result = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": format!("results for {query}")}]}
            });
            http_ok(
                "text/event-stream",
                format!("event: message\ndata: {progress}\n\nevent: message\ndata: {result}\n\n"),
                false,
            )
        }
        _ => http_ok(
            "application/json",
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "method not found"}})
                .to_string(),
            false,
        ),
    }
}

fn http_ok(content_type: &str, body: String, with_session: bool) -> String {
    let session = if with_session {
        format!("mcp-session-id: {SESSION}\r\n")
    } else {
        String::new()
    };

    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\n{session}\r\n{body}",
        body.len()
    )
}

fn find_tool(tools: &[Arc<dyn Tool>], name: &str) -> Arc<dyn Tool> {
    tools
        .iter()
        .find(|tool| tool.definition().name == name)
        .cloned()
        .expect("tool should be listed")
}

#[tokio::test]
async fn toolset_lists_all_pages_and_calls_over_event_stream() {
    let log = Arc::new(ServerLog::default());
    let url = spawn_server(Arc::clone(&log)).await;
    let toolset = McpHttpToolset::new("exa", url).expect("toolset should build");

    let tools = toolset.tools().await.expect("tools should resolve");
    assert_eq!(tools.len(), 2);

    let search = find_tool(&tools, "web_search_exa");
    assert!(search.definition().input_schema.contains("query"));

    let context = ToolExecutionContext::new("session-1");
    let output = search
        .invoke("{\"query\":\"rust\"}", &context)
        .await
        .expect("search should succeed");
    assert_eq!(output, "results for rust");

    let methods = log.methods.lock().expect("methods lock").clone();
    assert_eq!(
        methods,
        vec![
            "initialize",
            "notifications/initialized",
            "tools/list",
            "tools/list",
            "tools/call"
        ]
    );

    let sessions = log.sessions.lock().expect("sessions lock").clone();
    assert_eq!(sessions[0], None);
    assert!(
        sessions[1..]
            .iter()
            .all(|session| session.as_deref() == Some(SESSION))
    );
    assert_eq!(toolset.client().session_id().as_deref(), Some(SESSION));
}

#[tokio::test]
async fn error_results_surface_as_execution_errors() {
    let log = Arc::new(ServerLog::default());
    let url = spawn_server(Arc::clone(&log)).await;
    let toolset = McpHttpToolset::new("exa", url).expect("toolset should build");

    let tools = toolset.tools().await.expect("tools should resolve");
    let fetch = find_tool(&tools, "fetch");

    let error = fetch
        .invoke("", &ToolExecutionContext::new("session-2"))
        .await
        .expect_err("tool error result should fail");

    assert_eq!(error.kind, ToolErrorKind::Execution);
    assert_eq!(error.message, "fetch failed");
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    drop(listener);

    let toolset = McpHttpToolset::new("exa", format!("http://{addr}/mcp")).expect("toolset should build");
    let error = match toolset.tools().await {
        Ok(_) => panic!("closed port should fail"),
        Err(error) => error,
    };

    assert_eq!(error.kind, ToolErrorKind::Transport);
    assert!(error.is_retryable());
}
