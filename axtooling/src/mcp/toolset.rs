//! Toolset adapter exposing the tools of one MCP server.

use std::sync::Arc;
use std::time::Duration;

use axprovider::ToolDefinition;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::client::McpHttpClient;
use crate::{Tool, ToolError, ToolExecutionContext, ToolFuture, Toolset, parse_json_value};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct McpHttpToolset {
    name: String,
    client: Arc<McpHttpClient>,
}

impl McpHttpToolset {
    /// Builds a toolset for `url`. No network traffic happens until tools are resolved.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ToolError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| ToolError::transport(format!("failed to build HTTP client: {err}")))?;
        Self::with_client(name, url, http)
    }

    pub fn with_client(
        name: impl Into<String>,
        url: impl Into<String>,
        http: Client,
    ) -> Result<Self, ToolError> {
        let name = name.into();
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::invalid_arguments(format!(
                "MCP endpoint '{name}' needs an http(s) URL, got '{url}'"
            )));
        }

        Ok(Self {
            client: Arc::new(McpHttpClient::new(http, name.clone(), url)),
            name,
        })
    }

    pub fn client(&self) -> Arc<McpHttpClient> {
        Arc::clone(&self.client)
    }
}

impl Toolset for McpHttpToolset {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<Arc<dyn Tool>>, ToolError>> {
        Box::pin(async move {
            let descriptors = self.client.list_tools().await?;
            debug!(toolset = %self.name, count = descriptors.len(), "resolved MCP tools");

            Ok(descriptors
                .iter()
                .map(|descriptor| {
                    Arc::new(McpTool {
                        definition: descriptor.to_definition(),
                        client: Arc::clone(&self.client),
                    }) as Arc<dyn Tool>
                })
                .collect())
        })
    }
}

/// One remote tool, invoked through `tools/call`.
#[derive(Debug)]
pub struct McpTool {
    definition: ToolDefinition,
    client: Arc<McpHttpClient>,
}

impl Tool for McpTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    fn invoke<'a>(
        &'a self,
        args_json: &'a str,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let arguments = if args_json.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                parse_json_value(args_json)?
            };

            let result = self
                .client
                .call_tool(&self.definition.name, arguments)
                .await?;
            let output = result.output_text();

            if result.is_error {
                return Err(ToolError::execution(output));
            }

            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolErrorKind;

    #[test]
    fn non_http_urls_are_rejected() {
        let error = McpHttpToolset::new("local", "stdio://exa").expect_err("url should be rejected");
        assert_eq!(error.kind, ToolErrorKind::InvalidArguments);

        let toolset =
            McpHttpToolset::new("exa", "https://mcp.exa.ai/mcp").expect("https url is accepted");
        assert_eq!(toolset.name(), "exa");
        assert_eq!(toolset.client().endpoint(), "https://mcp.exa.ai/mcp");
    }
}
