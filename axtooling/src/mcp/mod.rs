//! Model Context Protocol tools reached over streamable HTTP.

pub mod client;
pub mod protocol;
pub mod toolset;

pub use client::McpHttpClient;
pub use protocol::{CallToolResult, McpToolDescriptor};
pub use toolset::{McpHttpToolset, McpTool};
