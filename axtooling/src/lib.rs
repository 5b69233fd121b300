//! Tool contracts, execution runtime, and MCP-backed toolsets.

mod args;
mod error;
mod hooks;
pub mod mcp;
mod registry;
mod runtime;
mod tool;
mod toolset;
mod types;

pub mod prelude {
    pub use crate::{
        DefaultToolRuntime, FunctionTool, NoopToolRuntimeHooks, StaticToolset, Tool, ToolError,
        ToolErrorKind, ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolRegistry,
        ToolRuntime, ToolRuntimeHooks, Toolset,
    };
    pub use crate::mcp::{McpHttpToolset, McpTool};
}

pub use args::{parse_json_object, parse_json_value, required_string};
pub use error::{ToolError, ToolErrorKind};
pub use hooks::{NoopToolRuntimeHooks, ToolRuntimeHooks};
pub use registry::ToolRegistry;
pub use runtime::{DefaultToolRuntime, ToolRuntime};
pub use tool::{FunctionTool, Tool, ToolFuture};
pub use toolset::{StaticToolset, Toolset};
pub use types::{ToolExecutionContext, ToolExecutionResult};
