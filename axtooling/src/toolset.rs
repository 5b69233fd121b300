//! Toolsets group tools that are resolved together, usually from one remote server.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use axprovider::ToolDefinition;
//! use axtooling::{FunctionTool, StaticToolset, Toolset};
//!
//! let echo = FunctionTool::new(
//!     ToolDefinition {
//!         name: "echo".to_string(),
//!         description: "Echoes input".to_string(),
//!         input_schema: r#"{"type":"object"}"#.to_string(),
//!     },
//!     |args, _ctx| async move { Ok(args) },
//! );
//! let toolset = StaticToolset::new("local", vec![Arc::new(echo)]);
//! assert_eq!(toolset.name(), "local");
//! ```

use std::sync::Arc;

use crate::{Tool, ToolError, ToolFuture};

pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;

    /// Resolves the tools currently offered. Remote toolsets may perform network calls here.
    fn tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<Arc<dyn Tool>>, ToolError>>;
}

/// Fixed set of in-process tools.
#[derive(Clone)]
pub struct StaticToolset {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticToolset {
    pub fn new(name: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            name: name.into(),
            tools,
        }
    }
}

impl Toolset for StaticToolset {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools<'a>(&'a self) -> ToolFuture<'a, Result<Vec<Arc<dyn Tool>>, ToolError>> {
        Box::pin(async move { Ok(self.tools.clone()) })
    }
}
