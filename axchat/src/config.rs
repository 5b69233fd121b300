//! Provider and tool endpoint configuration consumed by the orchestrator.

use std::fmt::{Debug, Formatter};

use axprovider::ProviderKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderType {
    pub fn kind(self) -> ProviderKind {
        match self {
            Self::Gemini => ProviderKind::Gemini,
            Self::OpenAi => ProviderKind::OpenAi,
        }
    }
}

/// One configured model backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub enabled: bool,
}

impl ProviderSettings {
    pub fn new(
        id: impl Into<String>,
        provider_type: ProviderType,
        model: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_type,
            api_key: String::new(),
            model: model.into(),
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider_type.kind()
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Debug for ProviderSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let api_key = if self.has_credentials() {
            "[REDACTED]"
        } else {
            ""
        };

        f.debug_struct("ProviderSettings")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("api_key", &api_key)
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolTransport {
    Http,
    Stdio,
}

/// An MCP server the agent may call tools on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEndpoint {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub transport: ToolTransport,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl ToolEndpoint {
    pub fn http(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            transport: ToolTransport::Http,
            url: url.into(),
            command: String::new(),
            args: Vec::new(),
            enabled: true,
        }
    }

    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            transport: ToolTransport::Stdio,
            url: String::new(),
            command: command.into(),
            args,
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
    #[serde(default, rename = "mcp_servers")]
    pub tool_endpoints: Vec<ToolEndpoint>,
    #[serde(default)]
    pub active_provider_id: String,
}

impl ChatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: ProviderSettings) -> Self {
        if self.active_provider_id.is_empty() {
            self.active_provider_id = provider.id.clone();
        }
        self.providers.push(provider);
        self
    }

    pub fn with_tool_endpoint(mut self, endpoint: ToolEndpoint) -> Self {
        self.tool_endpoints.push(endpoint);
        self
    }

    pub fn with_active_provider_id(mut self, id: impl Into<String>) -> Self {
        self.active_provider_id = id.into();
        self
    }

    /// Provider whose id matches `active_provider_id`, else the first configured provider.
    pub fn active_provider(&self) -> Option<&ProviderSettings> {
        self.providers
            .iter()
            .find(|provider| provider.id == self.active_provider_id)
            .or_else(|| self.providers.first())
    }

    pub fn enabled_tool_endpoints(&self) -> impl Iterator<Item = &ToolEndpoint> {
        self.tool_endpoints.iter().filter(|endpoint| endpoint.enabled)
    }
}
