//! Runner construction from provider and tool endpoint configuration.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axcommon::{RetryPolicy, SessionId};
use axprovider::{
    ModelProvider, NoopOperationHooks, ProviderBuilder, ProviderError, ProviderOperationHooks,
};
use axtooling::mcp::McpHttpToolset;
use axtooling::{NoopToolRuntimeHooks, ToolRuntimeHooks, Toolset};

use crate::agent::{AgentConfig, AgentRunner, DEFAULT_MAX_TOOL_ROUND_TRIPS};
use crate::config::{ProviderSettings, ToolEndpoint, ToolTransport};
use crate::runner::Runner;
use crate::session::{APP_NAME, SessionService};
use crate::{BuildStage, ChatError};

/// Builds the model client for a provider entry.
pub type ModelClientFactory =
    dyn Fn(&ProviderSettings) -> Result<Arc<dyn ModelProvider>, ProviderError> + Send + Sync;

pub trait RunnerFactory: Send + Sync {
    /// Builds a runner for `session_id`. Caching is the caller's concern.
    fn build_runner(
        &self,
        session_id: &SessionId,
        provider: &ProviderSettings,
        tool_endpoints: &[ToolEndpoint],
    ) -> Result<Arc<dyn Runner>, ChatError>;
}

pub struct AgentRunnerFactory {
    sessions: Arc<dyn SessionService>,
    model_clients: Arc<ModelClientFactory>,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
    tool_hooks: Arc<dyn ToolRuntimeHooks>,
    retry_policy: RetryPolicy,
    max_tool_round_trips: usize,
    tool_timeout: Option<Duration>,
    toolsets: Vec<Arc<dyn Toolset>>,
}

impl AgentRunnerFactory {
    pub fn new(sessions: Arc<dyn SessionService>) -> Self {
        Self {
            sessions,
            model_clients: Arc::new(http_model_client),
            provider_hooks: Arc::new(NoopOperationHooks),
            tool_hooks: Arc::new(NoopToolRuntimeHooks),
            retry_policy: RetryPolicy::default(),
            max_tool_round_trips: DEFAULT_MAX_TOOL_ROUND_TRIPS,
            tool_timeout: None,
            toolsets: Vec::new(),
        }
    }

    pub fn with_model_clients<F>(mut self, model_clients: F) -> Self
    where
        F: Fn(&ProviderSettings) -> Result<Arc<dyn ModelProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.model_clients = Arc::new(model_clients);
        self
    }

    pub fn with_provider_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.provider_hooks = hooks;
        self
    }

    pub fn with_tool_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.tool_hooks = hooks;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_max_tool_round_trips(mut self, max_tool_round_trips: usize) -> Self {
        self.max_tool_round_trips = max_tool_round_trips;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// In-process toolset offered to every runner alongside the configured endpoints.
    pub fn with_toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn sessions(&self) -> Arc<dyn SessionService> {
        self.sessions.clone()
    }

    fn endpoint_toolsets(&self, tool_endpoints: &[ToolEndpoint]) -> Vec<Arc<dyn Toolset>> {
        let mut names = self
            .toolsets
            .iter()
            .map(|toolset| toolset.name().to_string())
            .collect::<HashSet<_>>();
        let mut toolsets = self.toolsets.clone();

        for endpoint in tool_endpoints.iter().filter(|endpoint| endpoint.enabled) {
            match endpoint.transport {
                ToolTransport::Http => {
                    if !names.insert(endpoint.id.clone()) {
                        tracing::warn!(endpoint = %endpoint.id, "skipping duplicate tool endpoint");
                        continue;
                    }

                    match McpHttpToolset::new(endpoint.id.clone(), endpoint.url.clone()) {
                        Ok(toolset) => toolsets.push(Arc::new(toolset)),
                        Err(error) => {
                            tracing::warn!(
                                endpoint = %endpoint.id,
                                error = %error,
                                "skipping tool endpoint that failed to initialise"
                            );
                        }
                    }
                }
                ToolTransport::Stdio => {
                    tracing::debug!(
                        endpoint = %endpoint.id,
                        command = %endpoint.command,
                        "skipping stdio tool endpoint"
                    );
                }
            }
        }

        toolsets
    }
}

impl RunnerFactory for AgentRunnerFactory {
    fn build_runner(
        &self,
        session_id: &SessionId,
        provider: &ProviderSettings,
        tool_endpoints: &[ToolEndpoint],
    ) -> Result<Arc<dyn Runner>, ChatError> {
        let model = (self.model_clients)(provider).map_err(|error| {
            ChatError::construction(
                BuildStage::ModelClient,
                format!("failed to create model client: {error}"),
            )
        })?;

        let toolsets = self.endpoint_toolsets(tool_endpoints);
        let toolset_count = toolsets.len();

        let agent = AgentConfig::new().with_toolsets(toolsets);
        agent.validate()?;

        let runner = AgentRunner::builder(agent, model, self.sessions.clone())
            .model_name(provider.model.clone())
            .app_name(APP_NAME)
            .provider_hooks(self.provider_hooks.clone())
            .tool_hooks(self.tool_hooks.clone())
            .retry_policy(self.retry_policy.clone())
            .max_tool_round_trips(self.max_tool_round_trips);
        let runner = match self.tool_timeout {
            Some(timeout) => runner.tool_timeout(timeout),
            None => runner,
        }
        .build()?;

        tracing::info!(
            session_id = %session_id,
            provider = %provider.id,
            model = %provider.model,
            toolsets = toolset_count,
            "runner built"
        );

        Ok(Arc::new(runner))
    }
}

fn http_model_client(
    provider: &ProviderSettings,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    ProviderBuilder::new(provider.kind(), provider.api_key.clone()).build()
}
