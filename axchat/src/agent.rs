//! Model-backed agent runner with a bounded tool-call loop.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use axcommon::{RetryPolicy, SessionId};
use axprovider::{
    BoxedEventStream, Message, ModelProvider, ModelRequest, ModelResponse, NoopOperationHooks,
    OutputItem, ProviderError, ProviderKind, ProviderOperationHooks, Role, StopReason,
    StreamEvent, TokenUsage, ToolCall, ToolResult, execute_with_retry,
};
use axstore::{DEFAULT_USER_ID, JsonMap};
use axtooling::{
    DefaultToolRuntime, NoopToolRuntimeHooks, ToolExecutionContext, ToolRegistry, ToolRuntime,
    ToolRuntimeHooks, Toolset, parse_json_object,
};
use futures_timer::Delay;
use futures_util::StreamExt;
use serde_json::Value;

use crate::runner::{ContentPart, RunConfig, Runner, TurnEvent, TurnEventStream};
use crate::session::{APP_NAME, SessionKey, SessionService};
use crate::{BuildStage, ChatError};

pub const AGENT_NAME: &str = "axe-agent";
pub const AGENT_DESCRIPTION: &str = "Axe Desktop Assistant";
pub const AGENT_INSTRUCTION: &str = "You are a helpful AI assistant. Search the web when needed.";

pub const MAX_TOOL_ROUNDS_CODE: &str = "MAX_TOOL_ROUNDS";
pub const CONTENT_FILTERED_CODE: &str = "CONTENT_FILTERED";

pub const DEFAULT_MAX_TOOL_ROUND_TRIPS: usize = 8;

#[derive(Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub toolsets: Vec<Arc<dyn Toolset>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: AGENT_NAME.to_string(),
            description: AGENT_DESCRIPTION.to_string(),
            instruction: AGENT_INSTRUCTION.to_string(),
            toolsets: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    pub fn with_toolsets(mut self, toolsets: impl IntoIterator<Item = Arc<dyn Toolset>>) -> Self {
        self.toolsets.extend(toolsets);
        self
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ChatError::construction(
                BuildStage::Agent,
                "agent name must not be empty",
            ));
        }

        // "user" attributes events to the human side of the conversation.
        if name == "user" {
            return Err(ChatError::construction(
                BuildStage::Agent,
                "agent name 'user' is reserved",
            ));
        }

        let mut seen = HashSet::new();
        for toolset in &self.toolsets {
            if !seen.insert(toolset.name()) {
                return Err(ChatError::construction(
                    BuildStage::Agent,
                    format!("toolset '{}' is registered twice", toolset.name()),
                ));
            }
        }

        Ok(())
    }
}

impl Debug for AgentConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let toolsets = self
            .toolsets
            .iter()
            .map(|toolset| toolset.name())
            .collect::<Vec<_>>();

        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("instruction", &self.instruction)
            .field("toolsets", &toolsets)
            .finish()
    }
}

pub struct AgentRunnerBuilder {
    agent: AgentConfig,
    model: Arc<dyn ModelProvider>,
    sessions: Arc<dyn SessionService>,
    model_name: String,
    app_name: String,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
    tool_hooks: Arc<dyn ToolRuntimeHooks>,
    retry_policy: RetryPolicy,
    max_tool_round_trips: usize,
    tool_timeout: Option<Duration>,
}

impl AgentRunnerBuilder {
    pub fn new(
        agent: AgentConfig,
        model: Arc<dyn ModelProvider>,
        sessions: Arc<dyn SessionService>,
    ) -> Self {
        Self {
            agent,
            model,
            sessions,
            model_name: String::new(),
            app_name: APP_NAME.to_string(),
            provider_hooks: Arc::new(NoopOperationHooks),
            tool_hooks: Arc::new(NoopToolRuntimeHooks),
            retry_policy: RetryPolicy::default(),
            max_tool_round_trips: DEFAULT_MAX_TOOL_ROUND_TRIPS,
            tool_timeout: None,
        }
    }

    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn provider_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.provider_hooks = hooks;
        self
    }

    pub fn tool_hooks(mut self, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        self.tool_hooks = hooks;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn max_tool_round_trips(mut self, max_tool_round_trips: usize) -> Self {
        self.max_tool_round_trips = max_tool_round_trips;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<AgentRunner, ChatError> {
        if self.app_name.trim().is_empty() {
            return Err(ChatError::construction(
                BuildStage::Runner,
                "runner app name must not be empty",
            ));
        }

        if self.model_name.trim().is_empty() {
            return Err(ChatError::construction(
                BuildStage::Runner,
                "runner model name must not be empty",
            ));
        }

        Ok(AgentRunner {
            agent: self.agent,
            model: self.model,
            sessions: self.sessions,
            model_name: self.model_name,
            app_name: self.app_name,
            provider_hooks: self.provider_hooks,
            tool_hooks: self.tool_hooks,
            retry_policy: self.retry_policy,
            max_tool_round_trips: self.max_tool_round_trips,
            tool_timeout: self.tool_timeout,
        })
    }
}

/// Runs turns against one model, resolving tools from the agent's toolsets on every run.
pub struct AgentRunner {
    agent: AgentConfig,
    model: Arc<dyn ModelProvider>,
    sessions: Arc<dyn SessionService>,
    model_name: String,
    app_name: String,
    provider_hooks: Arc<dyn ProviderOperationHooks>,
    tool_hooks: Arc<dyn ToolRuntimeHooks>,
    retry_policy: RetryPolicy,
    max_tool_round_trips: usize,
    tool_timeout: Option<Duration>,
}

impl AgentRunner {
    pub fn builder(
        agent: AgentConfig,
        model: Arc<dyn ModelProvider>,
        sessions: Arc<dyn SessionService>,
    ) -> AgentRunnerBuilder {
        AgentRunnerBuilder::new(agent, model, sessions)
    }

    pub fn agent(&self) -> &AgentConfig {
        &self.agent
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    async fn tool_runtime(&self) -> DefaultToolRuntime {
        let mut registry = ToolRegistry::new();
        for toolset in &self.agent.toolsets {
            match toolset.tools().await {
                Ok(tools) => {
                    for tool in tools {
                        registry.register_shared(tool);
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        toolset = toolset.name(),
                        error = %error,
                        "skipping toolset that failed to resolve"
                    );
                }
            }
        }

        let runtime =
            DefaultToolRuntime::new(Arc::new(registry)).with_hooks(self.tool_hooks.clone());
        match self.tool_timeout {
            Some(timeout) => runtime.with_timeout(timeout),
            None => runtime,
        }
    }

    async fn open_stream(
        &self,
        request: ModelRequest,
    ) -> Result<BoxedEventStream<'_>, ProviderError> {
        execute_with_retry(
            self.model.kind(),
            "stream",
            &self.retry_policy,
            self.provider_hooks.as_ref(),
            |_attempt| self.model.stream(request.clone()),
            Delay::new,
        )
        .await
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        execute_with_retry(
            self.model.kind(),
            "complete",
            &self.retry_policy,
            self.provider_hooks.as_ref(),
            |_attempt| self.model.complete(request.clone()),
            Delay::new,
        )
        .await
    }
}

impl Runner for AgentRunner {
    fn run(
        &self,
        session_id: SessionId,
        user_content: String,
        config: RunConfig,
    ) -> TurnEventStream<'_> {
        let streaming = config.streaming_mode.is_streaming();

        Box::pin(try_stream! {
            let key = SessionKey::new(self.app_name.clone(), DEFAULT_USER_ID, session_id.clone());
            let mut history = self.sessions.history(&key).await?;
            let user = Message::new(Role::User, user_content);
            self.sessions.append(&key, vec![user.clone()]).await?;
            history.push(user);

            let runtime = self.tool_runtime().await;
            let definitions = runtime.registry().definitions();
            let context = ToolExecutionContext::new(session_id.clone())
                .with_metadata("agent", self.agent.name.clone());
            let mut round_trips = 0_usize;

            loop {
                let request = ModelRequest::builder(self.model_name.clone())
                    .system(self.agent.instruction.clone())
                    .messages(history.clone())
                    .tools(definitions.clone())
                    .streaming(streaming)
                    .build()
                    .map_err(ChatError::from)?;

                let mut delivered_text = false;
                let response = if streaming {
                    let mut stream = self.open_stream(request).await.map_err(ChatError::from)?;
                    let mut text = String::new();
                    let mut pending_calls = BTreeMap::<String, ToolCall>::new();
                    let mut completed = None;

                    while let Some(event) = stream.next().await {
                        match event.map_err(ChatError::from)? {
                            StreamEvent::TextDelta(delta) => {
                                if !delta.is_empty() {
                                    text.push_str(&delta);
                                    delivered_text = true;
                                    yield TurnEvent::text(delta);
                                }
                            }
                            StreamEvent::ToolCallDelta(call) => {
                                pending_calls.insert(call.id.clone(), call);
                            }
                            StreamEvent::MessageComplete(_) => {}
                            StreamEvent::ResponseComplete(response) => completed = Some(response),
                        }
                    }

                    completed.unwrap_or_else(|| {
                        assemble_response(self.model.kind(), &self.model_name, text, pending_calls)
                    })
                } else {
                    self.complete(request).await.map_err(ChatError::from)?
                };

                if response.stop_reason == StopReason::ContentFiltered {
                    yield TurnEvent::error(
                        CONTENT_FILTERED_CODE,
                        "the model withheld its response because of content filtering",
                    );
                    break;
                }

                let text = response.text();
                if !delivered_text && !text.is_empty() {
                    yield TurnEvent::text(text.clone());
                }

                let calls = response.tool_calls();
                if calls.is_empty() {
                    self.sessions
                        .append(&key, vec![Message::new(Role::Assistant, text)])
                        .await?;
                    yield TurnEvent::Done;
                    break;
                }

                if round_trips >= self.max_tool_round_trips {
                    yield TurnEvent::error(
                        MAX_TOOL_ROUNDS_CODE,
                        format!(
                            "tool loop exceeded {} round trips",
                            self.max_tool_round_trips
                        ),
                    );
                    break;
                }
                round_trips += 1;

                yield TurnEvent::Content(calls.iter().map(function_call_part).collect());

                let mut round_messages = vec![Message::assistant_with_tool_calls(text, calls.clone())];
                for call in calls {
                    let result = match runtime.execute(call.clone(), context.clone()).await {
                        Ok(result) => result.into_tool_result(),
                        Err(error) => {
                            tracing::warn!(
                                session_id = %session_id,
                                tool = %call.name,
                                error = %error,
                                "tool call failed"
                            );
                            ToolResult {
                                tool_call_id: call.id.clone(),
                                tool_name: call.name.clone(),
                                output: error.message,
                                is_error: true,
                            }
                        }
                    };

                    yield TurnEvent::Content(vec![function_response_part(&result)]);
                    round_messages.push(Message::tool(result));
                }

                self.sessions.append(&key, round_messages.clone()).await?;
                history.extend(round_messages);
            }
        })
    }
}

fn assemble_response(
    provider: ProviderKind,
    model: &str,
    text: String,
    calls: BTreeMap<String, ToolCall>,
) -> ModelResponse {
    let stop_reason = if calls.is_empty() {
        StopReason::EndTurn
    } else {
        StopReason::ToolUse
    };

    let mut output = Vec::new();
    if !text.is_empty() {
        output.push(OutputItem::Message(Message::new(Role::Assistant, text)));
    }
    output.extend(calls.into_values().map(OutputItem::ToolCall));

    ModelResponse {
        provider,
        model: model.to_string(),
        output,
        stop_reason,
        usage: TokenUsage::default(),
    }
}

fn function_call_part(call: &ToolCall) -> ContentPart {
    let args = parse_json_object(&call.arguments).unwrap_or_else(|_| {
        let mut raw = JsonMap::new();
        raw.insert(
            "arguments".to_string(),
            Value::String(call.arguments.clone()),
        );
        raw
    });

    ContentPart::FunctionCall {
        id: call.id.clone(),
        name: call.name.clone(),
        args,
    }
}

fn function_response_part(result: &ToolResult) -> ContentPart {
    let mut response = JsonMap::new();
    if result.is_error {
        response.insert("error".to_string(), Value::String(result.output.clone()));
    } else {
        response.insert("output".to_string(), Value::String(result.output.clone()));
    }

    ContentPart::FunctionResponse {
        id: result.tool_call_id.clone(),
        name: result.tool_name.clone(),
        response,
        error: result.is_error.then(|| result.output.clone()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use axprovider::{ProviderFuture, ToolDefinition, VecEventStream};
    use axtooling::{FunctionTool, StaticToolset, Tool, ToolError};

    use super::*;
    use crate::runner::StreamingMode;
    use crate::session::InMemorySessionService;

    struct ScriptedModel {
        responses: Mutex<VecDeque<ModelResponse>>,
        requests: Mutex<Vec<ModelRequest>>,
        transient_failures: Mutex<u32>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ModelResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                transient_failures: Mutex::new(0),
            }
        }

        fn failing_first(self, failures: u32) -> Self {
            *self.transient_failures.lock().expect("failures lock") = failures;
            self
        }

        fn next(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            self.requests.lock().expect("requests lock").push(request);
            let mut failures = self.transient_failures.lock().expect("failures lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(ProviderError::transport("connection reset"));
            }

            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .ok_or_else(|| ProviderError::other("script exhausted"))
        }
    }

    impl ModelProvider for ScriptedModel {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }

        fn complete<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
            Box::pin(async move { self.next(request) })
        }

        fn stream<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async move {
                let response = self.next(request)?;
                let mut events = response
                    .text()
                    .split_inclusive(' ')
                    .map(|chunk| Ok(StreamEvent::TextDelta(chunk.to_string())))
                    .collect::<Vec<_>>();
                events.push(Ok(StreamEvent::ResponseComplete(response)));
                Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
            })
        }
    }

    fn text_response(text: &str) -> ModelResponse {
        assemble_response(ProviderKind::Gemini, "gemini-2.0-flash", text.to_string(), BTreeMap::new())
    }

    fn tool_response(id: &str, name: &str, arguments: &str) -> ModelResponse {
        let mut calls = BTreeMap::new();
        calls.insert(
            id.to_string(),
            ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        );
        assemble_response(ProviderKind::Gemini, "gemini-2.0-flash", String::new(), calls)
    }

    fn search_toolset() -> Arc<dyn Toolset> {
        let search: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            ToolDefinition {
                name: "web_search".to_string(),
                description: "Searches the web".to_string(),
                input_schema: r#"{"type":"object"}"#.to_string(),
            },
            |args, _ctx| async move {
                let args = parse_json_object(&args)?;
                match args.get("query").and_then(Value::as_str) {
                    Some(query) => Ok(format!("3 results for {query}")),
                    None => Err(ToolError::invalid_arguments("query is required")),
                }
            },
        ));
        Arc::new(StaticToolset::new("search", vec![search]))
    }

    fn runner(model: Arc<ScriptedModel>, sessions: Arc<InMemorySessionService>) -> AgentRunner {
        AgentRunner::builder(
            AgentConfig::new().with_toolset(search_toolset()),
            model,
            sessions,
        )
        .model_name("gemini-2.0-flash")
        .retry_policy(RetryPolicy::new(3).with_initial_backoff(Duration::ZERO))
        .build()
        .expect("runner should build")
    }

    async fn collect(runner: &AgentRunner, text: &str, mode: StreamingMode) -> Vec<Result<TurnEvent, ChatError>> {
        runner
            .run(
                SessionId::new("s-1"),
                text.to_string(),
                RunConfig { streaming_mode: mode },
            )
            .collect()
            .await
    }

    #[tokio::test]
    async fn streaming_run_yields_deltas_and_records_history() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("Hi there")]));
        let sessions = Arc::new(InMemorySessionService::new());
        let runner = runner(model.clone(), sessions.clone());

        let events = collect(&runner, "hello", StreamingMode::Sse).await;
        let events = events
            .into_iter()
            .map(|event| event.expect("event should be ok"))
            .collect::<Vec<_>>();

        assert_eq!(
            events,
            vec![TurnEvent::text("Hi "), TurnEvent::text("there"), TurnEvent::Done]
        );

        let history = sessions
            .history(&SessionKey::desktop("s-1"))
            .await
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::new(Role::User, "hello"));
        assert_eq!(history[1], Message::new(Role::Assistant, "Hi there"));

        let requests = model.requests.lock().expect("requests lock");
        assert!(requests[0].options.stream);
        assert_eq!(requests[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn non_streaming_run_yields_one_aggregated_text() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("OK")]));
        let runner = runner(model.clone(), Arc::new(InMemorySessionService::new()));

        let events = collect(&runner, "ping", StreamingMode::None).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(TurnEvent::text("OK")));
        assert_eq!(events[1], Ok(TurnEvent::Done));
        assert!(!model.requests.lock().expect("requests lock")[0].options.stream);
    }

    #[tokio::test]
    async fn tool_calls_are_executed_and_fed_back_to_the_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_response("call-1", "web_search", r#"{"query":"rust"}"#),
            text_response("Found it"),
        ]));
        let sessions = Arc::new(InMemorySessionService::new());
        let runner = runner(model.clone(), sessions.clone());

        let events = collect(&runner, "search rust", StreamingMode::None).await;
        let events = events
            .into_iter()
            .map(|event| event.expect("event should be ok"))
            .collect::<Vec<_>>();

        assert!(matches!(
            &events[0],
            TurnEvent::Content(parts) if matches!(
                &parts[0],
                ContentPart::FunctionCall { name, args, .. } if name == "web_search" && args["query"] == "rust"
            )
        ));
        assert!(matches!(
            &events[1],
            TurnEvent::Content(parts) if matches!(
                &parts[0],
                ContentPart::FunctionResponse { response, error: None, .. } if response["output"] == "3 results for rust"
            )
        ));
        assert_eq!(events[2], TurnEvent::text("Found it"));
        assert_eq!(events[3], TurnEvent::Done);

        let requests = model.requests.lock().expect("requests lock");
        let second = &requests[1];
        let tool_message = second.messages.last().expect("tool message should be sent");
        assert_eq!(tool_message.role, Role::Tool);
        assert_eq!(tool_message.content, "3 results for rust");

        let history = sessions
            .history(&SessionKey::desktop("s-1"))
            .await
            .expect("history");
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn failing_tools_become_error_responses() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_response("call-1", "web_search", "{}"),
            text_response("Sorry"),
        ]));
        let runner = runner(model, Arc::new(InMemorySessionService::new()));

        let events = collect(&runner, "search", StreamingMode::None).await;
        let failure = events
            .iter()
            .find_map(|event| match event {
                Ok(TurnEvent::Content(parts)) => parts.iter().find_map(|part| match part {
                    ContentPart::FunctionResponse { error, .. } => error.clone(),
                    _ => None,
                }),
                _ => None,
            })
            .expect("tool failure should be reported");

        assert!(failure.contains("query is required"));
        assert_eq!(events.last(), Some(&Ok(TurnEvent::Done)));
    }

    #[tokio::test]
    async fn tool_loop_stops_after_max_round_trips() {
        let responses = (0..4)
            .map(|round| tool_response(&format!("call-{round}"), "web_search", r#"{"query":"loop"}"#))
            .collect();
        let model = Arc::new(ScriptedModel::new(responses));
        let runner = AgentRunner::builder(
            AgentConfig::new().with_toolset(search_toolset()),
            model,
            Arc::new(InMemorySessionService::new()),
        )
        .model_name("gemini-2.0-flash")
        .max_tool_round_trips(2)
        .build()
        .expect("runner should build");

        let events = collect(&runner, "loop forever", StreamingMode::None).await;
        assert!(matches!(
            events.last(),
            Some(Ok(TurnEvent::Error { code, .. })) if code == MAX_TOOL_ROUNDS_CODE
        ));
    }

    #[tokio::test]
    async fn content_filtered_responses_surface_as_error_events() {
        let mut blocked = text_response("");
        blocked.stop_reason = StopReason::ContentFiltered;
        let runner = runner(
            Arc::new(ScriptedModel::new(vec![blocked])),
            Arc::new(InMemorySessionService::new()),
        );

        let events = collect(&runner, "something", StreamingMode::Sse).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            Ok(TurnEvent::Error { code, .. }) if code == CONTENT_FILTERED_CODE
        ));
    }

    #[tokio::test]
    async fn transient_open_failures_are_retried() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("recovered")]).failing_first(2));
        let runner = runner(model.clone(), Arc::new(InMemorySessionService::new()));

        let events = collect(&runner, "hello", StreamingMode::Sse).await;
        assert_eq!(events.last(), Some(&Ok(TurnEvent::Done)));
        assert_eq!(model.requests.lock().expect("requests lock").len(), 3);
    }

    #[tokio::test]
    async fn provider_failures_end_the_stream_with_an_error() {
        let model = Arc::new(ScriptedModel::new(Vec::new()));
        let runner = runner(model, Arc::new(InMemorySessionService::new()));

        let events = collect(&runner, "hello", StreamingMode::None).await;
        assert_eq!(events.len(), 1);
        let error = events[0].clone().expect_err("provider failure should surface");
        assert_eq!(error.kind, crate::ChatErrorKind::Provider);
    }

    #[test]
    fn agent_validation_rejects_reserved_names_and_duplicate_toolsets() {
        let mut agent = AgentConfig::new();
        agent.name = "user".to_string();
        let error = agent.validate().expect_err("reserved name should fail");
        assert_eq!(error.stage, Some(BuildStage::Agent));

        let duplicated = AgentConfig::new()
            .with_toolset(search_toolset())
            .with_toolset(search_toolset());
        assert!(duplicated.validate().is_err());
        assert!(AgentConfig::new().validate().is_ok());
    }

    #[test]
    fn runner_build_requires_model_name() {
        let error = AgentRunner::builder(
            AgentConfig::new(),
            Arc::new(ScriptedModel::new(Vec::new())),
            Arc::new(InMemorySessionService::new()),
        )
        .build()
        .err()
        .expect("missing model name should fail");

        assert_eq!(error.stage, Some(BuildStage::Runner));
    }
}
