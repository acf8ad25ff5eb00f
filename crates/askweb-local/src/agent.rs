use askweb_core::{
    AgentEvent, ChatModel, Error, FinishReason, FragmentSink, Message, ModelRequest, Result, Tool,
    ToolCall, ToolDescriptor,
};
use futures_util::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_MAX_STEPS: usize = 5;

/// A named model configuration with instructions and a fixed tool table.
pub struct Agent {
    name: String,
    instructions: String,
    model: Arc<dyn ChatModel>,
    tools: BTreeMap<String, Arc<dyn Tool>>,
    descriptors: Vec<ToolDescriptor>,
    max_steps: usize,
}

pub struct AgentBuilder {
    name: String,
    instructions: String,
    model: Arc<dyn ChatModel>,
    tools: BTreeMap<String, Arc<dyn Tool>>,
    max_steps: usize,
}

impl AgentBuilder {
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Register a tool under its descriptor id. A later tool with the same id replaces
    /// the earlier one.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.descriptor().id.clone(), tool);
        self
    }

    /// Upper bound on model round trips per request (at least 1).
    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = n.max(1);
        self
    }

    pub fn build(self) -> Agent {
        let descriptors = self
            .tools
            .values()
            .map(|t| t.descriptor().clone())
            .collect();
        Agent {
            name: self.name,
            instructions: self.instructions,
            model: self.model,
            tools: self.tools,
            descriptors,
            max_steps: self.max_steps,
        }
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>, model: Arc<dyn ChatModel>) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            instructions: String::new(),
            model,
            tools: BTreeMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Start generating a reply to `messages`.
    ///
    /// Generation runs on its own task and pushes events into the returned stream as
    /// they are produced. Errors end the stream after being yielded once. Dropping the
    /// stream aborts generation.
    pub fn stream(self: &Arc<Self>, messages: Vec<Message>) -> AgentStream {
        self.spawn(messages, None)
    }

    /// Like [`Agent::stream`], but generation is abandoned once `budget` has elapsed,
    /// whether or not anyone is polling the stream. The stream then yields the error
    /// from [`budget_exceeded`] and ends.
    pub fn stream_with_budget(
        self: &Arc<Self>,
        messages: Vec<Message>,
        budget: Duration,
    ) -> AgentStream {
        self.spawn(messages, Some(budget))
    }

    fn spawn(
        self: &Arc<Self>,
        messages: Vec<Message>,
        budget: Option<Duration>,
    ) -> AgentStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = Arc::clone(self);
        let task = tokio::spawn(async move {
            let sink = ChannelSink { tx };
            let outcome = match budget {
                Some(budget) => tokio::time::timeout(budget, agent.run(messages, &sink))
                    .await
                    .unwrap_or_else(|_| Err(budget_exceeded(budget))),
                None => agent.run(messages, &sink).await,
            };
            if let Err(e) = outcome {
                tracing::warn!(agent = %agent.name, error = %e, "generation failed");
                let _ = sink.tx.send(Err(e));
            }
        });
        AgentStream { rx, task }
    }

    async fn run(&self, mut conversation: Vec<Message>, sink: &ChannelSink) -> Result<()> {
        for step in 1..=self.max_steps {
            let turn = self
                .model
                .generate(
                    ModelRequest {
                        instructions: &self.instructions,
                        messages: &conversation,
                        tools: &self.descriptors,
                    },
                    sink,
                )
                .await?;
            if sink.tx.is_closed() {
                tracing::debug!(agent = %self.name, step, "consumer went away; stopping");
                return Ok(());
            }
            if turn.tool_calls.is_empty() {
                sink.emit(AgentEvent::Finish {
                    reason: FinishReason::Stop,
                    steps: step,
                });
                return Ok(());
            }

            conversation.push(Message::assistant_tool_calls(&turn.text, &turn.tool_calls));
            for call in turn.tool_calls {
                sink.emit(AgentEvent::ToolCall(call.clone()));
                let (result, is_error) = match self.call_tool(&call).await {
                    Ok(v) => (v, false),
                    Err(e) => {
                        tracing::debug!(tool = %call.name, error = %e, "tool call rejected");
                        let v = serde_json::json!({
                            "error": { "code": e.code(), "message": e.to_string() }
                        });
                        (v, true)
                    }
                };
                conversation.push(Message::tool_result(&call, &result));
                sink.emit(AgentEvent::ToolResult {
                    id: call.id,
                    name: call.name,
                    result,
                    is_error,
                });
            }
        }
        sink.emit(AgentEvent::Finish {
            reason: FinishReason::Length,
            steps: self.max_steps,
        });
        Ok(())
    }

    async fn call_tool(&self, call: &ToolCall) -> Result<serde_json::Value> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| Error::UnknownTool(call.name.clone()))?;
        tool.validate(&call.arguments)?;
        tool.invoke(&call.arguments).await
    }
}

/// The error reported when generation outlives its execution budget.
pub fn budget_exceeded(budget: Duration) -> Error {
    Error::Timeout(format!(
        "generation exceeded the {}s execution budget",
        budget.as_secs_f64()
    ))
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<Result<AgentEvent>>,
}

impl ChannelSink {
    fn emit(&self, ev: AgentEvent) {
        let _ = self.tx.send(Ok(ev));
    }
}

impl FragmentSink for ChannelSink {
    fn push(&self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(Ok(AgentEvent::Text(fragment.to_string()))).is_ok()
    }
}

/// Forward-only, consume-once stream of agent events.
pub struct AgentStream {
    rx: mpsc::UnboundedReceiver<Result<AgentEvent>>,
    task: JoinHandle<()>,
}

impl Stream for AgentStream {
    type Item = Result<AgentEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for AgentStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Agents addressable by id.
#[derive(Clone, Default)]
pub struct Registry {
    agents: BTreeMap<String, Arc<Agent>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, id: impl Into<String>, agent: Agent) -> Self {
        self.agents.insert(id.into(), Arc::new(agent));
        self
    }

    pub fn agent(&self, id: &str) -> Result<Arc<Agent>> {
        self.agents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::AgentNotFound(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }
}
