use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result count used when a search request does not name one.
pub const DEFAULT_LIMIT: usize = 5;
/// Hard cap on results per search; larger requests are clamped to it.
pub const MAX_LIMIT: usize = 10;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl Error {
    /// Stable machine-readable code, used in HTTP and MCP error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AgentNotFound(_) => "agent_not_found",
            Self::Timeout(_) => "timeout",
            Self::Upstream(_) => "upstream_failure",
            Self::NotConfigured(_) => "not_configured",
            Self::UnknownTool(_) => "unknown_tool",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ---- search contract ----

/// Raw, unvalidated search input as it arrives from a tool call or MCP request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchArgs {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl SearchArgs {
    /// Parse untyped JSON input. Wrong field types are an `InvalidArgument`.
    pub fn from_json(input: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(input.clone()).map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    /// Check the input and resolve the effective limit.
    ///
    /// - `query` must be present and non-empty after trimming.
    /// - `limit` defaults to [`DEFAULT_LIMIT`], must be positive, and is clamped to
    ///   [`MAX_LIMIT`].
    pub fn validate(&self) -> Result<SearchQuery> {
        let query = self.query.as_deref().map(str::trim).unwrap_or_default();
        if query.is_empty() {
            return Err(Error::InvalidArgument(
                "query must be a non-empty string".to_string(),
            ));
        }
        let limit = match self.limit {
            None => DEFAULT_LIMIT,
            Some(n) if n <= 0 => {
                return Err(Error::InvalidArgument(format!(
                    "limit must be positive (got {n})"
                )))
            }
            Some(n) => usize::try_from(n).unwrap_or(MAX_LIMIT).min(MAX_LIMIT),
        };
        Ok(SearchQuery {
            query: query.to_string(),
            limit,
        })
    }
}

/// A validated search request. `limit` is always in `1..=MAX_LIMIT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, limit: Option<i64>) -> Result<Self> {
        SearchArgs {
            query: Some(query.into()),
            limit,
        }
        .validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Best-first, at most `limit` entries.
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

// ---- conversation ----

/// One conversation turn.
///
/// The value is carried as-is from the HTTP body to the model provider. The helpers
/// below only read it; nothing here rewrites caller-supplied turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub serde_json::Value);

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self(serde_json::json!({ "role": "system", "content": text.into() }))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self(serde_json::json!({ "role": "user", "content": text.into() }))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self(serde_json::json!({ "role": "assistant", "content": text.into() }))
    }

    /// Assistant turn that requested tool calls (OpenAI chat shape).
    pub fn assistant_tool_calls(text: &str, calls: &[ToolCall]) -> Self {
        let calls: Vec<serde_json::Value> = calls
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "type": "function",
                    "function": {
                        "name": c.name,
                        "arguments": c.arguments.to_string(),
                    }
                })
            })
            .collect();
        let content = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::json!(text)
        };
        Self(serde_json::json!({
            "role": "assistant",
            "content": content,
            "tool_calls": calls,
        }))
    }

    pub fn tool_result(call: &ToolCall, result: &serde_json::Value) -> Self {
        Self(serde_json::json!({
            "role": "tool",
            "tool_call_id": call.id,
            "name": call.name,
            "content": result.to_string(),
        }))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(|v| v.as_str())
    }

    /// Plain text of the turn: a string `content`, or the `text` parts of an array
    /// `content` joined together. Other shapes yield an empty string.
    pub fn text(&self) -> String {
        match self.0.get("content") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }

    /// Tool calls recorded on an assistant turn built by [`Message::assistant_tool_calls`]
    /// (or any turn using the same shape).
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        let Some(arr) = self.0.get("tool_calls").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        arr.iter()
            .filter_map(|c| {
                let f = c.get("function")?;
                let name = f.get("name")?.as_str()?.to_string();
                let arguments = match f.get("arguments") {
                    Some(serde_json::Value::String(s)) => {
                        serde_json::from_str(s).unwrap_or(serde_json::Value::Null)
                    }
                    Some(v) => v.clone(),
                    None => serde_json::Value::Null,
                };
                Some(ToolCall {
                    id: c
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    name,
                    arguments,
                })
            })
            .collect()
    }
}

// ---- tools ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub description: String,
    /// JSON Schema for the tool input.
    pub input_schema: serde_json::Value,
    /// JSON Schema for the tool output.
    pub output_schema: serde_json::Value,
}

/// A named capability an agent can invoke while generating.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Reject malformed input before any work happens.
    fn validate(&self, input: &serde_json::Value) -> Result<()>;

    async fn invoke(&self, input: &serde_json::Value) -> Result<serde_json::Value>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

// ---- models ----

pub struct ModelRequest<'a> {
    pub instructions: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDescriptor],
}

/// Output of one model round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Receiver for incremental text produced by a model.
pub trait FragmentSink: Send + Sync {
    /// Returns `false` once nobody is listening anymore; callers should stop generating.
    fn push(&self, fragment: &str) -> bool;
}

#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// Run one generation step. Text deltas go to `sink` as they arrive; the full turn
    /// (text plus any requested tool calls) is returned at the end.
    async fn generate(&self, req: ModelRequest<'_>, sink: &dyn FragmentSink) -> Result<ModelTurn>;
}

// ---- agent output ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// One fragment of assistant text.
    Text(String),
    ToolCall(ToolCall),
    ToolResult {
        id: String,
        name: String,
        result: serde_json::Value,
        is_error: bool,
    },
    Finish {
        reason: FinishReason,
        steps: usize,
    },
}
