use crate::env;
use crate::sse::LineBuffer;
use askweb_core::{
    ChatModel, Error, FragmentSink, Message, ModelRequest, ModelTurn, Result, ToolCall,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

pub(crate) fn is_configured() -> bool {
    env("ASKWEB_OLLAMA_BASE_URL").is_some()
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let base_url =
            env("ASKWEB_OLLAMA_BASE_URL").unwrap_or_else(|| "http://127.0.0.1:11434".to_string());
        // A pragmatic default for a small local model that supports tool calling.
        // Users should override this based on what they have installed.
        let model = model_override
            .or_else(|| env("ASKWEB_OLLAMA_MODEL"))
            .unwrap_or_else(|| "qwen2.5:3b-instruct".to_string());
        Ok(Self::new(client, base_url, model))
    }

    fn endpoint_chat(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, req: &ModelRequest<'_>) -> ChatRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.instructions.is_empty() {
            messages.push(Message::system(req.instructions).0);
        }
        messages.extend(req.messages.iter().map(to_ollama_message));
        let tools = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.id,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect::<Vec<_>>();
        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: (!tools.is_empty()).then_some(tools),
            stream: true,
        }
    }
}

/// Ollama wants tool-call arguments as objects and tool results keyed by tool name.
/// Everything else passes through untouched.
fn to_ollama_message(m: &Message) -> serde_json::Value {
    match m.role() {
        Some("assistant") if m.as_value().get("tool_calls").is_some() => {
            let calls: Vec<serde_json::Value> = m
                .tool_calls()
                .into_iter()
                .map(|c| serde_json::json!({ "function": { "name": c.name, "arguments": c.arguments } }))
                .collect();
            serde_json::json!({ "role": "assistant", "content": m.text(), "tool_calls": calls })
        }
        Some("tool") => serde_json::json!({
            "role": "tool",
            "content": m.text(),
            "tool_name": m.as_value().get("name").cloned().unwrap_or(serde_json::Value::Null),
        }),
        _ => m.as_value().clone(),
    }
}

#[async_trait::async_trait]
impl ChatModel for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, req: ModelRequest<'_>, sink: &dyn FragmentSink) -> Result<ModelTurn> {
        let body = self.request_body(&req);
        let resp = self
            .client
            .post(self.endpoint_chat())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("ollama chat HTTP {status}")));
        }

        // Ollama does not assign tool-call ids; derive stable ones from the turn position.
        let id_prefix = format!("call_{}", req.messages.len());
        let mut turn = ModelTurn::default();
        let mut lines = LineBuffer::new();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| Error::Upstream(e.to_string()))?;
            for line in lines.push(&chunk)? {
                if !apply_line(&line, &id_prefix, &mut turn, sink)? {
                    return Ok(turn);
                }
            }
        }
        if let Some(rest) = lines.finish()? {
            apply_line(&rest, &id_prefix, &mut turn, sink)?;
        }
        Ok(turn)
    }
}

/// Apply one NDJSON line. Returns `false` once the response is done or the consumer left.
fn apply_line(
    line: &str,
    id_prefix: &str,
    turn: &mut ModelTurn,
    sink: &dyn FragmentSink,
) -> Result<bool> {
    if line.trim().is_empty() {
        return Ok(true);
    }
    let parsed: ChatChunk = serde_json::from_str(line)
        .map_err(|e| Error::Upstream(format!("malformed ollama chunk: {e}")))?;
    if let Some(err) = parsed.error {
        return Err(Error::Upstream(err));
    }
    if let Some(msg) = parsed.message {
        if !msg.content.is_empty() {
            turn.text.push_str(&msg.content);
            if !sink.push(&msg.content) {
                return Ok(false);
            }
        }
        for c in msg.tool_calls {
            let n = turn.tool_calls.len();
            turn.tool_calls.push(ToolCall {
                id: format!("{id_prefix}_{n}"),
                name: c.function.name,
                arguments: c.function.arguments,
            });
        }
    }
    Ok(!parsed.done)
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    function: ChunkFunction,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}
