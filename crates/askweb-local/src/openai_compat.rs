use crate::env;
use crate::sse::SseDecoder;
use askweb_core::{
    ChatModel, Error, FragmentSink, Message, ModelRequest, ModelTurn, Result, ToolCall,
    ToolDescriptor,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn openai_compat_base_url_from_env() -> Option<String> {
    env("ASKWEB_OPENAI_COMPAT_BASE_URL")
}

fn openai_compat_api_key_from_env() -> Option<String> {
    env("ASKWEB_OPENAI_COMPAT_API_KEY")
}

fn openai_compat_model_from_env() -> Option<String> {
    env("ASKWEB_OPENAI_COMPAT_MODEL")
}

pub(crate) fn is_configured() -> bool {
    openai_compat_base_url_from_env().is_some()
}

/// Streaming chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let base_url = openai_compat_base_url_from_env().ok_or_else(|| {
            Error::NotConfigured("missing ASKWEB_OPENAI_COMPAT_BASE_URL".to_string())
        })?;
        let api_key = openai_compat_api_key_from_env();

        let model = model_override
            .or_else(openai_compat_model_from_env)
            .ok_or_else(|| {
                Error::NotConfigured(
                    "missing model for openai_compat (pass --model or set ASKWEB_OPENAI_COMPAT_MODEL)"
                        .to_string(),
                )
            })?;

        Ok(Self::new(client, base_url, api_key, model))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, req: &ModelRequest<'_>) -> ChatCompletionsRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if !req.instructions.is_empty() {
            messages.push(Message::system(req.instructions).0);
        }
        messages.extend(req.messages.iter().map(|m| m.0.clone()));
        ChatCompletionsRequest {
            model: self.model.clone(),
            messages,
            tools: tool_specs(req.tools),
            stream: true,
        }
    }
}

fn tool_specs(tools: &[ToolDescriptor]) -> Option<Vec<serde_json::Value>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
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
            .collect(),
    )
}

#[async_trait::async_trait]
impl ChatModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn generate(&self, req: ModelRequest<'_>, sink: &dyn FragmentSink) -> Result<ModelTurn> {
        let body = self.request_body(&req);
        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let mut state = StreamState::default();
        let mut decoder = SseDecoder::new();
        let mut bytes = resp.bytes_stream();
        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| Error::Upstream(e.to_string()))?;
            for payload in decoder.push(&chunk)? {
                if !state.apply_payload(&payload, sink)? {
                    break 'read;
                }
            }
        }
        if !state.done {
            for payload in decoder.finish()? {
                if !state.apply_payload(&payload, sink)? {
                    break;
                }
            }
        }
        Ok(state.into_turn())
    }
}

/// Accumulates one streamed completion.
#[derive(Debug, Default)]
struct StreamState {
    text: String,
    // index -> (id, name, arguments so far)
    calls: BTreeMap<usize, (String, String, String)>,
    // Set on `[DONE]` or when the consumer goes away.
    done: bool,
}

impl StreamState {
    /// Apply one SSE payload. Returns `false` when reading should stop, either because
    /// the provider sent `[DONE]` or because the consumer went away.
    fn apply_payload(&mut self, payload: &str, sink: &dyn FragmentSink) -> Result<bool> {
        if payload == "[DONE]" {
            self.done = true;
            return Ok(false);
        }
        let chunk: StreamChunk = serde_json::from_str(payload)
            .map_err(|e| Error::Upstream(format!("malformed stream chunk: {e}")))?;
        if let Some(err) = chunk.error {
            return Err(Error::Upstream(err.message));
        }
        for choice in chunk.choices {
            if let Some(delta) = choice.delta.content.filter(|s| !s.is_empty()) {
                self.text.push_str(&delta);
                if !sink.push(&delta) {
                    self.done = true;
                    return Ok(false);
                }
            }
            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self.calls.entry(tc.index).or_default();
                if let Some(id) = tc.id {
                    entry.0 = id;
                }
                if let Some(f) = tc.function {
                    if let Some(name) = f.name {
                        entry.1.push_str(&name);
                    }
                    if let Some(args) = f.arguments {
                        entry.2.push_str(&args);
                    }
                }
            }
        }
        Ok(true)
    }

    fn into_turn(self) -> ModelTurn {
        let tool_calls = self
            .calls
            .into_iter()
            .map(|(i, (id, name, args))| ToolCall {
                id: if id.is_empty() { format!("call_{i}") } else { id },
                name,
                arguments: parse_arguments(&args),
            })
            .collect();
        ModelTurn {
            text: self.text,
            tool_calls,
        }
    }
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    // Keep unparseable arguments verbatim; tool validation reports them back to the model.
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
