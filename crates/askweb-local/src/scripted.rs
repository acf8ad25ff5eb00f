//! Offline, deterministic chat model.
//!
//! No network and no API key. Given a user turn it calls the first available tool once
//! with the user's text as `query`, then streams a short summary of the tool output.
//! With no tools registered it echoes the user. Useful for demos, `doctor`, and
//! end-to-end tests of the agent loop and chat endpoint.

use askweb_core::{ChatModel, FragmentSink, Message, ModelRequest, ModelTurn, Result, ToolCall};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedModel;

impl ScriptedModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, req: ModelRequest<'_>, sink: &dyn FragmentSink) -> Result<ModelTurn> {
        let trailing_results: Vec<&Message> = req
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role() == Some("tool"))
            .collect();

        let reply = if !trailing_results.is_empty() {
            summarize(&trailing_results)
        } else {
            let prompt = req
                .messages
                .iter()
                .rev()
                .find(|m| m.role() == Some("user"))
                .map(|m| m.text())
                .unwrap_or_default();
            let prompt = prompt.trim();
            match req.tools.first() {
                Some(tool) if !prompt.is_empty() => {
                    return Ok(ModelTurn {
                        text: String::new(),
                        tool_calls: vec![ToolCall {
                            id: format!("call_{}", req.messages.len()),
                            name: tool.id.clone(),
                            arguments: serde_json::json!({ "query": prompt }),
                        }],
                    });
                }
                _ if prompt.is_empty() => "How can I help you today?".to_string(),
                _ => format!("You said: {prompt}"),
            }
        };

        let mut text = String::new();
        for word in reply.split_inclusive(' ') {
            text.push_str(word);
            if !sink.push(word) {
                break;
            }
        }
        Ok(ModelTurn {
            text,
            tool_calls: Vec::new(),
        })
    }
}

fn summarize(results: &[&Message]) -> String {
    let mut lines = Vec::new();
    // `results` is newest-first; report in call order.
    for m in results.iter().rev() {
        let tool = m
            .as_value()
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("tool");
        let payload: serde_json::Value =
            serde_json::from_str(&m.text()).unwrap_or(serde_json::Value::Null);
        match payload {
            serde_json::Value::Array(items) if items.is_empty() => {
                lines.push(format!("{tool} returned no results."));
            }
            serde_json::Value::Array(items) => {
                lines.push(format!("{tool} returned {} results:", items.len()));
                for (i, it) in items.iter().enumerate() {
                    let title = it.get("title").and_then(|v| v.as_str()).unwrap_or("?");
                    let url = it.get("url").and_then(|v| v.as_str()).unwrap_or("?");
                    lines.push(format!("{}. {title} ({url})", i + 1));
                }
            }
            other => {
                let msg = other
                    .pointer("/error/message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| m.text());
                lines.push(format!("{tool} failed: {msg}"));
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use askweb_core::Tool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl FragmentSink for Collect {
        fn push(&self, fragment: &str) -> bool {
            self.0.lock().unwrap().push(fragment.to_string());
            true
        }
    }

    #[tokio::test]
    async fn first_turn_requests_the_tool() {
        let tool = crate::web_search::WebSearchTool::mock();
        let tools = vec![tool.descriptor().clone()];
        let msgs = vec![Message::user("rust ownership")];
        let sink = Collect::default();
        let turn = ScriptedModel
            .generate(
                ModelRequest {
                    instructions: "",
                    messages: &msgs,
                    tools: &tools,
                },
                &sink,
            )
            .await
            .unwrap();
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "webSearch");
        assert_eq!(
            turn.tool_calls[0].arguments,
            serde_json::json!({ "query": "rust ownership" })
        );
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_results_are_summarized_and_streamed() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "webSearch".to_string(),
            arguments: serde_json::json!({ "query": "x" }),
        };
        let msgs = vec![
            Message::user("x"),
            Message::assistant_tool_calls("", &[call.clone()]),
            Message::tool_result(
                &call,
                &serde_json::json!([{ "title": "T", "url": "https://example.com/1", "snippet": "S" }]),
            ),
        ];
        let sink = Collect::default();
        let turn = ScriptedModel
            .generate(
                ModelRequest {
                    instructions: "",
                    messages: &msgs,
                    tools: &[],
                },
                &sink,
            )
            .await
            .unwrap();
        assert!(turn.tool_calls.is_empty());
        assert_eq!(
            turn.text,
            "webSearch returned 1 results:\n1. T (https://example.com/1)"
        );
        assert!(sink.0.lock().unwrap().len() > 1);
        assert_eq!(sink.0.lock().unwrap().concat(), turn.text);
    }

    #[tokio::test]
    async fn echoes_without_tools() {
        let msgs = vec![Message::user("hello")];
        let turn = ScriptedModel
            .generate(
                ModelRequest {
                    instructions: "",
                    messages: &msgs,
                    tools: &[],
                },
                &Collect::default(),
            )
            .await
            .unwrap();
        assert_eq!(turn.text, "You said: hello");
    }
}
