//! `POST /api/chat`: resolve an agent, run it over the posted conversation, and stream the
//! reply back in the AI-SDK data stream format (one `<type>:<json>` part per line).

use askweb_core::{AgentEvent, Error, Message};
use askweb_local::{budget_exceeded, AgentStream, Registry};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const CHAT_PATH: &str = "/api/chat";
pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";

pub struct AppState {
    registry: Registry,
    default_agent: String,
    max_duration: Duration,
}

impl AppState {
    pub fn new(registry: Registry, default_agent: impl Into<String>, max_duration: Duration) -> Self {
        Self {
            registry,
            default_agent: default_agent.into(),
            max_duration,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatParams {
    #[serde(default)]
    agent: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CHAT_PATH, post(chat))
        .with_state(Arc::new(state))
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, bind: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(
        "chat endpoint listening on http://{}{}",
        listener.local_addr()?,
        CHAT_PATH
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

/// Failure before any output was produced; rendered as a status code plus a JSON body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::AgentNotFound(_) => StatusCode::NOT_FOUND,
        Error::Upstream(_) => StatusCode::BAD_GATEWAY,
        Error::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::UnknownTool(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.0.code(), "message": self.0.to_string() }
        });
        (status_for(&self.0), Json(body)).into_response()
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChatParams>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| Error::InvalidArgument(e.body_text()))?;
    if req.messages.is_empty() {
        return Err(Error::InvalidArgument("messages must not be empty".to_string()).into());
    }
    let agent_id = params
        .agent
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&state.default_agent);
    let agent = state.registry.agent(agent_id).inspect_err(|e| {
        tracing::warn!(agent = agent_id, "{e}");
    })?;
    tracing::info!(
        agent = agent_id,
        model = agent.model_name(),
        messages = req.messages.len(),
        "chat request"
    );

    // The agent task enforces the same budget on its own, so generation stops even
    // when the client stops reading the body.
    let deadline = Instant::now() + state.max_duration;
    let mut stream = agent.stream_with_budget(req.messages, state.max_duration);
    let first = match tokio::time::timeout_at(deadline, stream.next()).await {
        Err(_) => {
            let e = budget_exceeded(state.max_duration);
            tracing::warn!(agent = agent_id, "{e}");
            return Err(e.into());
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(agent = agent_id, code = e.code(), "{e}");
            return Err(e.into());
        }
        Ok(Some(Ok(ev))) => Some(ev),
        Ok(None) => None,
    };

    let pump = Pump {
        pending: first,
        stream: Some(stream),
        deadline,
        budget: state.max_duration,
    };
    let headers = [
        (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
        (HeaderName::from_static(DATA_STREAM_HEADER), "v1"),
    ];
    Ok((headers, Body::from_stream(data_stream(pump))).into_response())
}

struct Pump {
    pending: Option<AgentEvent>,
    stream: Option<AgentStream>,
    deadline: Instant,
    budget: Duration,
}

/// Forward agent events as data stream lines until the agent finishes, fails, or runs out
/// of budget. Dropping the body (client disconnect) drops the `AgentStream`, which aborts
/// generation.
fn data_stream(
    pump: Pump,
) -> impl futures::Stream<Item = Result<String, Infallible>> + Send + 'static {
    futures::stream::unfold(pump, |mut p| async move {
        if let Some(ev) = p.pending.take() {
            return Some((Ok(encode_event(&ev)), p));
        }
        let stream = p.stream.as_mut()?;
        let line = match tokio::time::timeout_at(p.deadline, stream.next()).await {
            Ok(Some(Ok(ev))) => encode_event(&ev),
            Ok(Some(Err(e))) => {
                tracing::warn!(code = e.code(), "stream failed: {e}");
                p.stream = None;
                encode_error(&e)
            }
            Ok(None) => return None,
            Err(_) => {
                let e = budget_exceeded(p.budget);
                tracing::warn!("{e}");
                p.stream = None;
                encode_error(&e)
            }
        };
        Some((Ok(line), p))
    })
}

pub fn encode_event(ev: &AgentEvent) -> String {
    let (tag, payload) = match ev {
        AgentEvent::Text(t) => ('0', serde_json::json!(t)),
        AgentEvent::ToolCall(c) => (
            '9',
            serde_json::json!({ "toolCallId": c.id, "toolName": c.name, "args": c.arguments }),
        ),
        AgentEvent::ToolResult { id, result, .. } => (
            'a',
            serde_json::json!({ "toolCallId": id, "result": result }),
        ),
        AgentEvent::Finish { reason, .. } => {
            ('d', serde_json::json!({ "finishReason": reason.as_str() }))
        }
    };
    format!("{tag}:{payload}\n")
}

pub fn encode_error(e: &Error) -> String {
    format!("3:{}\n", serde_json::json!(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use askweb_core::{ChatModel, FinishReason, FragmentSink, ModelRequest, ModelTurn, ToolCall};
    use askweb_local::ScriptedModel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;

    struct FailingModel;

    #[async_trait::async_trait]
    impl ChatModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(
            &self,
            _req: ModelRequest<'_>,
            _sink: &dyn FragmentSink,
        ) -> askweb_core::Result<ModelTurn> {
            Err(Error::Upstream("provider HTTP 500".to_string()))
        }
    }

    /// Streams one fragment, then stalls past any test budget.
    struct StallingModel {
        first: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl ChatModel for StallingModel {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn generate(
            &self,
            _req: ModelRequest<'_>,
            sink: &dyn FragmentSink,
        ) -> askweb_core::Result<ModelTurn> {
            if let Some(f) = self.first {
                sink.push(f);
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ModelTurn::default())
        }
    }

    /// Pushes large fragments as fast as the sink accepts them, counting each one.
    struct FloodingModel {
        pushed: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ChatModel for FloodingModel {
        fn name(&self) -> &str {
            "flooding"
        }

        async fn generate(
            &self,
            _req: ModelRequest<'_>,
            sink: &dyn FragmentSink,
        ) -> askweb_core::Result<ModelTurn> {
            let fragment = "x".repeat(256 * 1024);
            loop {
                if !sink.push(&fragment) {
                    return Ok(ModelTurn::default());
                }
                self.pushed.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    async fn spawn(model: Arc<dyn ChatModel>, budget: Duration) -> String {
        let state = AppState::new(
            crate::assistant::registry(model),
            crate::assistant::ASSISTANT_AGENT_ID,
            budget,
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}{CHAT_PATH}")
    }

    fn user(text: &str) -> serde_json::Value {
        serde_json::json!({ "messages": [ { "role": "user", "content": text } ] })
    }

    #[test]
    fn parts_use_data_stream_tags() {
        assert_eq!(encode_event(&AgentEvent::Text("hi \"x\"".into())), "0:\"hi \\\"x\\\"\"\n");
        let call = ToolCall {
            id: "c1".into(),
            name: "webSearch".into(),
            arguments: serde_json::json!({ "query": "q" }),
        };
        let line = encode_event(&AgentEvent::ToolCall(call));
        let v: serde_json::Value = serde_json::from_str(line.strip_prefix("9:").unwrap()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "toolCallId": "c1", "toolName": "webSearch", "args": { "query": "q" } })
        );
        assert_eq!(
            encode_event(&AgentEvent::Finish {
                reason: FinishReason::Stop,
                steps: 2
            }),
            "d:{\"finishReason\":\"stop\"}\n"
        );
        assert_eq!(
            encode_error(&Error::Timeout("slow".into())),
            "3:\"timed out: slow\"\n"
        );
    }

    #[tokio::test]
    async fn chat_streams_tool_call_result_and_text() {
        let url = spawn(Arc::new(ScriptedModel::new()), Duration::from_secs(10)).await;
        let resp = reqwest::Client::new()
            .post(&url)
            .json(&user("rust ownership"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK.as_u16());
        assert_eq!(
            resp.headers()
                .get(DATA_STREAM_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("v1")
        );
        let body = resp.text().await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert!(lines[0].starts_with("9:"), "{body}");
        let call: serde_json::Value = serde_json::from_str(&lines[0][2..]).unwrap();
        assert_eq!(call["toolName"].as_str(), Some("webSearch"));
        assert_eq!(call["args"]["query"].as_str(), Some("rust ownership"));

        assert!(lines[1].starts_with("a:"), "{body}");
        let result: serde_json::Value = serde_json::from_str(&lines[1][2..]).unwrap();
        assert_eq!(result["toolCallId"], call["toolCallId"]);
        assert_eq!(result["result"].as_array().map(Vec::len), Some(3));

        let text: String = lines
            .iter()
            .filter_map(|l| l.strip_prefix("0:"))
            .map(|j| serde_json::from_str::<String>(j).unwrap())
            .collect();
        assert!(text.starts_with("webSearch returned 3 results:"), "{text}");
        assert_eq!(lines.last().copied(), Some("d:{\"finishReason\":\"stop\"}"));
    }

    #[tokio::test]
    async fn unknown_agent_is_404() {
        let url = spawn(Arc::new(ScriptedModel::new()), Duration::from_secs(10)).await;
        let resp = reqwest::Client::new()
            .post(format!("{url}?agent=researchAgent"))
            .json(&user("hi"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND.as_u16());
        let v: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(v["error"]["code"].as_str(), Some("agent_not_found"));
    }

    #[tokio::test]
    async fn malformed_or_empty_body_is_400() {
        let url = spawn(Arc::new(ScriptedModel::new()), Duration::from_secs(10)).await;
        let client = reqwest::Client::new();
        for body in [
            serde_json::json!({ "messages": [] }),
            serde_json::json!({ "prompt": "hi" }),
            serde_json::json!({ "messages": "hi" }),
        ] {
            let resp = client.post(&url).json(&body).send().await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16(), "{body}");
            let v: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(v["error"]["code"].as_str(), Some("invalid_argument"));
        }
        let resp = client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16());
    }

    #[tokio::test]
    async fn upstream_failure_before_output_is_502() {
        let url = spawn(Arc::new(FailingModel), Duration::from_secs(10)).await;
        let resp = reqwest::Client::new()
            .post(&url)
            .json(&user("hi"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY.as_u16());
        let v: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(v["error"]["code"].as_str(), Some("upstream_failure"));
    }

    #[tokio::test]
    async fn budget_exceeded_before_output_is_504() {
        let url = spawn(
            Arc::new(StallingModel { first: None }),
            Duration::from_millis(200),
        )
        .await;
        let resp = reqwest::Client::new()
            .post(&url)
            .json(&user("hi"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT.as_u16());
        let v: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(v["error"]["code"].as_str(), Some("timeout"));
    }

    #[tokio::test]
    async fn budget_exceeded_mid_stream_ends_with_error_part() {
        let url = spawn(
            Arc::new(StallingModel {
                first: Some("partial"),
            }),
            Duration::from_millis(200),
        )
        .await;
        let resp = reqwest::Client::new()
            .post(&url)
            .json(&user("hi"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK.as_u16());
        let body = resp.text().await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.first().copied(), Some("0:\"partial\""));
        let last = lines.last().copied().unwrap_or_default();
        assert!(last.starts_with("3:"), "{body}");
        assert!(last.contains("execution budget"), "{body}");
    }

    #[tokio::test]
    async fn messages_are_passed_through_without_a_role_check() {
        let url = spawn(Arc::new(ScriptedModel::new()), Duration::from_secs(10)).await;
        let resp = reqwest::Client::new()
            .post(&url)
            .json(&serde_json::json!({ "messages": [ { "content": "no role", "id": "m1" } ] }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK.as_u16());
        let body = resp.text().await.unwrap();
        assert!(body.lines().any(|l| l.starts_with("0:")), "{body}");
        assert_eq!(
            body.lines().last(),
            Some("d:{\"finishReason\":\"stop\"}"),
            "{body}"
        );
    }

    #[tokio::test]
    async fn budget_stops_generation_when_the_client_never_reads() {
        let pushed = Arc::new(AtomicUsize::new(0));
        let url = spawn(
            Arc::new(FloodingModel {
                pushed: pushed.clone(),
            }),
            Duration::from_millis(200),
        )
        .await;
        let addr = url
            .strip_prefix("http://")
            .and_then(|s| s.strip_suffix(CHAT_PATH))
            .unwrap()
            .to_string();

        // Send the request, then hold the connection open without reading a byte.
        let body = user("hi").to_string();
        let mut conn = tokio::net::TcpStream::connect(&addr).await.unwrap();
        let request = format!(
            "POST {CHAT_PATH} HTTP/1.1\r\nhost: {addr}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        conn.write_all(request.as_bytes()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        let after_budget = pushed.load(Ordering::SeqCst);
        assert!(after_budget > 0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pushed.load(Ordering::SeqCst), after_budget);
        drop(conn);
    }
}
