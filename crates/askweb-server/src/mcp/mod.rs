//! MCP stdio server exposing the mock search contract as the `web_search` tool.
//!
//! stdout carries the protocol; everything else (the ready line included) goes to stderr
//! through `tracing`.

use askweb_core::{SearchArgs, SearchProvider};
use askweb_local::{web_search::search_bounded, MockSearchProvider};
use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

mod envelope;
use envelope::error_payload;

const SCHEMA_VERSION: u64 = 1;
const SERVER_NAME: &str = "Web Search Server";
const SERVER_VERSION: &str = "1.0.0";

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct WebSearchArgs {
    /// Search query (required, non-empty).
    #[serde(default)]
    query: Option<String>,
    /// Number of results to return (default 5, max 10; larger values are clamped).
    #[serde(default)]
    #[schemars(range(min = 1, max = 10))]
    limit: Option<i64>,
}

#[derive(Clone)]
pub(crate) struct SearchServer {
    tool_router: RmcpToolRouter<Self>,
    provider: Arc<dyn SearchProvider>,
}

fn pretty(v: &impl serde::Serialize) -> Result<String, McpError> {
    serde_json::to_string_pretty(v).map_err(|e| McpError::internal_error(e.to_string(), None))
}

#[tool_router]
impl SearchServer {
    pub(crate) fn new() -> Self {
        Self::with_provider(Arc::new(MockSearchProvider::new()))
    }

    pub(crate) fn with_provider(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            provider,
        }
    }

    #[tool(
        description = "Search the web. Returns a JSON array of up to `limit` results (default 5, max 10), each {title, url, snippet}."
    )]
    async fn web_search(
        &self,
        params: Parameters<Option<WebSearchArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let args = params.0.unwrap_or_default();
        let outcome = match (SearchArgs {
            query: args.query,
            limit: args.limit,
        })
        .validate()
        {
            Ok(q) => search_bounded(self.provider.as_ref(), &q).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(results) => {
                tracing::debug!(
                    provider = self.provider.name(),
                    results = results.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "web_search"
                );
                Ok(CallToolResult::success(vec![Content::text(pretty(
                    &results,
                )?)]))
            }
            Err(e) => {
                tracing::debug!(code = e.code(), "web_search rejected: {e}");
                let payload = error_payload(&e, "web_search", t0.elapsed().as_millis());
                Ok(CallToolResult::error(vec![Content::text(pretty(&payload)?)]))
            }
        }
    }
}

#[tool_handler]
impl rmcp::ServerHandler for SearchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Web search server. Call web_search with {query, limit?}; results are a JSON array of {title, url, snippet}."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio() -> Result<(), McpError> {
    let running = SearchServer::new()
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    tracing::info!("Web Search MCP Server started");
    // Keep the stdio server alive until the client closes.
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    tracing::debug!("stdio transport closed");
    Ok(())
}
