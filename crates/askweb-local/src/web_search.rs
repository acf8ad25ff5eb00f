use crate::mock::MockSearchProvider;
use askweb_core::{
    Error, Result, SearchArgs, SearchProvider, SearchQuery, SearchResult, Tool, ToolDescriptor,
    DEFAULT_LIMIT, MAX_LIMIT,
};
use std::sync::Arc;

/// The `webSearch` agent tool: validated input, provider call, bounded output.
pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    descriptor: ToolDescriptor,
}

impl WebSearchTool {
    pub const ID: &'static str = "webSearch";

    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            descriptor: ToolDescriptor {
                id: Self::ID.to_string(),
                description: "Search the web for information".to_string(),
                input_schema: input_schema(),
                output_schema: output_schema(),
            },
        }
    }

    pub fn mock() -> Self {
        Self::new(Arc::new(MockSearchProvider::new()))
    }
}

/// Run a validated query and enforce the output contract: every record has all three
/// fields populated, and there are at most `q.limit` of them, best-first.
///
/// Shared by the agent tool and the MCP server so both paths behave identically.
pub async fn search_bounded(
    provider: &dyn SearchProvider,
    q: &SearchQuery,
) -> Result<Vec<SearchResult>> {
    let mut results = provider.search(q).await?.results;
    results.retain(|r| !r.title.is_empty() && !r.url.is_empty() && !r.snippet.is_empty());
    results.truncate(q.limit);
    Ok(results)
}

pub fn input_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "minLength": 1,
                "description": "The search query"
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_LIMIT,
                "default": DEFAULT_LIMIT,
                "description": "Number of results to return"
            }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

pub fn output_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "array",
        "maxItems": MAX_LIMIT,
        "items": {
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "url": { "type": "string" },
                "snippet": { "type": "string" }
            },
            "required": ["title", "url", "snippet"]
        }
    })
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn validate(&self, input: &serde_json::Value) -> Result<()> {
        SearchArgs::from_json(input)?.validate().map(|_| ())
    }

    async fn invoke(&self, input: &serde_json::Value) -> Result<serde_json::Value> {
        let q = SearchArgs::from_json(input)?.validate()?;
        let results = search_bounded(self.provider.as_ref(), &q).await?;
        serde_json::to_value(results).map_err(|e| Error::Upstream(e.to_string()))
    }
}
