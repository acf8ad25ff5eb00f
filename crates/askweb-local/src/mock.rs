use askweb_core::{Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};
use std::collections::BTreeMap;
use std::time::Instant;

/// Deterministic stand-in for a real search backend.
///
/// Results are built from a fixed set of templates that mention the query, so two
/// identical queries always produce identical records. Swapping in a real provider only
/// requires another [`SearchProvider`] impl; the tool and MCP layers do the validation
/// and truncation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSearchProvider;

impl MockSearchProvider {
    /// Number of distinct records this provider can return for any query.
    pub const AVAILABLE: usize = 3;

    pub fn new() -> Self {
        Self
    }

    pub fn results(q: &SearchQuery) -> Vec<SearchResult> {
        let query = q.query.as_str();
        let all = [
            (
                format!("Search result 1 for \"{query}\""),
                format!("This is a relevant result about {query}..."),
            ),
            (
                format!("Search result 2 for \"{query}\""),
                format!("Another interesting finding related to {query}..."),
            ),
            (
                format!("Search result 3 for \"{query}\""),
                format!("More information about {query}..."),
            ),
        ];
        all.into_iter()
            .enumerate()
            .take(q.limit)
            .map(|(i, (title, snippet))| SearchResult {
                title,
                url: format!("https://example.com/{}", i + 1),
                snippet,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let results = Self::results(q);
        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        Ok(SearchResponse {
            results,
            provider: self.name().to_string(),
            timings_ms,
        })
    }
}
