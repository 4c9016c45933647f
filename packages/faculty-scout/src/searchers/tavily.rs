//! Tavily-powered web search.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::ApiKey;
use crate::error::SearchError;
use crate::traits::searcher::{SearchResult, WebSearcher};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    score: Option<f32>,
}

impl TavilyResponse {
    /// Results with parseable URLs, at most `limit`.
    fn into_results(self, limit: usize) -> Vec<SearchResult> {
        self.results
            .into_iter()
            .filter_map(|r| {
                let mut result = SearchResult::from_url(&r.url)?;
                if let Some(title) = r.title {
                    result = result.with_title(title);
                }
                if let Some(content) = r.content {
                    result = result.with_snippet(content);
                }
                if let Some(score) = r.score {
                    result = result.with_score(score.clamp(0.0, 1.0));
                }
                Some(result)
            })
            .take(limit)
            .collect()
    }
}

/// [`WebSearcher`] over the Tavily search API.
pub struct TavilySearcher {
    client: reqwest::Client,
    api_key: ApiKey,
    search_depth: String,
    include_domains: Vec<String>,
    endpoint: String,
}

impl TavilySearcher {
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            search_depth: "basic".to_string(),
            include_domains: Vec::new(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
        }
    }

    /// Create from `TAVILY_API_KEY`, if set.
    pub fn from_env() -> Option<Self> {
        ApiKey::from_env("TAVILY_API_KEY").map(Self::new)
    }

    /// "basic" or "advanced".
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    /// Restrict results to these domains.
    pub fn with_include_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Point at a proxy or test server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let request = TavilyRequest {
            query,
            search_depth: &self.search_depth,
            max_results: limit,
            include_domains: self.include_domains.clone(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", self.api_key.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Http(Box::new(e)))?;

        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: TavilyResponse = response.json().await.map_err(|e| SearchError::Http(Box::new(e)))?;
        let results = body.into_results(limit);
        debug!(query, results = results.len(), "Tavily search finished");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_mapping() {
        let body: TavilyResponse = serde_json::from_str(
            r#"{"query":"x","results":[
                {"url":"https://www.mit.edu/faculty","title":"Faculty","content":"Our faculty","score":0.91},
                {"url":"not a url","title":"bad"},
                {"url":"https://www.mit.edu/people","score":1.7}
            ]}"#,
        )
        .unwrap();
        let results = body.into_results(10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url.as_str(), "https://www.mit.edu/faculty");
        assert_eq!(results[0].title.as_deref(), Some("Faculty"));
        assert_eq!(results[1].score, Some(1.0));
    }

    #[test]
    fn test_request_omits_empty_domains() {
        let request = TavilyRequest {
            query: "MIT faculty directory",
            search_depth: "basic",
            max_results: 5,
            include_domains: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_results"], 5);
        assert!(json.get("include_domains").is_none());
    }

    #[test]
    fn test_builder() {
        let searcher = TavilySearcher::new("tvly-test")
            .with_search_depth("advanced")
            .with_include_domains(["mit.edu"]);
        assert_eq!(searcher.search_depth, "advanced");
        assert_eq!(searcher.include_domains, vec!["mit.edu".to_string()]);
        assert_eq!(searcher.endpoint, TAVILY_SEARCH_URL);
    }
}
