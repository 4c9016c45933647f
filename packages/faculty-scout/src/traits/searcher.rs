//! Web search trait for the search-engine discovery tier.

use async_trait::async_trait;
use url::Url;

use crate::error::SearchError;

/// A URL returned by a search provider.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub url: Url,
    pub title: Option<String>,
    pub snippet: Option<String>,

    /// Provider relevance (0.0-1.0), if any
    pub score: Option<f32>,
}

impl SearchResult {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            snippet: None,
            score: None,
        }
    }

    /// Create from a URL string.
    pub fn from_url(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(Self::new)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Open-web search capability.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search for `query`, returning at most `limit` results.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError>;
}
