//! Typed errors for the faculty scout library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so each collaborator
//! seam (fetch, classifier, search, persistence) reports a strongly-typed
//! failure that the pipeline can scope to the smallest unit of work.

use thiserror::Error;

/// Errors raised by a [`FetchGateway`](crate::traits::gateway::FetchGateway).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request did not complete in time
    #[error("timeout fetching: {url}")]
    Timeout { url: String },

    /// Connection-level failure (DNS, TLS, reset)
    #[error("connection error for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-success HTTP status that is not a block condition
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The gateway detected an anti-automation response
    #[error("blocked at {url}: {reason}")]
    Blocked { url: String, reason: String },

    /// Requests to this domain were disabled earlier in the run
    #[error("domain disabled after block: {domain}")]
    DomainDisabled { domain: String },

    /// Transient failures persisted through every retry
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },

    /// URL already failed permanently in this run
    #[error("not retrying previously failed URL: {url}")]
    PreviouslyFailed { url: String },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The gateway cannot perform this operation (e.g. screenshots)
    #[error("unsupported by gateway: {0}")]
    Unsupported(&'static str),

    /// Run was cancelled or hit its deadline
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether the failure is a block condition (CAPTCHA, login wall, etc.).
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Blocked { .. } | Self::DomainDisabled { .. })
    }
}

/// Errors raised by a [`ContentClassifier`](crate::traits::classifier::ContentClassifier).
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Model call timed out
    #[error("classifier timed out")]
    Timeout,

    /// Transport or provider error
    #[error("classifier request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response did not match the requested schema
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    /// Input kind not supported (e.g. no vision model configured)
    #[error("unsupported classifier input: {0}")]
    Unsupported(&'static str),

    /// Run was cancelled while waiting for a model slot
    #[error("classifier call cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Errors raised by a [`WebSearcher`](crate::traits::searcher::WebSearcher).
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed
    #[error("search request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider returned an error status
    #[error("search provider returned {status}")]
    Status { status: u16 },
}

/// Errors raised by a [`ProfileSink`](crate::traits::sink::ProfileSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// Storage backend failed
    #[error("sink storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Serialization failed
    #[error("sink serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Top-level errors for operations that cannot degrade into a report.
#[derive(Debug, Error)]
pub enum ScoutError {
    /// The root URL could not be parsed or has no host
    #[error("invalid root URL: {url}")]
    InvalidRootUrl { url: String },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for classifier operations.
pub type ClassifierResult<T> = std::result::Result<T, ClassifierError>;

/// Result type alias for top-level operations.
pub type Result<T> = std::result::Result<T, ScoutError>;
