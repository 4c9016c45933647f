//! Faculty Directory Scout
//!
//! Finds the faculty directory pages of a university website and turns them
//! into deduplicated, validated profile records.
//!
//! # Pipeline
//!
//! 1. **Discovery** - sitemap, homepage links, search engine and deep crawl
//!    tiers, cheapest first, scored by URL and anchor signals
//! 2. **Classification** - structural heuristics, escalating to a text or
//!    vision model only when they are inconclusive
//! 3. **Extraction** - structural selectors, then a text model, then
//!    vision-derived selectors
//! 4. **Pagination** - next-link following with cycle detection
//! 5. **Filtering** - validation and identity dedup across the run
//!
//! Fetching, model calls, search and storage sit behind the traits in
//! [`traits`]; every call to them is governed by per-domain rate limits,
//! retry budgets and block detection.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use faculty_scout::{DiscoveryMode, HttpGateway, Pipeline, RunLimits, ScoutConfig};
//!
//! let pipeline = Pipeline::new(Arc::new(HttpGateway::new()), ScoutConfig::default());
//! let result = pipeline
//!     .run("https://www.example.edu", DiscoveryMode::Auto, &RunLimits::default())
//!     .await?;
//!
//! for profile in &result.candidates {
//!     println!("{} <{}>", profile.name, profile.email.as_deref().unwrap_or("-"));
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (gateway, classifier, searcher, sink)
//! - [`types`] - Candidates, pages, profiles, results and configuration
//! - [`pipeline`] - Discovery, classification, extraction, pagination, run
//! - [`gateways`] - HTTP fetch gateway
//! - [`searchers`] - Tavily web search
//! - [`testing`] - Mock implementations for testing

pub mod credentials;
pub mod error;
pub mod gateways;
pub mod html;
pub mod names;
pub mod pipeline;
pub mod searchers;
pub mod sitemap;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use credentials::ApiKey;
pub use error::{ClassifierError, FetchError, Result, ScoutError, SearchError, SinkError};
pub use traits::{
    ClassifierInput, ContentClassifier, FetchGateway, Label, PageAction, ProfileBatch, ProfileSink,
    RawRecord, RecordSchema, SearchResult, WebSearcher,
};
pub use types::{
    CandidateUrl, ClassificationMethod, DiscoveryConfidence, DiscoveryMode, ExtractionTier,
    Failure, FailureKind, FetchedPage, PageClassification, PageType, PipelineResult,
    ProfileCandidate, RunLimits, RunOutcome, ScoutConfig, SourceTier,
};

pub use pipeline::Pipeline;

pub use gateways::HttpGateway;
pub use searchers::TavilySearcher;

#[cfg(feature = "openai")]
pub use ai::OpenAiClassifier;

pub use testing::{MemorySink, MockClassifier, MockGateway, MockSearcher};
