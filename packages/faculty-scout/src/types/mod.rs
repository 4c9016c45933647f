//! Core data types for the scout pipeline.

pub mod candidate;
pub mod config;
pub mod page;
pub mod profile;
pub mod result;
pub mod url_key;

pub use candidate::{CandidateSet, CandidateUrl, SourceTier};
pub use config::{
    ClassifierConfig, DiscoveryConfig, DiscoveryMode, ExtractionConfig, GovernorConfig,
    PaginationConfig, RunLimits, ScoringConfig, ScoutConfig,
};
pub use page::{
    ClassificationMethod, FetchedPage, LinkPosition, PageClassification, PageLink, PageType,
};
pub use profile::{ExtractionTier, IdentityKey, MalformedReason, ProfileCandidate};
pub use result::{
    assess_outcome, DiscoveryConfidence, Failure, FailureKind, PipelineResult, RunOutcome,
};
pub use url_key::{normalize_url, registrable_domain};
