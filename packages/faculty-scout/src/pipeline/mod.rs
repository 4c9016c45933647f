//! The discovery-to-extraction pipeline.
//!
//! Stages, in run order:
//! - [`discovery`]: root URL to ranked candidate directory URLs
//! - [`classify`]: page type of each candidate
//! - [`extract`]: tiered record extraction
//! - [`pagination`]: traversal of multi-page directories
//! - [`filter`]: garbage and duplicate removal
//!
//! [`governor`] wraps the collaborators with politeness and retry policy,
//! and [`run`] ties the stages together.

pub mod classify;
pub mod discovery;
pub mod extract;
pub mod filter;
pub mod governor;
pub mod pagination;
pub mod run;
pub mod scorer;

use std::collections::HashSet;
use std::sync::Mutex;

pub use classify::{PageClassifier, PageSignals};
pub use discovery::{DiscoveryAgent, DiscoveryReport, SkippedTier};
pub use extract::{ExtractionContext, ExtractionEngine, ExtractionOutcome, ExtractionStrategy};
pub use filter::ProfileFilter;
pub use governor::{GovernedClassifier, GovernedGateway, RunGateway, RunLedger};
pub use pagination::{find_next_link, PaginationHandler, PaginationReport, PaginationState};
pub use run::Pipeline;
pub use scorer::UrlScorer;

/// Run-wide set of canonical page keys already processed.
///
/// Shared by every directory of a run so no page is extracted twice.
#[derive(Debug, Default)]
pub struct VisitedSet(Mutex<HashSet<String>>);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key. Returns `false` if it was already claimed.
    pub fn insert(&self, key: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).contains(key)
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
