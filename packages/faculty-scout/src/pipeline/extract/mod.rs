//! Extraction engine: an ordered chain of strategies tried until one
//! produces records.
//!
//! The standard chain is structural → textual model → visual model. New
//! tiers are added by implementing [`ExtractionStrategy`]; the engine never
//! branches on a concrete tier.

pub mod structural;
pub mod textual;
pub mod visual;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::traits::classifier::ContentClassifier;
use crate::traits::gateway::FetchGateway;
use crate::types::config::ExtractionConfig;
use crate::types::page::FetchedPage;
use crate::types::profile::{ExtractionTier, ProfileCandidate};
use crate::types::result::{Failure, FailureKind};

pub use structural::StructuralStrategy;
pub use textual::TextualStrategy;
pub use visual::VisualStrategy;

/// Per-page facts a strategy may consult.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Zero for the first page of a directory
    pub page_index: usize,

    /// Whether expensive visual extraction is allowed on this page
    pub visual_allowed: bool,

    /// Item selector validated on an earlier page of the same directory
    pub selector: Option<String>,
}

impl ExtractionContext {
    pub fn first_page() -> Self {
        Self {
            page_index: 0,
            visual_allowed: true,
            selector: None,
        }
    }

    pub fn follow_up(page_index: usize, visual_allowed: bool) -> Self {
        Self {
            page_index,
            visual_allowed,
            selector: None,
        }
    }

    /// Carry a known-good item selector to this page.
    pub fn with_selector(mut self, selector: Option<String>) -> Self {
        self.selector = selector;
        self
    }
}

/// Result of one strategy on one page.
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Records produced (already validated)
    Extracted {
        records: Vec<ProfileCandidate>,
        malformed: usize,
        /// Item selector that produced the records, reusable on later pages
        selector: Option<String>,
    },
    /// The strategy did not apply or under-produced
    Declined { reason: String, malformed: usize },
}

impl Attempt {
    pub fn extracted(records: Vec<ProfileCandidate>) -> Self {
        Self::Extracted {
            records,
            malformed: 0,
            selector: None,
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self::Declined {
            reason: reason.into(),
            malformed: 0,
        }
    }

    /// Record the item selector behind extracted records.
    pub fn with_selector(mut self, css: impl Into<String>) -> Self {
        if let Self::Extracted { selector, .. } = &mut self {
            *selector = Some(css.into());
        }
        self
    }

    /// Record how many model records failed validation.
    pub fn with_malformed(mut self, count: usize) -> Self {
        match &mut self {
            Self::Extracted { malformed, .. } | Self::Declined { malformed, .. } => *malformed = count,
        }
        self
    }
}

/// One tier of the extraction chain.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Tier this strategy reports as `tier_used`.
    fn tier(&self) -> ExtractionTier;

    /// Whether the strategy should run for this page.
    fn applies(&self, _ctx: &ExtractionContext) -> bool {
        true
    }

    /// Extract every record on a listing page.
    async fn attempt(&self, page: &FetchedPage, ctx: &ExtractionContext) -> Attempt;

    /// Extract the one person a profile page is about.
    async fn attempt_single(&self, _page: &FetchedPage, _ctx: &ExtractionContext) -> Option<ProfileCandidate> {
        None
    }
}

/// What the engine produced for one page.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub url: String,
    pub records: Vec<ProfileCandidate>,

    /// Tier that succeeded
    pub tier_used: Option<ExtractionTier>,

    /// Tiers tried, in order
    pub tiers_attempted: Vec<ExtractionTier>,

    /// Model records dropped by validation
    pub malformed: usize,

    /// Item selector behind the records, when the tier applied one
    pub selector: Option<String>,

    /// Set when every tier declined
    pub failure: Option<Failure>,
}

impl ExtractionOutcome {
    fn empty(url: &str) -> Self {
        Self {
            url: url.to_string(),
            records: Vec::new(),
            tier_used: None,
            tiers_attempted: Vec::new(),
            malformed: 0,
            selector: None,
            failure: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.tier_used.is_some()
    }
}

/// Ordered strategy chain.
pub struct ExtractionEngine {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionEngine {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Structural, then textual and visual model tiers when a classifier
    /// is available.
    pub fn standard(
        config: &ExtractionConfig,
        classifier: Option<Arc<dyn ContentClassifier>>,
        gateway: Arc<dyn FetchGateway>,
    ) -> Self {
        let mut strategies: Vec<Box<dyn ExtractionStrategy>> =
            vec![Box::new(StructuralStrategy::new(config.clone()))];
        if let Some(classifier) = classifier {
            strategies.push(Box::new(TextualStrategy::new(classifier.clone(), config.clone())));
            if config.visual_tier {
                strategies.push(Box::new(VisualStrategy::new(classifier, gateway, config.clone())));
            }
        }
        Self::new(strategies)
    }

    pub fn tiers(&self) -> Vec<ExtractionTier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    /// Run the chain on a listing page until a tier produces records.
    pub async fn extract(&self, page: &FetchedPage, ctx: &ExtractionContext) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::empty(&page.final_url);
        let mut reasons = Vec::new();

        for strategy in &self.strategies {
            if !strategy.applies(ctx) {
                continue;
            }
            let tier = strategy.tier();
            outcome.tiers_attempted.push(tier);

            match strategy.attempt(page, ctx).await {
                Attempt::Extracted {
                    records,
                    malformed,
                    selector,
                } if !records.is_empty() => {
                    outcome.malformed += malformed;
                    outcome.tier_used = Some(tier);
                    outcome.records = records;
                    outcome.selector = selector;
                    debug!(
                        url = %page.final_url,
                        tier = %tier,
                        records = outcome.records.len(),
                        "Extraction tier succeeded"
                    );
                    return outcome;
                }
                Attempt::Extracted { malformed, .. } => {
                    outcome.malformed += malformed;
                    reasons.push(format!("{tier}: no records"));
                }
                Attempt::Declined { reason, malformed } => {
                    outcome.malformed += malformed;
                    debug!(url = %page.final_url, tier = %tier, reason = %reason, "Extraction tier declined");
                    reasons.push(format!("{tier}: {reason}"));
                }
            }
        }

        let last_tier = outcome
            .tiers_attempted
            .last()
            .copied()
            .unwrap_or(ExtractionTier::Structural);
        warn!(url = %page.final_url, last_tier = %last_tier, "Every extraction tier failed");
        outcome.failure = Some(Failure::new(
            &page.final_url,
            FailureKind::ExtractionFailed { last_tier },
            reasons.join("; "),
        ));
        outcome
    }

    /// Extract at most one record from a profile page.
    pub async fn extract_profile(&self, page: &FetchedPage, ctx: &ExtractionContext) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::empty(&page.final_url);
        for strategy in &self.strategies {
            if !strategy.applies(ctx) {
                continue;
            }
            outcome.tiers_attempted.push(strategy.tier());
            if let Some(record) = strategy.attempt_single(page, ctx).await {
                outcome.tier_used = Some(strategy.tier());
                outcome.records = vec![record];
                return outcome;
            }
        }
        debug!(url = %page.final_url, "No single profile extracted");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        tier: ExtractionTier,
        attempt: Attempt,
    }

    #[async_trait]
    impl ExtractionStrategy for Fixed {
        fn tier(&self) -> ExtractionTier {
            self.tier
        }

        async fn attempt(&self, _page: &FetchedPage, _ctx: &ExtractionContext) -> Attempt {
            self.attempt.clone()
        }
    }

    fn record(name: &str, tier: ExtractionTier) -> ProfileCandidate {
        ProfileCandidate::new(name, "https://x.edu/people", tier)
    }

    #[tokio::test]
    async fn test_first_successful_tier_wins() {
        let engine = ExtractionEngine::new(vec![
            Box::new(Fixed {
                tier: ExtractionTier::Structural,
                attempt: Attempt::declined("nothing"),
            }),
            Box::new(Fixed {
                tier: ExtractionTier::TextualModel,
                attempt: Attempt::extracted(vec![record("Jane Doe", ExtractionTier::TextualModel)])
                    .with_malformed(2),
            }),
            Box::new(Fixed {
                tier: ExtractionTier::VisualModel,
                attempt: Attempt::extracted(vec![record("John Roe", ExtractionTier::Structural)]),
            }),
        ]);

        let page = FetchedPage::new("https://x.edu/people", "<html></html>");
        let outcome = engine.extract(&page, &ExtractionContext::first_page()).await;
        assert_eq!(outcome.tier_used, Some(ExtractionTier::TextualModel));
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.malformed, 2);
        assert_eq!(
            outcome.tiers_attempted,
            vec![ExtractionTier::Structural, ExtractionTier::TextualModel]
        );
        assert!(outcome.failure.is_none());
    }

    #[tokio::test]
    async fn test_all_tiers_failing_reports_last_tier() {
        let engine = ExtractionEngine::new(vec![
            Box::new(Fixed {
                tier: ExtractionTier::Structural,
                attempt: Attempt::declined("nothing"),
            }),
            Box::new(Fixed {
                tier: ExtractionTier::VisualModel,
                attempt: Attempt::extracted(Vec::new()),
            }),
        ]);

        let page = FetchedPage::new("https://x.edu/icons", "<canvas></canvas>");
        let outcome = engine.extract(&page, &ExtractionContext::first_page()).await;
        assert!(outcome.records.is_empty());
        assert!(!outcome.succeeded());
        let failure = outcome.failure.expect("failure");
        assert_eq!(
            failure.kind,
            FailureKind::ExtractionFailed {
                last_tier: ExtractionTier::VisualModel
            }
        );
    }
}
