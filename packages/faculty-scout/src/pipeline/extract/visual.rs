//! Tier 3: the classifier looks at a screenshot and proposes a selector for
//! the repeated profile element, which is then applied structurally.
//!
//! Records keep the structural tag: once the selector validates they are as
//! reliable as tier 1 output. The outcome still reports the visual tier as
//! `tier_used`, and the selector travels with it for later pages.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::pipeline::extract::structural::StructuralStrategy;
use crate::pipeline::extract::{Attempt, ExtractionContext, ExtractionStrategy};
use crate::traits::classifier::ContentClassifier;
use crate::traits::gateway::FetchGateway;
use crate::types::config::ExtractionConfig;
use crate::types::page::FetchedPage;
use crate::types::profile::ExtractionTier;

const SELECTOR_OBJECTIVE: &str =
    "the repeated element that holds one faculty member's name, title and contact details";

pub struct VisualStrategy {
    classifier: Arc<dyn ContentClassifier>,
    gateway: Arc<dyn FetchGateway>,
    structural: StructuralStrategy,
    enabled: bool,
}

impl VisualStrategy {
    pub fn new(
        classifier: Arc<dyn ContentClassifier>,
        gateway: Arc<dyn FetchGateway>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            classifier,
            gateway,
            enabled: config.visual_tier,
            structural: StructuralStrategy::new(config),
        }
    }

    /// The page with a screenshot, rendering it if the gateway did not
    /// already capture one.
    async fn rendered(&self, page: &FetchedPage) -> Option<FetchedPage> {
        if page.has_screenshot() {
            return Some(page.clone());
        }
        match self.gateway.fetch(&page.final_url, true).await {
            Ok(rendered) if rendered.has_screenshot() && !rendered.blocked => Some(rendered),
            Ok(_) => {
                debug!(url = %page.final_url, "Gateway returned no screenshot");
                None
            }
            Err(e) => {
                warn!(url = %page.final_url, error = %e, "Rendered fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl ExtractionStrategy for VisualStrategy {
    fn tier(&self) -> ExtractionTier {
        ExtractionTier::VisualModel
    }

    fn applies(&self, ctx: &ExtractionContext) -> bool {
        self.enabled && ctx.visual_allowed
    }

    async fn attempt(&self, page: &FetchedPage, _ctx: &ExtractionContext) -> Attempt {
        let Some(rendered) = self.rendered(page).await else {
            return Attempt::declined("no screenshot available");
        };
        let Some(screenshot) = rendered.screenshot.as_deref() else {
            return Attempt::declined("no screenshot available");
        };

        let css = match self.classifier.locate_selector(screenshot, SELECTOR_OBJECTIVE).await {
            Ok(Some(css)) => css,
            Ok(None) => return Attempt::declined("model found no repeated profile element"),
            Err(e) => {
                warn!(url = %page.final_url, error = %e, "Selector proposal failed");
                return Attempt::declined(format!("classifier error: {e}"));
            }
        };

        match self
            .structural
            .extract_with_selector(&rendered.html, &page.final_url, &css)
        {
            Some(listing) => {
                debug!(
                    url = %page.final_url,
                    selector = %css,
                    records = listing.records.len(),
                    "Proposed selector validated"
                );
                Attempt::extracted(listing.records).with_selector(css)
            }
            None => Attempt::declined(format!("proposed selector `{css}` matched no person records")),
        }
    }
}
