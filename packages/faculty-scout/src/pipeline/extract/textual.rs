//! Tier 2: schema-constrained extraction by the content classifier from
//! the page's main content rendered as Markdown.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::html::{main_content_html, resolve_href, to_markdown};
use crate::names::{clean_email, clean_text};
use crate::pipeline::extract::{Attempt, ExtractionContext, ExtractionStrategy};
use crate::traits::classifier::{ContentClassifier, RawRecord, RecordSchema};
use crate::types::config::ExtractionConfig;
use crate::types::page::FetchedPage;
use crate::types::profile::{truncate_chars, ExtractionTier, ProfileCandidate};

pub struct TextualStrategy {
    classifier: Arc<dyn ContentClassifier>,
    config: ExtractionConfig,
    schema: RecordSchema,
}

impl TextualStrategy {
    pub fn new(classifier: Arc<dyn ContentClassifier>, config: ExtractionConfig) -> Self {
        Self {
            classifier,
            config,
            schema: RecordSchema::faculty_profile(),
        }
    }

    /// Markdown handed to the model, capped at the configured length.
    fn page_markdown(&self, page: &FetchedPage) -> String {
        let markdown = to_markdown(&main_content_html(&page.html));
        truncate_chars(markdown.trim(), self.config.markdown_limit)
    }
}

/// Turn a model record into a validated candidate.
///
/// Returns `None` for records that break the candidate invariants; the
/// caller counts those as malformed.
pub fn record_from_raw(raw: RawRecord, source_url: &str, tier: ExtractionTier) -> Option<ProfileCandidate> {
    let name = raw.name.as_deref().map(clean_text).unwrap_or_default();
    let mut record = ProfileCandidate::new(name, source_url, tier);

    if let Some(title) = raw.title.filter(|t| !t.trim().is_empty()) {
        record = record.with_title(title);
    }
    if let Some(email) = raw.email.filter(|e| !e.trim().is_empty()) {
        // Unparseable addresses stay as-is so validation rejects the record.
        record = record.with_email(clean_email(&email).unwrap_or(email));
    }
    if let Some(href) = raw.profile_url.filter(|u| !u.trim().is_empty()) {
        let resolved = Url::parse(source_url)
            .ok()
            .and_then(|base| resolve_href(&base, &href));
        if let Some(url) = resolved {
            record = record.with_profile_url(url.to_string());
        }
    }
    if let Some(department) = raw.department.map(|d| clean_text(&d)).filter(|d| !d.is_empty()) {
        record = record.with_department(department);
    }
    record = record.with_interests(raw.research_interests);

    match record.validate() {
        Ok(()) => Some(record),
        Err(reason) => {
            debug!(source_url, name = %record.name, %reason, "Dropping malformed model record");
            None
        }
    }
}

#[async_trait]
impl ExtractionStrategy for TextualStrategy {
    fn tier(&self) -> ExtractionTier {
        ExtractionTier::TextualModel
    }

    async fn attempt(&self, page: &FetchedPage, _ctx: &ExtractionContext) -> Attempt {
        let markdown = self.page_markdown(page);
        if markdown.is_empty() {
            return Attempt::declined("page has no text content");
        }

        let raw = match self.classifier.extract_records(&markdown, &self.schema).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url = %page.final_url, error = %e, "Textual extraction call failed");
                return Attempt::declined(format!("classifier error: {e}"));
            }
        };

        let total = raw.len();
        let records: Vec<_> = raw
            .into_iter()
            .filter_map(|r| record_from_raw(r, &page.final_url, ExtractionTier::TextualModel))
            .collect();
        let malformed = total - records.len();

        if records.is_empty() {
            Attempt::declined("model returned no valid records").with_malformed(malformed)
        } else {
            Attempt::extracted(records).with_malformed(malformed)
        }
    }

    async fn attempt_single(&self, page: &FetchedPage, _ctx: &ExtractionContext) -> Option<ProfileCandidate> {
        let markdown = self.page_markdown(page);
        if markdown.is_empty() {
            return None;
        }
        let raw = self
            .classifier
            .extract_records(&markdown, &self.schema)
            .await
            .ok()?;
        let mut record = raw
            .into_iter()
            .find_map(|r| record_from_raw(r, &page.final_url, ExtractionTier::TextualModel))?;
        record.profile_url.get_or_insert_with(|| page.final_url.clone());
        Some(record)
    }
}
