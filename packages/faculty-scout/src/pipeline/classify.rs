//! Page type classification.
//!
//! Stage 1 reads structural signals from the DOM. When its confidence is
//! below the configured threshold, stage 2 asks the content classifier.
//! Block conditions reported by the gateway short-circuit both stages.

use scraper::Html;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::html::{document_text, element_text, links_of, selector};
use crate::names::{find_email, is_department_label, looks_like_person_name};
use crate::pipeline::extract::structural::count_person_blocks;
use crate::pipeline::pagination::next_link_in;
use crate::traits::classifier::{ClassifierInput, ContentClassifier};
use crate::types::config::ClassifierConfig;
use crate::types::page::{FetchedPage, LinkPosition, PageClassification, PageType};
use crate::types::profile::truncate_chars;

/// Structural facts read from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSignals {
    pub text_length: usize,
    pub block_marker: Option<String>,
    pub person_blocks: usize,
    pub has_pager: bool,
    pub department_links: usize,
    pub single_bio: bool,
}

impl PageSignals {
    /// Read signals from a page. Synchronous; the parsed document does not
    /// outlive the call.
    pub fn read(html: &str, url: &str, config: &ClassifierConfig) -> Self {
        let document = Html::parse_document(html);
        let text = document_text(&document);
        let lower = text.to_lowercase();
        let base = Url::parse(url).ok();

        let block_marker = config
            .block_markers
            .iter()
            .find(|marker| lower.contains(&marker.to_lowercase()))
            .cloned();

        let person_blocks = count_person_blocks(&document, url, config.max_non_person_ratio);

        let has_pager = base
            .as_ref()
            .is_some_and(|base| next_link_in(&document, base).is_some());

        let department_links = base
            .as_ref()
            .map(|base| {
                links_of(&document, base)
                    .iter()
                    .filter(|l| l.position != LinkPosition::Footer && l.position != LinkPosition::Navigation)
                    .filter(|l| is_department_label(&l.text))
                    .count()
            })
            .unwrap_or(0);

        let single_bio = person_blocks <= 1 && has_single_bio(&document);

        Self {
            text_length: text.chars().count(),
            block_marker,
            person_blocks,
            has_pager,
            department_links,
            single_bio,
        }
    }
}

/// One heading naming a person plus contact or title text nearby.
fn has_single_bio(document: &Html) -> bool {
    let Some(h1) = selector("h1") else {
        return false;
    };
    let headings: Vec<_> = document.select(&h1).map(element_text).collect();
    if headings.len() != 1 || !looks_like_person_name(&headings[0]) {
        return false;
    }
    let text = document_text(document).to_lowercase();
    find_email(&text).is_some()
        || ["professor", "lecturer", "research interests", "biography"]
            .iter()
            .any(|w| text.contains(w))
}

/// Labels pages by type.
pub struct PageClassifier {
    config: ClassifierConfig,
    model: Option<Arc<dyn ContentClassifier>>,
}

impl PageClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config, model: None }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.model = Some(classifier);
        self
    }

    /// Classify a fetched page, honouring the gateway's block flag.
    pub async fn classify_page(&self, page: &FetchedPage) -> PageClassification {
        if page.blocked {
            let reason = page.block_reason.clone().unwrap_or_else(|| "gateway reported block".into());
            return PageClassification::heuristic(&page.final_url, PageType::Blocked, 1.0).with_reason(reason);
        }
        self.classify(&page.final_url, &page.html, page.screenshot.as_deref())
            .await
    }

    /// Heuristics first, then the model when the heuristics are unsure.
    pub async fn classify(&self, url: &str, html: &str, screenshot: Option<&[u8]>) -> PageClassification {
        let heuristic = self.heuristic(url, html);
        if heuristic.confidence >= self.config.heuristic_threshold || heuristic.page_type == PageType::Blocked {
            debug!(url, page_type = %heuristic.page_type, confidence = heuristic.confidence, "Heuristic classification");
            return heuristic;
        }

        let Some(model) = &self.model else {
            return heuristic;
        };

        let text = {
            let document = Html::parse_document(html);
            truncate_chars(&document_text(&document), self.config.model_text_limit)
        };
        let input = match screenshot {
            Some(bytes) if text.chars().count() < self.config.min_text_length && !bytes.is_empty() => {
                ClassifierInput::Screenshot(bytes)
            }
            _ => ClassifierInput::Text(&text),
        };

        match model.classify_page(input, &PageType::TAXONOMY).await {
            Ok(label) => {
                let page_type = PageType::from_label(&label.label).unwrap_or(PageType::Unknown);
                debug!(url, page_type = %page_type, confidence = label.confidence, "Model classification");
                PageClassification::model(url, page_type, label.confidence.clamp(0.0, 1.0))
                    .with_reason(format!("model label `{}`", label.label))
            }
            Err(e) => {
                warn!(url, error = %e, "Classifier call failed, degrading to UNKNOWN");
                PageClassification::model(url, PageType::Unknown, 0.0)
                    .with_reason(format!("classifier error: {e}; heuristic guess {}", heuristic.page_type))
            }
        }
    }

    /// Stage 1 only.
    pub fn heuristic(&self, url: &str, html: &str) -> PageClassification {
        let signals = PageSignals::read(html, url, &self.config);
        self.decide(url, &signals)
    }

    fn decide(&self, url: &str, s: &PageSignals) -> PageClassification {
        let min_blocks = self.config.min_person_blocks;

        if let Some(marker) = &s.block_marker {
            if s.text_length < self.config.min_text_length * 5 && s.person_blocks < min_blocks {
                return PageClassification::heuristic(url, PageType::Blocked, 0.95)
                    .with_reason(format!("block marker `{marker}`"));
            }
        }
        if s.person_blocks >= min_blocks && s.has_pager {
            return PageClassification::heuristic(url, PageType::Paginated, 0.85)
                .with_reason(format!("{} person blocks with pager", s.person_blocks));
        }
        if s.person_blocks >= min_blocks {
            let confidence = if s.person_blocks >= min_blocks * 2 { 0.9 } else { 0.8 };
            return PageClassification::heuristic(url, PageType::Directory, confidence)
                .with_reason(format!("{} person blocks", s.person_blocks));
        }
        if s.department_links >= self.config.min_gateway_links && s.person_blocks < 2 {
            return PageClassification::heuristic(url, PageType::Gateway, 0.9)
                .with_reason(format!("{} department links", s.department_links));
        }
        if s.single_bio {
            return PageClassification::heuristic(url, PageType::Profile, 0.7).with_reason("single bio block");
        }
        PageClassification::heuristic(url, PageType::Unknown, 0.3).with_reason("no decisive signal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClassifier, MockClassifierCall};
    use crate::types::page::ClassificationMethod;

    const NAMES: [&str; 12] = [
        "Ada Lovelace",
        "Alan Turing",
        "Grace Hopper",
        "Edsger Dijkstra",
        "Barbara Liskov",
        "Donald Knuth",
        "Frances Allen",
        "John Backus",
        "Niklaus Wirth",
        "Tony Hoare",
        "Leslie Lamport",
        "Ken Thompson",
    ];

    fn cards(n: usize, pager: bool) -> String {
        let cards: String = NAMES
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, name)| {
                format!(r#"<div class="profile-card"><h3>{name}</h3><a href="mailto:p{i}@x.edu">p{i}@x.edu</a></div>"#)
            })
            .collect();
        let pager = if pager {
            r#"<nav class="pagination"><a rel="next" href="?page=2">Next</a></nav>"#
        } else {
            ""
        };
        format!("<html><body><main>{cards}</main>{pager}</body></html>")
    }

    #[tokio::test]
    async fn test_directory_is_heuristic() {
        let classifier = MockClassifier::new();
        let pc = PageClassifier::new(ClassifierConfig::default()).with_classifier(Arc::new(classifier.clone()));
        let result = pc.classify("https://x.edu/people", &cards(12, false), None).await;
        assert_eq!(result.page_type, PageType::Directory);
        assert_eq!(result.method, ClassificationMethod::Heuristic);
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_pager_makes_paginated() {
        let pc = PageClassifier::new(ClassifierConfig::default());
        let result = pc.classify("https://x.edu/people", &cards(6, true), None).await;
        assert_eq!(result.page_type, PageType::Paginated);
    }

    #[tokio::test]
    async fn test_gateway_links() {
        let html = r#"<html><body><main>
            <a href="/physics">Department of Physics</a>
            <a href="/chemistry">Department of Chemistry</a>
            <a href="/eng">School of Engineering</a>
        </main></body></html>"#;
        let pc = PageClassifier::new(ClassifierConfig::default());
        let result = pc.classify("https://x.edu/academics", html, None).await;
        assert_eq!(result.page_type, PageType::Gateway);

        let strict = PageClassifier::new(ClassifierConfig::default().with_min_gateway_links(4));
        let result = strict.classify("https://x.edu/academics", html, None).await;
        assert_eq!(result.page_type, PageType::Unknown);
    }

    #[test]
    fn test_person_block_ratio_is_configurable() {
        let mixed = cards(3, false).replace(
            "</main>",
            r#"<div class="profile-card"><h3>Contact Us</h3><a href="mailto:info@x.edu">info@x.edu</a></div>
               <div class="profile-card"><h3>Office of Admissions</h3><a href="mailto:apply@x.edu">apply@x.edu</a></div></main>"#,
        );
        let lenient = ClassifierConfig::default();
        assert_eq!(PageSignals::read(&mixed, "https://x.edu/people", &lenient).person_blocks, 3);

        let strict = ClassifierConfig {
            max_non_person_ratio: 0.2,
            ..ClassifierConfig::default()
        };
        assert_eq!(PageSignals::read(&mixed, "https://x.edu/people", &strict).person_blocks, 0);
    }

    #[tokio::test]
    async fn test_captcha_marker_blocks_without_model() {
        let classifier = MockClassifier::new();
        let pc = PageClassifier::new(ClassifierConfig::default()).with_classifier(Arc::new(classifier.clone()));
        let html = "<html><body><h1>Please complete the CAPTCHA to continue</h1></body></html>";
        let result = pc.classify("https://x.edu/people", html, None).await;
        assert_eq!(result.page_type, PageType::Blocked);
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_gateway_block_flag_short_circuits() {
        let pc = PageClassifier::new(ClassifierConfig::default());
        let page = FetchedPage::new("https://x.edu/people", cards(12, false)).blocked("HTTP 403");
        let result = pc.classify_page(&page).await;
        assert_eq!(result.page_type, PageType::Blocked);
        assert_eq!(result.reason, "HTTP 403");
    }

    #[tokio::test]
    async fn test_ambiguous_page_uses_model() {
        let classifier = MockClassifier::new().with_text_label("Meet our team", PageType::Directory, 0.8);
        let pc = PageClassifier::new(ClassifierConfig::default()).with_classifier(Arc::new(classifier.clone()));
        let result = pc
            .classify("https://x.edu/team", "<html><body><p>Meet our team</p></body></html>", None)
            .await;
        assert_eq!(result.page_type, PageType::Directory);
        assert_eq!(result.method, ClassificationMethod::Model);
    }

    #[tokio::test]
    async fn test_short_page_with_screenshot_goes_visual() {
        let shot = b"png:canvas";
        let classifier = MockClassifier::new().with_screenshot_label(shot, PageType::Directory, 0.7);
        let pc = PageClassifier::new(ClassifierConfig::default()).with_classifier(Arc::new(classifier.clone()));
        let result = pc.classify("https://x.edu/team", "<canvas></canvas>", Some(shot)).await;
        assert_eq!(result.page_type, PageType::Directory);
        assert_eq!(classifier.calls(), vec![MockClassifierCall::ClassifyPage { visual: true }]);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_unknown() {
        let pc = PageClassifier::new(ClassifierConfig::default())
            .with_classifier(Arc::new(MockClassifier::new().failing()));
        let result = pc
            .classify("https://x.edu/team", "<html><body><p>Hello</p></body></html>", None)
            .await;
        assert_eq!(result.page_type, PageType::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_single_bio_is_profile() {
        let html = r#"<html><body><main><h1>Jane Doe</h1><p>Professor of Physics</p>
            <p>jdoe@x.edu</p></main></body></html>"#;
        let pc = PageClassifier::new(ClassifierConfig::default());
        assert_eq!(pc.heuristic("https://x.edu/people/jdoe", html).page_type, PageType::Profile);
    }
}
