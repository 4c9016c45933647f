//! Testing utilities including mock implementations.
//!
//! These let applications and the crate's own tests drive the pipeline
//! without network access or a real model. Every mock is cheaply cloneable
//! and shares its state between clones, so a test can hand one clone to the
//! pipeline and keep another for assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{ClassifierError, ClassifierResult, FetchError, FetchResult, SearchError, SinkError};
use crate::html::extract_links;
use crate::traits::classifier::{ClassifierInput, ContentClassifier, Label, RawRecord, RecordSchema};
use crate::traits::gateway::{FetchGateway, PageAction};
use crate::traits::searcher::{SearchResult, WebSearcher};
use crate::traits::sink::{ProfileBatch, ProfileSink};
use crate::types::page::{FetchedPage, PageType};
use crate::types::url_key::normalize_url;

fn key(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|| url.to_string())
}

/// Tracks how many calls are in flight and the highest level observed.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Canned failure a [`MockGateway`] returns for a URL.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Timeout,
    Status(u16),
    Blocked(String),
}

impl MockFailure {
    fn to_error(&self, url: &str) -> FetchError {
        match self {
            Self::Timeout => FetchError::Timeout { url: url.to_string() },
            Self::Status(status) => FetchError::Status {
                url: url.to_string(),
                status: *status,
            },
            Self::Blocked(reason) => FetchError::Blocked {
                url: url.to_string(),
                reason: reason.clone(),
            },
        }
    }
}

/// Record of a call made to the mock gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum MockFetchCall {
    Fetch { url: String, render: bool },
    Action { page_url: String, description: String },
}

/// In-memory [`FetchGateway`].
///
/// Unknown URLs answer with HTTP 404. Pages added through
/// [`with_html`](Self::with_html) get their links extracted the same way
/// the HTTP gateway does it.
#[derive(Clone, Default)]
pub struct MockGateway {
    pages: Arc<RwLock<HashMap<String, FetchedPage>>>,
    rendered: Arc<RwLock<HashMap<String, FetchedPage>>>,
    failures: Arc<RwLock<HashMap<String, MockFailure>>>,
    flaky: Arc<RwLock<HashMap<String, (usize, MockFailure)>>>,
    actions: Arc<RwLock<HashMap<String, FetchedPage>>>,
    calls: Arc<RwLock<Vec<MockFetchCall>>>,
    delay: Option<Duration>,
    in_flight: Arc<InFlight>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` at `url`, with links extracted from it.
    pub fn with_html(self, url: &str, html: &str) -> Self {
        let links = url::Url::parse(url)
            .map(|base| extract_links(html, &base))
            .unwrap_or_default();
        self.with_page(FetchedPage::new(url, html).with_links(links))
    }

    /// Serve a prepared page at its URL.
    pub fn with_page(self, page: FetchedPage) -> Self {
        self.pages.write().unwrap().insert(key(&page.url), page);
        self
    }

    /// Serve `page` only for rendered fetches of its URL.
    pub fn with_rendered(self, page: FetchedPage) -> Self {
        self.rendered.write().unwrap().insert(key(&page.url), page);
        self
    }

    /// Serve a plain-text body (robots.txt, sitemaps).
    pub fn with_text(self, url: &str, body: &str) -> Self {
        self.with_page(FetchedPage::new(url, body))
    }

    /// Fail every fetch of `url`.
    pub fn with_failure(self, url: &str, failure: MockFailure) -> Self {
        self.failures.write().unwrap().insert(key(url), failure);
        self
    }

    /// Fail the first `times` fetches of `url`, then serve it normally.
    pub fn with_flaky(self, url: &str, times: usize, failure: MockFailure) -> Self {
        self.flaky.write().unwrap().insert(key(url), (times, failure));
        self
    }

    /// Page produced by performing any action on `page_url`.
    pub fn with_action_result(self, page_url: &str, page: FetchedPage) -> Self {
        self.actions.write().unwrap().insert(key(page_url), page);
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockFetchCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of fetches of `url` (either render mode).
    pub fn fetch_count(&self, url: &str) -> usize {
        let wanted = key(url);
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockFetchCall::Fetch { url, .. } if key(url) == wanted))
            .count()
    }

    /// Total number of fetches.
    pub fn total_fetches(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockFetchCall::Fetch { .. }))
            .count()
    }

    /// Highest number of fetches observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.in_flight.peak()
    }

    fn respond(&self, url: &str, render: bool) -> FetchResult<FetchedPage> {
        let k = key(url);

        if let Some(failure) = self.failures.read().unwrap().get(&k) {
            return Err(failure.to_error(url));
        }

        {
            let mut flaky = self.flaky.write().unwrap();
            if let Some((remaining, failure)) = flaky.get_mut(&k) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(failure.to_error(url));
                }
            }
        }

        if render {
            if let Some(page) = self.rendered.read().unwrap().get(&k) {
                return Ok(page.clone());
            }
        }

        self.pages
            .read()
            .unwrap()
            .get(&k)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl FetchGateway for MockGateway {
    async fn fetch(&self, url: &str, render: bool) -> FetchResult<FetchedPage> {
        self.calls.write().unwrap().push(MockFetchCall::Fetch {
            url: url.to_string(),
            render,
        });

        self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.respond(url, render);
        self.in_flight.exit();
        result
    }

    async fn perform_action(&self, page_url: &str, action: &PageAction) -> FetchResult<FetchedPage> {
        self.calls.write().unwrap().push(MockFetchCall::Action {
            page_url: page_url.to_string(),
            description: action.description.clone(),
        });
        self.actions
            .read()
            .unwrap()
            .get(&key(page_url))
            .cloned()
            .ok_or(FetchError::Unsupported("page interaction"))
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Record of a call made to the mock classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum MockClassifierCall {
    ClassifyPage { visual: bool },
    ExtractRecords { text_len: usize },
    LocateSelector { objective: String },
    LocatePagination,
}

/// Deterministic [`ContentClassifier`].
///
/// Text responses are keyed by a marker substring of the input; screenshot
/// responses by the exact screenshot bytes.
#[derive(Clone, Default)]
pub struct MockClassifier {
    text_labels: Arc<RwLock<Vec<(String, Label)>>>,
    screenshot_labels: Arc<RwLock<HashMap<Vec<u8>, Label>>>,
    records: Arc<RwLock<Vec<(String, Vec<RawRecord>)>>>,
    selectors: Arc<RwLock<HashMap<Vec<u8>, String>>>,
    pagination: Arc<RwLock<HashMap<Vec<u8>, PageAction>>>,
    failing: bool,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<MockClassifierCall>>>,
    in_flight: Arc<InFlight>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label text containing `marker`.
    pub fn with_text_label(self, marker: &str, page_type: PageType, confidence: f32) -> Self {
        self.text_labels
            .write()
            .unwrap()
            .push((marker.to_string(), Label::page_type(page_type, confidence)));
        self
    }

    /// Label a screenshot.
    pub fn with_screenshot_label(self, screenshot: &[u8], page_type: PageType, confidence: f32) -> Self {
        self.screenshot_labels
            .write()
            .unwrap()
            .insert(screenshot.to_vec(), Label::page_type(page_type, confidence));
        self
    }

    /// Return `records` for text containing `marker`.
    pub fn with_records(self, marker: &str, records: Vec<RawRecord>) -> Self {
        self.records.write().unwrap().push((marker.to_string(), records));
        self
    }

    /// Propose `css` for a screenshot.
    pub fn with_selector(self, screenshot: &[u8], css: &str) -> Self {
        self.selectors
            .write()
            .unwrap()
            .insert(screenshot.to_vec(), css.to_string());
        self
    }

    /// Report a pagination control for a screenshot.
    pub fn with_pagination_control(self, screenshot: &[u8], action: PageAction) -> Self {
        self.pagination
            .write()
            .unwrap()
            .insert(screenshot.to_vec(), action);
        self
    }

    /// Make every call fail with a request error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<MockClassifierCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.in_flight.peak()
    }

    async fn enter(&self, call: MockClassifierCall) -> ClassifierResult<()> {
        self.calls.write().unwrap().push(call);
        self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.exit();
        if self.failing {
            return Err(ClassifierError::Request("mock classifier unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentClassifier for MockClassifier {
    async fn classify_page(&self, input: ClassifierInput<'_>, _taxonomy: &[PageType]) -> ClassifierResult<Label> {
        self.enter(MockClassifierCall::ClassifyPage {
            visual: input.is_visual(),
        })
        .await?;

        let label = match input {
            ClassifierInput::Text(text) => self
                .text_labels
                .read()
                .unwrap()
                .iter()
                .find(|(marker, _)| text.contains(marker.as_str()))
                .map(|(_, label)| label.clone()),
            ClassifierInput::Screenshot(bytes) => self.screenshot_labels.read().unwrap().get(bytes).cloned(),
        };
        Ok(label.unwrap_or_else(|| Label::page_type(PageType::Unknown, 0.0)))
    }

    async fn extract_records(&self, text: &str, _schema: &RecordSchema) -> ClassifierResult<Vec<RawRecord>> {
        self.enter(MockClassifierCall::ExtractRecords { text_len: text.len() })
            .await?;
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
            .map(|(_, records)| records.clone())
            .unwrap_or_default())
    }

    async fn locate_selector(&self, screenshot: &[u8], objective: &str) -> ClassifierResult<Option<String>> {
        self.enter(MockClassifierCall::LocateSelector {
            objective: objective.to_string(),
        })
        .await?;
        Ok(self.selectors.read().unwrap().get(screenshot).cloned())
    }

    async fn locate_pagination_control(&self, screenshot: &[u8]) -> ClassifierResult<Option<PageAction>> {
        self.enter(MockClassifierCall::LocatePagination).await?;
        Ok(self.pagination.read().unwrap().get(screenshot).cloned())
    }
}

// ============================================================================
// Searcher
// ============================================================================

/// [`WebSearcher`] returning canned results for queries containing a marker.
#[derive(Clone, Default)]
pub struct MockSearcher {
    results: Arc<RwLock<Vec<(String, Vec<String>)>>>,
    queries: Arc<RwLock<Vec<String>>>,
    failing: bool,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, marker: &str, urls: &[&str]) -> Self {
        self.results.write().unwrap().push((
            marker.to_lowercase(),
            urls.iter().map(|u| u.to_string()).collect(),
        ));
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.read().unwrap().clone()
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        self.queries.write().unwrap().push(query.to_string());
        if self.failing {
            return Err(SearchError::Status { status: 503 });
        }
        let lower = query.to_lowercase();
        Ok(self
            .results
            .read()
            .unwrap()
            .iter()
            .find(|(marker, _)| lower.contains(marker.as_str()))
            .map(|(_, urls)| {
                urls.iter()
                    .filter_map(|u| SearchResult::from_url(u))
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ============================================================================
// Sink
// ============================================================================

/// [`ProfileSink`] that keeps batches in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    batches: Arc<RwLock<Vec<ProfileBatch>>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn batches(&self) -> Vec<ProfileBatch> {
        self.batches.read().unwrap().clone()
    }

    pub fn record_count(&self) -> usize {
        self.batches.read().unwrap().iter().map(|b| b.records.len()).sum()
    }
}

#[async_trait]
impl ProfileSink for MemorySink {
    async fn store(&self, batch: &ProfileBatch) -> Result<(), SinkError> {
        if self.failing {
            return Err(SinkError::Storage("mock sink unavailable".into()));
        }
        self.batches.write().unwrap().push(batch.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gateway_flaky_then_ok() {
        let gateway = MockGateway::new()
            .with_html("https://x.edu/people", "<a href='/a'>A</a>")
            .with_flaky("https://x.edu/people", 1, MockFailure::Timeout);

        assert!(gateway.fetch("https://x.edu/people", false).await.is_err());
        let page = gateway.fetch("https://www.x.edu/people/", false).await.unwrap();
        assert_eq!(page.links.len(), 1);
        assert_eq!(gateway.fetch_count("https://x.edu/people"), 2);
    }

    #[tokio::test]
    async fn test_gateway_unknown_is_404() {
        let gateway = MockGateway::new();
        let err = gateway.fetch("https://x.edu/missing", false).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_classifier_markers() {
        let classifier = MockClassifier::new()
            .with_text_label("Our faculty", PageType::Directory, 0.9)
            .with_records("Our faculty", vec![RawRecord::named("Jane Doe")]);

        let label = classifier
            .classify_page(ClassifierInput::Text("Our faculty list"), &PageType::TAXONOMY)
            .await
            .unwrap();
        assert_eq!(label.label, "directory");

        let records = classifier
            .extract_records("Our faculty list", &RecordSchema::faculty_profile())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(classifier.call_count(), 2);
    }
}
