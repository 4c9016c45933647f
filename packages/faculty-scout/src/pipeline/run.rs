//! Run orchestration: discovery, classification, extraction, pagination
//! and dedup for one root URL, with governed collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use faculty_scout::{DiscoveryMode, HttpGateway, Pipeline, RunLimits, ScoutConfig};
//!
//! let pipeline = Pipeline::new(Arc::new(HttpGateway::new()), ScoutConfig::default());
//! let result = pipeline
//!     .run("https://www.example.edu", DiscoveryMode::Auto, &RunLimits::default())
//!     .await?;
//! println!("{} profiles ({:?})", result.candidates.len(), result.outcome);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::error::{ClassifierError, ClassifierResult, FetchError, FetchResult, Result, ScoutError};
use crate::pipeline::classify::PageClassifier;
use crate::pipeline::discovery::{DiscoveryAgent, DiscoveryReport};
use crate::pipeline::extract::{ExtractionContext, ExtractionEngine};
use crate::pipeline::filter::ProfileFilter;
use crate::pipeline::governor::{GovernedClassifier, GovernedGateway, RunGateway, RunLedger};
use crate::pipeline::pagination::PaginationHandler;
use crate::pipeline::scorer::UrlScorer;
use crate::pipeline::VisitedSet;
use crate::traits::classifier::{ClassifierInput, ContentClassifier, Label, RawRecord, RecordSchema};
use crate::traits::gateway::{FetchGateway, PageAction};
use crate::traits::searcher::WebSearcher;
use crate::traits::sink::{ProfileBatch, ProfileSink};
use crate::types::candidate::CandidateUrl;
use crate::types::config::{DiscoveryMode, RunLimits, ScoutConfig};
use crate::types::page::{FetchedPage, PageClassification, PageType};
use crate::types::profile::ProfileCandidate;
use crate::types::result::{assess_outcome, Failure, FailureKind, PipelineResult};
use crate::types::url_key::{normalize_url, registrable_domain};

/// The faculty directory pipeline.
///
/// Holds the governed collaborators; one `Pipeline` may run many roots,
/// sequentially or through [`run_all`](Self::run_all), sharing rate limits
/// and the model-call cap. Domain blocks and given-up URLs are remembered
/// per run only.
pub struct Pipeline {
    gateway: Arc<GovernedGateway>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    searcher: Option<Arc<dyn WebSearcher>>,
    sink: Option<Arc<dyn ProfileSink>>,
    config: ScoutConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(gateway: Arc<dyn FetchGateway>, config: ScoutConfig) -> Self {
        let cancel = CancellationToken::new();
        let gateway = GovernedGateway::new(gateway, config.governor.clone()).with_cancellation(cancel.clone());
        Self {
            gateway: Arc::new(gateway),
            classifier: None,
            searcher: None,
            sink: None,
            config,
            cancel,
        }
    }

    /// Enable model fallbacks. Calls are capped at
    /// `governor.max_model_calls` across every run of this pipeline.
    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        let governed = GovernedClassifier::new(classifier, self.config.governor.max_model_calls)
            .with_cancellation(self.cancel.clone());
        self.classifier = Some(Arc::new(governed));
        self
    }

    /// Enable the search-engine discovery tier.
    pub fn with_searcher(mut self, searcher: Arc<dyn WebSearcher>) -> Self {
        self.searcher = Some(searcher);
        self
    }

    /// Hand each run's finalized records to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ProfileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Token that cancels every run of this pipeline.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    /// Run the pipeline for one root URL.
    ///
    /// Fails only when `root` is not a usable URL; every other failure is
    /// reported inside the result.
    pub async fn run(&self, root: &str, mode: DiscoveryMode, limits: &RunLimits) -> Result<PipelineResult> {
        let root = parse_root(root)?;
        let run_id = Uuid::new_v4();
        let span = info_span!("scout_run", %run_id, root = %root);
        Ok(self.execute(run_id, root, mode, limits).instrument(span).await)
    }

    /// Run discovery alone for `root`, through the governed collaborators.
    pub async fn discover(&self, root: &str, mode: DiscoveryMode, limits: &RunLimits) -> Result<DiscoveryReport> {
        let root = parse_root(root)?;
        let cancel = self.cancel.child_token();
        let stages = self.stages(&root, &cancel);
        Ok(stages.discovery.discover(&root, mode, limits, &cancel).await)
    }

    /// Run several roots concurrently. Results are in input order.
    pub async fn run_all(
        &self,
        roots: &[String],
        mode: DiscoveryMode,
        limits: &RunLimits,
    ) -> Vec<Result<PipelineResult>> {
        join_all(roots.iter().map(|root| self.run(root, mode, limits))).await
    }

    async fn execute(&self, run_id: Uuid, root: Url, mode: DiscoveryMode, limits: &RunLimits) -> PipelineResult {
        let started_at = Utc::now();
        let cancel = self.cancel.child_token();
        let timer = limits.deadline().map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(deadline_secs = deadline.as_secs(), "Run deadline reached, cancelling");
                cancel.cancel();
            })
        });

        let stages = self.stages(&root, &cancel);
        let visited = VisitedSet::new();

        let discovery = stages.discovery.discover(&root, mode, limits, &cancel).await;
        let mut tally = Tally {
            pages_visited: discovery.pages_fetched,
            failures: discovery.failures.clone(),
            ..Tally::default()
        };

        let mut level: Vec<CandidateUrl> = discovery
            .candidates
            .iter()
            .take(limits.max_candidates)
            .cloned()
            .collect();
        let mut depth = 0usize;

        while !level.is_empty() {
            if cancel.is_cancelled() {
                tally.partial = true;
                for candidate in &level {
                    tally
                        .failures
                        .push(Failure::new(&candidate.url, FailureKind::Cancelled, "run cancelled before processing"));
                }
                break;
            }
            let expand = depth < limits.max_gateway_depth;
            let reports = join_all(
                level
                    .iter()
                    .map(|candidate| stages.process(candidate, expand, limits, &visited, &cancel)),
            )
            .await;

            let mut next = Vec::new();
            for report in reports {
                next.extend(report.children.iter().cloned());
                tally.absorb(report);
            }
            next.truncate(limits.max_candidates);
            level = next;
            depth += 1;
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        if cancel.is_cancelled() {
            tally.partial = true;
        }

        let dropped = tally.filter.dropped();
        let candidates = tally.filter.finish();

        let blocked_domains = stages.gateway.ledger().disabled_domains();
        let root_domain = registrable_domain(root.host_str().unwrap_or_default());
        let root_blocked = discovery.blocked || blocked_domains.contains(&root_domain);
        let outcome = assess_outcome(&candidates, discovery.confidence, root_blocked);

        if let Some(sink) = &self.sink {
            if !candidates.is_empty() {
                let batch = ProfileBatch {
                    run_id,
                    root_url: root.to_string(),
                    produced_at: Utc::now(),
                    records: candidates.clone(),
                };
                if let Err(e) = sink.store(&batch).await {
                    warn!(error = %e, "Profile sink rejected batch");
                    tally
                        .failures
                        .push(Failure::new(root.as_str(), FailureKind::Persistence, e.to_string()));
                }
            }
        }

        let result = PipelineResult {
            run_id,
            root_url: root.to_string(),
            started_at,
            finished_at: Utc::now(),
            candidates,
            directories: discovery.candidates,
            classifications: tally.classifications,
            pages_visited: tally.pages_visited,
            failures: tally.failures,
            blocked_domains,
            discovery_confidence: discovery.confidence,
            outcome,
            malformed_dropped: tally.malformed + dropped,
            partial: tally.partial,
        };

        info!(
            candidates = result.candidates.len(),
            pages_visited = result.pages_visited,
            failures = ?result.failure_counts(),
            outcome = ?result.outcome,
            partial = result.partial,
            "Run finished"
        );
        result
    }

    /// Stage objects for one run, bound to its cancellation token.
    fn stages(&self, root: &Url, cancel: &CancellationToken) -> Stages {
        let gateway = Arc::new(ScopedGateway::new(self.gateway.for_run(), cancel.clone()));
        let dyn_gateway: Arc<dyn FetchGateway> = gateway.clone();
        let model: Option<Arc<dyn ContentClassifier>> = self
            .classifier
            .clone()
            .map(|inner| Arc::new(ScopedClassifier { inner, cancel: cancel.clone() }) as Arc<dyn ContentClassifier>);

        let mut discovery = DiscoveryAgent::new(
            dyn_gateway.clone(),
            UrlScorer::new(self.config.scoring.clone()),
            self.config.discovery.clone(),
        );
        let mut classifier = PageClassifier::new(self.config.classifier.clone());
        if let Some(model) = &model {
            discovery = discovery.with_classifier(model.clone());
            classifier = classifier.with_classifier(model.clone());
        }
        if let Some(searcher) = &self.searcher {
            discovery = discovery.with_searcher(searcher.clone());
        }

        let classifier = Arc::new(classifier);
        let engine = Arc::new(ExtractionEngine::standard(
            &self.config.extraction,
            model.clone(),
            dyn_gateway.clone(),
        ));
        let mut pagination = PaginationHandler::new(
            dyn_gateway,
            engine.clone(),
            classifier.clone(),
            self.config.pagination.clone(),
        );
        if let Some(model) = model {
            pagination = pagination.with_model(model);
        }

        Stages {
            root: root.clone(),
            gateway,
            discovery,
            classifier,
            engine,
            pagination,
            extract_profiles: self.config.extraction.extract_profiles,
        }
    }
}

/// Accept `https://host/...`, `http://...` or a bare host.
fn parse_root(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&candidate).map_err(|_| ScoutError::InvalidRootUrl { url: raw.to_string() })?;
    let usable = matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty());
    if !usable {
        return Err(ScoutError::InvalidRootUrl { url: raw.to_string() });
    }
    Ok(url)
}

/// Everything one run needs, wired to the run's collaborators.
struct Stages {
    root: Url,
    gateway: Arc<ScopedGateway>,
    discovery: DiscoveryAgent,
    classifier: Arc<PageClassifier>,
    engine: Arc<ExtractionEngine>,
    pagination: PaginationHandler,
    extract_profiles: bool,
}

/// What processing one candidate URL produced.
#[derive(Default)]
struct CandidateReport {
    records: Vec<ProfileCandidate>,
    classifications: Vec<PageClassification>,
    failures: Vec<Failure>,
    pages: usize,
    malformed: usize,
    partial: bool,
    children: Vec<CandidateUrl>,
}

/// Run-level accumulator.
#[derive(Default)]
struct Tally {
    filter: ProfileFilter,
    classifications: Vec<PageClassification>,
    failures: Vec<Failure>,
    pages_visited: usize,
    malformed: usize,
    partial: bool,
}

impl Tally {
    fn absorb(&mut self, report: CandidateReport) {
        self.filter.extend(report.records);
        self.classifications.extend(report.classifications);
        self.failures.extend(report.failures);
        self.pages_visited += report.pages;
        self.malformed += report.malformed;
        self.partial |= report.partial;
    }
}

impl Stages {
    async fn process(
        &self,
        candidate: &CandidateUrl,
        expand: bool,
        limits: &RunLimits,
        visited: &VisitedSet,
        cancel: &CancellationToken,
    ) -> CandidateReport {
        let mut report = CandidateReport::default();
        let Some(key) = normalize_url(&candidate.url) else {
            return report;
        };
        if !visited.insert(&key) {
            debug!(url = %candidate.url, "Candidate already processed");
            return report;
        }

        let page = match self.gateway.fetch(&candidate.url, false).await {
            Ok(page) => page,
            Err(e) => {
                if matches!(e, FetchError::Cancelled) {
                    report.partial = true;
                }
                warn!(url = %candidate.url, error = %e, "Candidate fetch failed");
                report.failures.push(Failure::from_fetch(&candidate.url, &e));
                return report;
            }
        };
        report.pages += 1;

        if let Some(final_key) = normalize_url(&page.final_url) {
            if final_key != key && !visited.insert(&final_key) {
                debug!(url = %candidate.url, final_url = %page.final_url, "Redirected to a processed page");
                return report;
            }
        }

        let class = self.classifier.classify_page(&page).await;
        report.classifications.push(class.clone());
        debug!(url = %page.final_url, page_type = %class.page_type, confidence = class.confidence, "Candidate classified");

        match class.page_type {
            PageType::Directory | PageType::Paginated => {
                let pages = self
                    .pagination
                    .run(page, &class, limits.max_pages_per_directory, visited, cancel)
                    .await;
                report.pages += pages.pages.len().saturating_sub(1);
                report.records = pages.records;
                report.failures.extend(pages.failures);
                report.malformed += pages.malformed;
                report.partial |= pages.partial;
            }
            PageType::Gateway if expand => {
                report.children = self.discovery.expand_gateway(&self.root, &page, limits.max_candidates);
                debug!(url = %page.final_url, children = report.children.len(), "Expanding gateway page");
            }
            PageType::Gateway => {
                debug!(url = %page.final_url, "Gateway depth reached, not expanding");
            }
            PageType::Profile => {
                if self.extract_profiles {
                    let outcome = self.engine.extract_profile(&page, &ExtractionContext::first_page()).await;
                    report.records = outcome.records;
                }
            }
            PageType::Blocked => {
                self.gateway.ledger().disable_domain_of(&page.final_url);
                report
                    .failures
                    .push(Failure::new(&page.final_url, FailureKind::Blocked, class.reason.clone()));
            }
            PageType::Unknown => {
                report.failures.push(Failure::new(
                    &page.final_url,
                    FailureKind::ClassificationUncertain,
                    class.reason.clone(),
                ));
            }
        }
        report
    }
}

/// Gateway view of one run: aborts in-flight fetches when the run is
/// cancelled.
struct ScopedGateway {
    inner: RunGateway,
    cancel: CancellationToken,
}

impl ScopedGateway {
    fn new(inner: RunGateway, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    /// Blocks and failures of this run.
    fn ledger(&self) -> &RunLedger {
        self.inner.ledger()
    }
}

#[async_trait]
impl FetchGateway for ScopedGateway {
    async fn fetch(&self, url: &str, render: bool) -> FetchResult<FetchedPage> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.inner.fetch(url, render) => result,
        }
    }

    async fn perform_action(&self, page_url: &str, action: &PageAction) -> FetchResult<FetchedPage> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.inner.perform_action(page_url, action) => result,
        }
    }
}

/// Classifier view of one run, abandoned when the run is cancelled.
struct ScopedClassifier {
    inner: Arc<dyn ContentClassifier>,
    cancel: CancellationToken,
}

#[async_trait]
impl ContentClassifier for ScopedClassifier {
    async fn classify_page(&self, input: ClassifierInput<'_>, taxonomy: &[PageType]) -> ClassifierResult<Label> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClassifierError::Cancelled),
            result = self.inner.classify_page(input, taxonomy) => result,
        }
    }

    async fn extract_records(&self, text: &str, schema: &RecordSchema) -> ClassifierResult<Vec<RawRecord>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClassifierError::Cancelled),
            result = self.inner.extract_records(text, schema) => result,
        }
    }

    async fn locate_selector(&self, screenshot: &[u8], objective: &str) -> ClassifierResult<Option<String>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClassifierError::Cancelled),
            result = self.inner.locate_selector(screenshot, objective) => result,
        }
    }

    async fn locate_pagination_control(&self, screenshot: &[u8]) -> ClassifierResult<Option<PageAction>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClassifierError::Cancelled),
            result = self.inner.locate_pagination_control(screenshot) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use crate::types::config::GovernorConfig;

    #[test]
    fn test_parse_root_accepts_bare_host() {
        assert_eq!(parse_root("mit.edu").unwrap().as_str(), "https://mit.edu/");
        assert_eq!(
            parse_root(" https://www.cs.ox.ac.uk/people ").unwrap().as_str(),
            "https://www.cs.ox.ac.uk/people"
        );
        assert!(matches!(parse_root("ftp://x.edu"), Err(ScoutError::InvalidRootUrl { .. })));
        assert!(parse_root("").is_err());
    }

    #[tokio::test]
    async fn test_scoped_gateway_aborts_in_flight_fetch() {
        let mock = MockGateway::new()
            .with_html("https://x.edu/slow", "<p>late</p>")
            .with_delay(std::time::Duration::from_secs(30));
        let governed = Arc::new(GovernedGateway::new(
            Arc::new(mock),
            GovernorConfig::default().with_jitter_ms(0),
        ));
        let cancel = CancellationToken::new();
        let scoped = ScopedGateway::new(governed.for_run(), cancel.clone());

        let fetch = scoped.fetch("https://x.edu/slow", false);
        let canceller = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let (result, _) = tokio::join!(fetch, canceller);
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(scoped.ledger().disabled_domains().is_empty());
    }
}
