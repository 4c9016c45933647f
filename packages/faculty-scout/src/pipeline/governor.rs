//! Rate/retry governor.
//!
//! Wraps the fetch gateway with per-domain politeness (a keyed `governor`
//! token bucket plus a per-domain concurrency cap), bounded retries with
//! exponential backoff and jitter, and a per-run block short-circuit: once a
//! domain reports a block condition no further requests of that run reach
//! it. Buckets and concurrency slots are shared by every run; block and
//! failure memory lives in a [`RunLedger`] owned by one run. The content
//! classifier gets a global cap on concurrent calls.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Jitter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClassifierError, ClassifierResult, FetchError, FetchResult};
use crate::traits::classifier::{ClassifierInput, ContentClassifier, Label, RawRecord, RecordSchema};
use crate::traits::gateway::{FetchGateway, PageAction};
use crate::types::config::GovernorConfig;
use crate::types::page::{FetchedPage, PageType};
use crate::types::url_key::{normalize_parsed, registrable_domain};

type DomainLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Domains disabled and URLs given up on during one run.
#[derive(Debug, Default)]
pub struct RunLedger {
    disabled: RwLock<HashSet<String>>,
    failed: RwLock<HashSet<String>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop all further requests to a domain for this run.
    pub fn disable_domain(&self, domain: &str) {
        let domain = registrable_domain(domain);
        let mut disabled = self.disabled.write().unwrap_or_else(|e| e.into_inner());
        if disabled.insert(domain.clone()) {
            warn!(domain = %domain, "Domain disabled after block condition");
        }
    }

    /// Disable the domain a URL belongs to.
    pub fn disable_domain_of(&self, url: &str) {
        if let Some(host) = Url::parse(url).ok().as_ref().and_then(Url::host_str) {
            self.disable_domain(host);
        }
    }

    pub fn is_disabled(&self, domain: &str) -> bool {
        self.disabled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&registrable_domain(domain))
    }

    /// Disabled domains, sorted.
    pub fn disabled_domains(&self) -> Vec<String> {
        sorted(&self.disabled)
    }

    /// URLs that failed permanently in this run.
    pub fn failed_urls(&self) -> Vec<String> {
        sorted(&self.failed)
    }

    fn mark_failed(&self, key: String) {
        self.failed.write().unwrap_or_else(|e| e.into_inner()).insert(key);
    }

    fn has_failed(&self, key: &str) -> bool {
        self.failed.read().unwrap_or_else(|e| e.into_inner()).contains(key)
    }
}

fn sorted(set: &RwLock<HashSet<String>>) -> Vec<String> {
    let mut items: Vec<_> = set.read().unwrap_or_else(|e| e.into_inner()).iter().cloned().collect();
    items.sort();
    items
}

/// Fetch gateway wrapper enforcing politeness and retries.
///
/// Requests go through [`RunGateway`]s made by [`for_run`](Self::for_run),
/// each carrying its own [`RunLedger`].
pub struct GovernedGateway {
    inner: Arc<dyn FetchGateway>,
    limiter: DomainLimiter,
    slots: Mutex<HashMap<String, Arc<Semaphore>>>,
    config: GovernorConfig,
    cancel: CancellationToken,
}

impl GovernedGateway {
    pub fn new(inner: Arc<dyn FetchGateway>, config: GovernorConfig) -> Self {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));
        Self {
            inner,
            limiter: RateLimiter::keyed(Quota::per_second(rps)),
            slots: Mutex::new(HashMap::new()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort waits and in-flight retries when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A gateway for one run: shared buckets, fresh ledger.
    pub fn for_run(self: &Arc<Self>) -> RunGateway {
        RunGateway {
            governor: self.clone(),
            ledger: RunLedger::new(),
        }
    }

    fn slot(&self, domain: &str) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_concurrent_per_domain.max(1))))
            .clone()
    }

    /// Domain and canonical key of a URL, rejecting domains and URLs the
    /// run has already given up on.
    fn admit(&self, ledger: &RunLedger, url: &str) -> FetchResult<(String, String)> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl { url: url.to_string() })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl { url: url.to_string() })?;
        let domain = registrable_domain(host);

        if ledger.is_disabled(&domain) {
            return Err(FetchError::DomainDisabled { domain });
        }
        let key = normalize_parsed(&parsed);
        if ledger.has_failed(&key) {
            return Err(FetchError::PreviouslyFailed { url: url.to_string() });
        }
        Ok((domain, key))
    }

    async fn acquire(&self, domain: &str) -> FetchResult<OwnedSemaphorePermit> {
        let slot = self.slot(domain);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            permit = slot.acquire_owned() => permit.map_err(|_| FetchError::Cancelled),
        }
    }

    async fn wait_turn(&self, domain: &str) -> FetchResult<()> {
        let jitter = Jitter::up_to(Duration::from_millis(self.config.jitter_ms));
        let key = domain.to_string();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            _ = self.limiter.until_key_ready_with_jitter(&key, jitter) => Ok(()),
        }
    }

    async fn backoff(&self, attempt: u32) -> FetchResult<()> {
        let extra = if self.config.jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let delay = self.config.backoff_for(attempt) + Duration::from_millis(extra);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Fetch on behalf of the run owning `ledger`.
    pub async fn fetch_in(&self, ledger: &RunLedger, url: &str, render: bool) -> FetchResult<FetchedPage> {
        let (domain, key) = self.admit(ledger, url)?;
        let _permit = self.acquire(&domain).await?;

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            // A sibling task may have hit a block while we waited.
            if ledger.is_disabled(&domain) {
                return Err(FetchError::DomainDisabled { domain });
            }
            self.wait_turn(&domain).await?;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
                result = self.inner.fetch(url, render) => result,
            };
            record_block(ledger, &domain, &result);

            match result {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    debug!(url, attempt, error = %e, "Transient fetch failure, backing off");
                    self.backoff(attempt).await?;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(url, attempts = attempt, error = %e, "Giving up after retries");
                    ledger.mark_failed(key);
                    return Err(FetchError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e @ (FetchError::Cancelled | FetchError::Unsupported(_))) => return Err(e),
                Err(e) => {
                    if !e.is_block() {
                        ledger.mark_failed(key);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Perform a page action on behalf of the run owning `ledger`.
    pub async fn perform_action_in(
        &self,
        ledger: &RunLedger,
        page_url: &str,
        action: &PageAction,
    ) -> FetchResult<FetchedPage> {
        let (domain, _) = self.admit(ledger, page_url)?;
        let _permit = self.acquire(&domain).await?;
        self.wait_turn(&domain).await?;

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.inner.perform_action(page_url, action) => result,
        };
        record_block(ledger, &domain, &result);
        result
    }
}

fn record_block(ledger: &RunLedger, domain: &str, result: &FetchResult<FetchedPage>) {
    let blocked = match result {
        Ok(page) => page.blocked,
        Err(e) => e.is_block(),
    };
    if blocked {
        ledger.disable_domain(domain);
    }
}

/// The governed gateway as seen by one run.
pub struct RunGateway {
    governor: Arc<GovernedGateway>,
    ledger: RunLedger,
}

impl RunGateway {
    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }
}

#[async_trait]
impl FetchGateway for RunGateway {
    async fn fetch(&self, url: &str, render: bool) -> FetchResult<FetchedPage> {
        self.governor.fetch_in(&self.ledger, url, render).await
    }

    async fn perform_action(&self, page_url: &str, action: &PageAction) -> FetchResult<FetchedPage> {
        self.governor.perform_action_in(&self.ledger, page_url, action).await
    }
}

/// Content classifier wrapper capping concurrent model calls.
pub struct GovernedClassifier {
    inner: Arc<dyn ContentClassifier>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl GovernedClassifier {
    pub fn new(inner: Arc<dyn ContentClassifier>, max_concurrent: usize) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    async fn permit(&self) -> ClassifierResult<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClassifierError::Cancelled),
            permit = self.slots.clone().acquire_owned() => permit.map_err(|_| ClassifierError::Cancelled),
        }
    }
}

#[async_trait]
impl ContentClassifier for GovernedClassifier {
    async fn classify_page(&self, input: ClassifierInput<'_>, taxonomy: &[PageType]) -> ClassifierResult<Label> {
        let _permit = self.permit().await?;
        self.inner.classify_page(input, taxonomy).await
    }

    async fn extract_records(&self, text: &str, schema: &RecordSchema) -> ClassifierResult<Vec<RawRecord>> {
        let _permit = self.permit().await?;
        self.inner.extract_records(text, schema).await
    }

    async fn locate_selector(&self, screenshot: &[u8], objective: &str) -> ClassifierResult<Option<String>> {
        let _permit = self.permit().await?;
        self.inner.locate_selector(screenshot, objective).await
    }

    async fn locate_pagination_control(&self, screenshot: &[u8]) -> ClassifierResult<Option<PageAction>> {
        let _permit = self.permit().await?;
        self.inner.locate_pagination_control(screenshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClassifier, MockFailure, MockGateway};
    use futures::future::join_all;

    fn fast_config() -> GovernorConfig {
        GovernorConfig::default()
            .with_requests_per_second(1000)
            .with_backoff(1, 5)
            .with_jitter_ms(0)
    }

    fn governed(mock: &MockGateway, config: GovernorConfig) -> Arc<GovernedGateway> {
        Arc::new(GovernedGateway::new(Arc::new(mock.clone()), config))
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let mock = MockGateway::new()
            .with_html("https://x.edu/people", "<p>ok</p>")
            .with_flaky("https://x.edu/people", 2, MockFailure::Status(503));
        let gateway = governed(&mock, fast_config()).for_run();

        let page = gateway.fetch("https://x.edu/people", false).await.unwrap();
        assert_eq!(page.html, "<p>ok</p>");
        assert_eq!(mock.fetch_count("https://x.edu/people"), 3);
    }

    #[tokio::test]
    async fn test_retries_capped_and_not_repeated() {
        let mock = MockGateway::new().with_failure("https://x.edu/slow", MockFailure::Timeout);
        let gateway = governed(&mock, fast_config().with_max_attempts(3)).for_run();

        let err = gateway.fetch("https://x.edu/slow", false).await.unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));

        let again = gateway.fetch("https://x.edu/slow/", false).await.unwrap_err();
        assert!(matches!(again, FetchError::PreviouslyFailed { .. }));
        assert_eq!(mock.fetch_count("https://x.edu/slow"), 3);
        assert_eq!(gateway.ledger().failed_urls(), vec!["https://x.edu/slow".to_string()]);
    }

    #[tokio::test]
    async fn test_block_disables_domain() {
        let mock = MockGateway::new()
            .with_page(FetchedPage::new("https://x.edu/people", "captcha").blocked("CAPTCHA"))
            .with_html("https://cs.x.edu/faculty", "<p>ok</p>")
            .with_html("https://y.edu/faculty", "<p>ok</p>");
        let gateway = governed(&mock, fast_config()).for_run();

        let page = gateway.fetch("https://x.edu/people", false).await.unwrap();
        assert!(page.blocked);

        let err = gateway.fetch("https://cs.x.edu/faculty", false).await.unwrap_err();
        assert!(matches!(err, FetchError::DomainDisabled { .. }));
        assert!(gateway.fetch("https://y.edu/faculty", false).await.is_ok());

        assert_eq!(gateway.ledger().disabled_domains(), vec!["x.edu".to_string()]);
        assert_eq!(mock.fetch_count("https://cs.x.edu/faculty"), 0);
    }

    #[tokio::test]
    async fn test_ledger_does_not_outlive_its_run() {
        let mock = MockGateway::new()
            .with_html("https://x.edu/people", "<p>ok</p>")
            .with_flaky("https://x.edu/people", 3, MockFailure::Timeout)
            .with_page(FetchedPage::new("https://y.edu/people", "captcha").blocked("CAPTCHA"));
        let governor = governed(&mock, fast_config().with_max_attempts(3));

        let first = governor.for_run();
        assert!(first.fetch("https://x.edu/people", false).await.is_err());
        assert!(first.fetch("https://y.edu/people", false).await.unwrap().blocked);
        assert!(first.ledger().is_disabled("y.edu"));

        let second = governor.for_run();
        let page = second.fetch("https://x.edu/people", false).await.unwrap();
        assert_eq!(page.html, "<p>ok</p>");
        assert!(!second.ledger().is_disabled("y.edu"));
        assert!(second.ledger().failed_urls().is_empty());
        assert_eq!(mock.fetch_count("https://x.edu/people"), 4);
    }

    #[tokio::test]
    async fn test_per_domain_concurrency_cap() {
        let mock = MockGateway::new().with_delay(Duration::from_millis(20));
        let mock = (0..6).fold(mock, |m, i| m.with_html(&format!("https://x.edu/p{i}"), "<p>ok</p>"));
        let governor = governed(
            &mock,
            GovernorConfig {
                max_concurrent_per_domain: 2,
                ..fast_config()
            },
        );
        let (first, second) = (governor.for_run(), governor.for_run());

        // Two runs share the per-domain slots.
        let urls: Vec<String> = (0..6).map(|i| format!("https://x.edu/p{i}")).collect();
        let fetches = urls.iter().enumerate().map(|(i, u)| {
            let run = if i % 2 == 0 { &first } else { &second };
            run.fetch(u, false)
        });
        let results = join_all(fetches).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(mock.peak_concurrency() <= 2);
    }

    #[tokio::test]
    async fn test_cancellation_stops_backoff() {
        let mock = MockGateway::new().with_failure("https://x.edu/slow", MockFailure::Timeout);
        let cancel = CancellationToken::new();
        let governor = Arc::new(
            GovernedGateway::new(Arc::new(mock), GovernorConfig::default().with_backoff(60_000, 60_000))
                .with_cancellation(cancel.clone()),
        );

        cancel.cancel();
        let err = governor.for_run().fetch("https://x.edu/slow", false).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }

    #[tokio::test]
    async fn test_model_calls_capped() {
        let mock = MockClassifier::new().with_delay(Duration::from_millis(20));
        let classifier = GovernedClassifier::new(Arc::new(mock.clone()), 2);
        let schema = RecordSchema::faculty_profile();

        let calls = (0..6).map(|_| classifier.extract_records("text", &schema));
        let results = join_all(calls).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(mock.peak_concurrency() <= 2);
        assert_eq!(mock.call_count(), 6);
    }
}
