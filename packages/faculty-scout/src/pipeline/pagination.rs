//! Multi-page directory traversal.
//!
//! A small state machine over [`PaginationState`]: structural "next"
//! detection first, then a visual fallback through the content classifier
//! and a simulated click. Each page key and text fingerprint is visited at
//! most once, and traversal stops at the page budget.

use scraper::Html;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::html::{content_fingerprint, element_text, resolve_href, selector};
use crate::pipeline::classify::PageClassifier;
use crate::pipeline::extract::{ExtractionContext, ExtractionEngine};
use crate::pipeline::filter::ProfileFilter;
use crate::pipeline::VisitedSet;
use crate::traits::classifier::ContentClassifier;
use crate::traits::gateway::FetchGateway;
use crate::types::config::PaginationConfig;
use crate::types::page::{FetchedPage, PageClassification, PageType};
use crate::types::profile::{ExtractionTier, ProfileCandidate};
use crate::types::result::{Failure, FailureKind};
use crate::types::url_key::normalize_parsed;

/// Anchor texts that mean "next page".
const NEXT_TEXTS: &[&str] = &["next", "next page", "next »", "next ›", "next >", "»", "›", ">", ">>"];

/// Query parameters that carry a page number.
const PAGE_PARAMS: &[&str] = &["page", "p", "pg", "paged", "pagenum", "page_no"];

/// Containers that hold numbered pagers.
const PAGER_SELECTORS: &str =
    "[class*='pagination'], [class*='pager'], nav[aria-label*='agination'], [role='navigation'][aria-label*='age']";

/// Find the "next page" target of a parsed document.
///
/// Tried in order: `rel=next`, a next-labelled anchor, an anchor whose
/// class or aria-label says next, then the numbered pager.
pub(crate) fn next_link_in(document: &Html, base: &Url) -> Option<Url> {
    let current = normalize_parsed(base);
    let usable = |href: &str| resolve_href(base, href).filter(|u| normalize_parsed(u) != current);

    if let Some(sel) = selector("a[rel~='next'][href], link[rel~='next'][href]") {
        if let Some(url) = document
            .select(&sel)
            .filter_map(|el| el.value().attr("href"))
            .find_map(usable)
        {
            return Some(url);
        }
    }

    let anchors = selector("a[href]")?;
    for el in document.select(&anchors) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let text = element_text(el).to_lowercase();
        let aria = el.value().attr("aria-label").unwrap_or_default().to_lowercase();
        let class = el.value().attr("class").unwrap_or_default().to_lowercase();
        let labelled_next = NEXT_TEXTS.contains(&text.as_str())
            || aria.starts_with("next")
            || class.split_whitespace().any(|c| c == "next" || c.ends_with("-next") || c.ends_with("_next"));
        if labelled_next {
            if let Some(url) = usable(href) {
                return Some(url);
            }
        }
    }

    numbered_next(document, base).and_then(|href| usable(&href))
}

/// The link numbered one past the current page in a numbered pager.
fn numbered_next(document: &Html, base: &Url) -> Option<String> {
    let pager = selector(PAGER_SELECTORS)?;
    let anchors = selector("a[href]")?;
    let current_marker = selector("[aria-current='page'], .active, .current, [class*='current']")?;

    for container in document.select(&pager) {
        let numbered: Vec<(u32, String)> = container
            .select(&anchors)
            .filter_map(|a| {
                let n = element_text(a).parse::<u32>().ok()?;
                Some((n, a.value().attr("href")?.to_string()))
            })
            .collect();
        if numbered.is_empty() {
            continue;
        }

        let current = container
            .select(&current_marker)
            .find_map(|el| element_text(el).parse::<u32>().ok())
            .or_else(|| page_param(base))
            .unwrap_or(1);

        if let Some((_, href)) = numbered.into_iter().find(|(n, _)| *n == current + 1) {
            return Some(href);
        }
    }
    None
}

fn page_param(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(k, _)| PAGE_PARAMS.contains(&k.to_lowercase().as_str()))
        .and_then(|(_, v)| v.parse().ok())
}

/// Next-page link of a raw page.
pub fn find_next_link(html: &str, page_url: &str) -> Option<Url> {
    let base = Url::parse(page_url).ok()?;
    let document = Html::parse_document(html);
    next_link_in(&document, &base)
}

/// Phase of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationPhase {
    Init,
    Following,
    Exhausted,
    Aborted,
}

/// Traversal bookkeeping for one directory.
#[derive(Debug, Clone)]
pub struct PaginationState {
    pub visited_page_keys: HashSet<String>,
    pub fingerprints: HashSet<String>,
    pub frontier: VecDeque<String>,
    pub max_pages: usize,
    pub pages_followed: usize,
    pub phase: PaginationPhase,
    pub stop_reason: Option<String>,
}

impl PaginationState {
    pub fn new(max_pages: usize) -> Self {
        Self {
            visited_page_keys: HashSet::new(),
            fingerprints: HashSet::new(),
            frontier: VecDeque::new(),
            max_pages: max_pages.max(1),
            pages_followed: 0,
            phase: PaginationPhase::Init,
            stop_reason: None,
        }
    }

    /// Record a page as visited. Returns `false` if its key or fingerprint
    /// was already seen.
    pub fn visit(&mut self, key: &str, fingerprint: Option<&str>) -> bool {
        if self.visited_page_keys.contains(key) {
            return false;
        }
        if let Some(fp) = fingerprint {
            if self.fingerprints.contains(fp) {
                return false;
            }
            self.fingerprints.insert(fp.to_string());
        }
        self.visited_page_keys.insert(key.to_string());
        true
    }

    pub fn has_visited(&self, key: &str) -> bool {
        self.visited_page_keys.contains(key)
    }

    /// Queue a next-page key unless already visited or queued.
    pub fn enqueue(&mut self, key: String) -> bool {
        if self.has_visited(&key) || self.frontier.contains(&key) {
            return false;
        }
        self.frontier.push_back(key);
        true
    }

    pub fn budget_left(&self) -> bool {
        self.pages_followed < self.max_pages
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, PaginationPhase::Exhausted | PaginationPhase::Aborted)
    }

    fn exhaust(&mut self, reason: impl Into<String>) {
        self.phase = PaginationPhase::Exhausted;
        self.stop_reason = Some(reason.into());
    }

    fn abort(&mut self, reason: impl Into<String>) {
        self.phase = PaginationPhase::Aborted;
        self.stop_reason = Some(reason.into());
    }
}

/// What a traversal produced.
#[derive(Debug)]
pub struct PaginationReport {
    /// Merged, deduplicated records across every page
    pub records: Vec<ProfileCandidate>,
    pub pages: Vec<String>,
    pub state: PaginationState,
    pub failures: Vec<Failure>,
    pub malformed: usize,
    pub tiers_used: Vec<ExtractionTier>,

    /// Traversal was cut short by a block or cancellation
    pub partial: bool,
}

/// Follows "next" relations from a first directory page.
pub struct PaginationHandler {
    gateway: Arc<dyn FetchGateway>,
    engine: Arc<ExtractionEngine>,
    classifier: Arc<PageClassifier>,
    model: Option<Arc<dyn ContentClassifier>>,
    config: PaginationConfig,
}

enum NextPage {
    Page(FetchedPage),
    Done(&'static str),
    Blocked(String),
    Cancelled,
}

impl PaginationHandler {
    pub fn new(
        gateway: Arc<dyn FetchGateway>,
        engine: Arc<ExtractionEngine>,
        classifier: Arc<PageClassifier>,
        config: PaginationConfig,
    ) -> Self {
        Self {
            gateway,
            engine,
            classifier,
            model: None,
            config,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ContentClassifier>) -> Self {
        self.model = Some(model);
        self
    }

    /// Extract from `first` and every page reachable through "next".
    pub async fn run(
        &self,
        first: FetchedPage,
        first_class: &PageClassification,
        max_pages: usize,
        visited: &VisitedSet,
        cancel: &CancellationToken,
    ) -> PaginationReport {
        let mut state = PaginationState::new(max_pages);
        let mut filter = ProfileFilter::new();
        let mut report = PaginationReport {
            records: Vec::new(),
            pages: Vec::new(),
            state: PaginationState::new(max_pages),
            failures: Vec::new(),
            malformed: 0,
            tiers_used: Vec::new(),
            partial: false,
        };

        let first_key = page_key(&first);
        state.visit(&first_key, self.fingerprint(&first).as_deref());
        visited.insert(&first_key);
        if first_class.page_type.is_listing() {
            state.phase = PaginationPhase::Following;
        }

        let mut page = first;
        let mut index = 0usize;
        let mut selector: Option<String> = None;

        loop {
            let ctx = if index == 0 {
                ExtractionContext::first_page()
            } else {
                ExtractionContext::follow_up(index, self.config.visual_tier_on_followups)
                    .with_selector(selector.clone())
            };
            let outcome = self.engine.extract(&page, &ctx).await;
            if outcome.selector.is_some() {
                selector = outcome.selector.clone();
            }
            state.pages_followed += 1;
            report.pages.push(page.final_url.clone());
            report.malformed += outcome.malformed;
            if let Some(tier) = outcome.tier_used {
                report.tiers_used.push(tier);
            }
            if let Some(failure) = outcome.failure {
                report.failures.push(failure);
            }
            let known = filter.len();
            filter.extend(outcome.records);

            if state.phase != PaginationPhase::Following {
                state.exhaust("single page");
                break;
            }
            if index > 0 && filter.len() == known {
                state.exhaust("page added no new profiles");
                break;
            }
            if !state.budget_left() {
                state.exhaust("page budget reached");
                break;
            }
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => NextPage::Cancelled,
                next = self.next_page(&page, first_class.page_type, index, &mut state, &mut report) => next,
            };

            match next {
                NextPage::Page(next_page) => {
                    let key = page_key(&next_page);
                    let fingerprint = self.fingerprint(&next_page);
                    if !state.visit(&key, fingerprint.as_deref()) {
                        state.exhaust("next page already visited");
                        break;
                    }
                    if !visited.insert(&key) {
                        state.exhaust("next page claimed by another directory");
                        break;
                    }
                    debug!(url = %next_page.final_url, page = index + 2, "Following next page");
                    page = next_page;
                    index += 1;
                }
                NextPage::Done(reason) => {
                    state.exhaust(reason);
                    break;
                }
                NextPage::Cancelled => {
                    state.abort("cancelled");
                    report.partial = true;
                    report
                        .failures
                        .push(Failure::new(&page.final_url, FailureKind::Cancelled, "pagination cancelled"));
                    break;
                }
                NextPage::Blocked(reason) => {
                    warn!(url = %page.final_url, %reason, "Pagination aborted by block");
                    report
                        .failures
                        .push(Failure::new(&page.final_url, FailureKind::Blocked, reason.clone()));
                    state.abort(reason);
                    report.partial = true;
                    break;
                }
            }
        }

        info!(
            url = %report.pages.first().cloned().unwrap_or_default(),
            pages = state.pages_followed,
            phase = ?state.phase,
            reason = state.stop_reason.as_deref().unwrap_or_default(),
            "Pagination finished"
        );

        report.records = filter.finish();
        report.state = state;
        report
    }

    fn fingerprint(&self, page: &FetchedPage) -> Option<String> {
        self.config
            .content_fingerprint
            .then(|| content_fingerprint(&page.html))
    }

    async fn next_page(
        &self,
        page: &FetchedPage,
        page_type: PageType,
        index: usize,
        state: &mut PaginationState,
        report: &mut PaginationReport,
    ) -> NextPage {
        if let Some(url) = find_next_link(&page.html, &page.final_url) {
            if !state.enqueue(normalize_parsed(&url)) {
                return NextPage::Done("next link points at a visited page");
            }
            state.frontier.pop_front();
            return self.fetch_next(url.as_str(), report).await;
        }

        let Some(model) = self.model.as_ref().filter(|_| self.config.visual_fallback) else {
            return NextPage::Done("no next link");
        };
        // Only a page first judged paginated gets the visual fallback.
        if page_type != PageType::Paginated {
            return NextPage::Done("no next link");
        }

        let rendered = match page.screenshot {
            Some(_) => page.clone(),
            None => match self.gateway.fetch(&page.final_url, true).await {
                Ok(p) if p.blocked => return NextPage::Blocked(p.block_reason.unwrap_or_default()),
                Ok(p) => p,
                Err(e) if e.is_block() => return NextPage::Blocked(e.to_string()),
                Err(e) => {
                    debug!(url = %page.final_url, error = %e, "No rendered page for visual pagination");
                    return NextPage::Done("no next link");
                }
            },
        };
        let Some(screenshot) = rendered.screenshot.as_deref().filter(|s| !s.is_empty()) else {
            return NextPage::Done("no next link");
        };

        // Later pages are re-judged from their own screenshot.
        if index > 0 && self.classifier.classify_page(&rendered).await.page_type != PageType::Paginated {
            return NextPage::Done("page no longer paginated");
        }

        let action = match model.locate_pagination_control(screenshot).await {
            Ok(Some(action)) => action,
            Ok(None) => return NextPage::Done("no next control located"),
            Err(e) => {
                warn!(url = %page.final_url, error = %e, "Pagination control lookup failed");
                return NextPage::Done("no next control located");
            }
        };

        debug!(url = %page.final_url, action = %action.description, "Simulating next-page interaction");
        match self.gateway.perform_action(&page.final_url, &action).await {
            Ok(p) if p.blocked => NextPage::Blocked(p.block_reason.unwrap_or_default()),
            Ok(mut p) => {
                // An in-place update keeps the URL; give it a distinct key.
                if normalize_url_str(&p.final_url) == normalize_url_str(&page.final_url) {
                    p.final_url = format!("{}#page-{}", page.final_url, index + 2);
                }
                NextPage::Page(p)
            }
            Err(e) if e.is_block() => NextPage::Blocked(e.to_string()),
            Err(e) => {
                report.failures.push(Failure::from_fetch(&page.final_url, &e));
                NextPage::Done("next-page interaction failed")
            }
        }
    }

    async fn fetch_next(&self, url: &str, report: &mut PaginationReport) -> NextPage {
        match self.gateway.fetch(url, false).await {
            Ok(page) if page.blocked => NextPage::Blocked(page.block_reason.unwrap_or_else(|| "blocked".into())),
            Ok(page) => NextPage::Page(page),
            Err(e) if e.is_block() => NextPage::Blocked(e.to_string()),
            Err(e) => {
                report.failures.push(Failure::from_fetch(url, &e));
                report.partial = true;
                NextPage::Done("next page fetch failed")
            }
        }
    }
}

fn normalize_url_str(raw: &str) -> String {
    crate::types::url_key::normalize_url(raw).unwrap_or_else(|| raw.to_string())
}

/// Visited key of a page: its final URL, keeping a synthetic page marker
/// added for in-place interactions.
fn page_key(page: &FetchedPage) -> String {
    match page.final_url.split_once("#page-") {
        Some((base, n)) => format!("{}#page-{n}", normalize_url_str(base)),
        None => normalize_url_str(&page.final_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClassifier, MockFailure, MockFetchCall, MockGateway};
    use crate::traits::gateway::PageAction;
    use crate::types::config::{ClassifierConfig, ExtractionConfig};

    const BASE: &str = "https://x.edu/people";

    fn listing(names: &[&str], next: Option<&str>) -> String {
        let cards: String = names
            .iter()
            .map(|n| {
                let user = n.to_lowercase().replace(' ', ".");
                format!(r#"<div class="profile-card"><h3>{n}</h3><a href="mailto:{user}@x.edu">Email</a></div>"#)
            })
            .collect();
        let pager = next
            .map(|href| format!(r#"<nav class="pagination"><a rel="next" href="{href}">Next</a></nav>"#))
            .unwrap_or_default();
        format!("<html><body><main>{cards}</main>{pager}</body></html>")
    }

    fn page_url(n: usize) -> String {
        format!("{BASE}?page={n}")
    }

    fn handler(gateway: &MockGateway) -> PaginationHandler {
        let gateway: Arc<dyn FetchGateway> = Arc::new(gateway.clone());
        let engine = ExtractionEngine::standard(&ExtractionConfig::default(), None, gateway.clone());
        PaginationHandler::new(
            gateway,
            Arc::new(engine),
            Arc::new(PageClassifier::new(ClassifierConfig::default())),
            PaginationConfig::default(),
        )
    }

    fn paginated(url: &str) -> PageClassification {
        PageClassification::heuristic(url, PageType::Paginated, 0.85)
    }

    #[test]
    fn test_find_next_link_variants() {
        let rel = r#"<a rel="next" href="/people?page=2">2</a>"#;
        assert_eq!(find_next_link(rel, BASE).unwrap().as_str(), "https://x.edu/people?page=2");

        let text = r#"<a href="/people?start=20">Next ›</a>"#;
        assert_eq!(find_next_link(text, BASE).unwrap().as_str(), "https://x.edu/people?start=20");

        let numbered = r#"<ul class="pagination">
            <li class="active"><a href="?page=1">1</a></li>
            <li><a href="?page=2">2</a></li>
            <li><a href="?page=3">3</a></li></ul>"#;
        assert_eq!(find_next_link(numbered, &page_url(1)).unwrap().as_str(), page_url(2));

        let self_link = r#"<a rel="next" href="/people">Next</a>"#;
        assert!(find_next_link(self_link, BASE).is_none());
    }

    #[test]
    fn test_state_rejects_repeat_key_and_fingerprint() {
        let mut state = PaginationState::new(5);
        assert!(state.visit("a", Some("fp1")));
        assert!(!state.visit("a", Some("fp2")));
        assert!(!state.visit("b", Some("fp1")));
        assert!(state.visit("c", None));
        assert!(!state.enqueue("a".into()));
        assert!(state.enqueue("d".into()));
        assert!(!state.enqueue("d".into()));
    }

    #[tokio::test]
    async fn test_boundary_duplicate_merged_across_pages() {
        let gateway = MockGateway::new().with_html(
            &page_url(2),
            &listing(&["Grace Hopper", "Edsger Dijkstra", "Barbara Liskov"], None),
        );
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 10, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.records.len(), 5);
        let graces = report.records.iter().filter(|r| r.name == "Grace Hopper").count();
        assert_eq!(graces, 1);
        assert_eq!(report.state.phase, PaginationPhase::Exhausted);
        assert!(!report.partial);
    }

    #[tokio::test]
    async fn test_cycle_stops_without_refetch() {
        let gateway = MockGateway::new()
            .with_html(&page_url(2), &listing(&["Donald Knuth", "Frances Allen", "John Backus"], Some("?page=3")))
            .with_html(&page_url(3), &listing(&["Niklaus Wirth", "Tony Hoare", "Ken Thompson"], Some("?page=1")))
            .with_html(&page_url(1), "<html></html>");
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 10, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.pages.len(), 3);
        assert_eq!(report.records.len(), 9);
        assert_eq!(gateway.fetch_count(&page_url(1)), 0);
        assert_eq!(gateway.fetch_count(&page_url(2)), 1);
        assert_eq!(
            report.state.stop_reason.as_deref(),
            Some("next link points at a visited page")
        );
    }

    #[tokio::test]
    async fn test_page_budget_bounds_traversal() {
        let gateway = (2..=5).fold(MockGateway::new(), |gw, n| {
            let names = [["Donald Knuth", "Frances Allen", "John Backus"], ["Niklaus Wirth", "Tony Hoare", "Ken Thompson"]];
            gw.with_html(&page_url(n), &listing(&names[n % 2], Some(format!("?page={}", n + 1).as_str())))
        });
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 2, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.state.pages_followed, 2);
        assert_eq!(report.state.stop_reason.as_deref(), Some("page budget reached"));
        assert_eq!(gateway.fetch_count(&page_url(3)), 0);
    }

    #[tokio::test]
    async fn test_page_without_new_profiles_ends_traversal() {
        let gateway = MockGateway::new()
            .with_html(&page_url(2), &listing(&["Grace Hopper", "Ada Lovelace", "Alan Turing"], Some("?page=3")))
            .with_html(&page_url(3), &listing(&["Donald Knuth", "Frances Allen", "John Backus"], None));
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 10, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.state.stop_reason.as_deref(), Some("page added no new profiles"));
        assert_eq!(gateway.fetch_count(&page_url(3)), 0);
    }

    #[tokio::test]
    async fn test_follow_up_reuses_validated_selector() {
        const SHOT: &[u8] = b"png:obfuscated-grid";
        fn tiles(names: &[&str]) -> String {
            names
                .iter()
                .map(|n| format!(r#"<div class="x9f"><span>{n}</span></div>"#))
                .collect()
        }

        let rendered = format!("<html><body><div id='app'>{}</div></body></html>", tiles(&["Ada Lovelace", "Alan Turing"]));
        let gateway = MockGateway::new()
            .with_rendered(FetchedPage::new(page_url(1), rendered).with_screenshot(SHOT.to_vec()))
            .with_html(
                &page_url(2),
                &format!("<html><body><div id='app'>{}</div></body></html>", tiles(&["Donald Knuth", "Frances Allen"])),
            );
        let classifier = MockClassifier::new().with_selector(SHOT, "div.x9f");

        let shared: Arc<dyn FetchGateway> = Arc::new(gateway.clone());
        let engine = ExtractionEngine::standard(
            &ExtractionConfig::default(),
            Some(Arc::new(classifier.clone()) as Arc<dyn ContentClassifier>),
            shared.clone(),
        );
        let handler = PaginationHandler::new(
            shared,
            Arc::new(engine),
            Arc::new(PageClassifier::new(ClassifierConfig::default())),
            PaginationConfig::default(),
        );
        let first = FetchedPage::new(
            page_url(1),
            r#"<html><body><div id='app'><p>Loading directory</p></div>
               <nav class="pagination"><a rel="next" href="?page=2">Next</a></nav></body></html>"#,
        );

        let report = handler
            .run(first, &paginated(&page_url(1)), 10, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.tiers_used, vec![ExtractionTier::VisualModel, ExtractionTier::Structural]);
        assert!(report.records.iter().all(|r| r.extraction_tier == ExtractionTier::Structural));
        // Textual and selector calls on the first page only.
        assert_eq!(classifier.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_listing_page_is_not_followed() {
        let gateway = MockGateway::new();
        let first = FetchedPage::new(BASE, listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], None));
        let class = PageClassification::heuristic(BASE, PageType::Profile, 0.7);

        let report = handler(&gateway)
            .run(first, &class, 10, &VisitedSet::new(), &CancellationToken::new())
            .await;
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.state.stop_reason.as_deref(), Some("single page"));
        assert_eq!(gateway.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_visual_fallback_clicks_next_control() {
        const SHOT: &[u8] = b"png:listing-with-arrow";
        let second = FetchedPage::new(BASE, listing(&["Donald Knuth", "Frances Allen", "John Backus"], None));
        let gateway = MockGateway::new().with_action_result(BASE, second);
        let model = MockClassifier::new().with_pagination_control(SHOT, PageAction::new("click the › arrow"));

        let first = FetchedPage::new(BASE, listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], None))
            .with_screenshot(SHOT.to_vec());

        let report = handler(&gateway)
            .with_model(Arc::new(model))
            .run(first, &paginated(BASE), 10, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.records.len(), 6);
        assert_eq!(report.pages, vec![BASE.to_string(), format!("{BASE}#page-2")]);
        assert!(gateway.calls().contains(&MockFetchCall::Action {
            page_url: BASE.to_string(),
            description: "click the › arrow".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_block_mid_sequence_keeps_earlier_records() {
        let gateway = MockGateway::new().with_failure(&page_url(2), MockFailure::Blocked("CAPTCHA".into()));
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 10, &VisitedSet::new(), &CancellationToken::new())
            .await;

        assert_eq!(report.records.len(), 3);
        assert!(report.partial);
        assert_eq!(report.state.phase, PaginationPhase::Aborted);
        assert!(report.failures.iter().any(|f| f.kind == FailureKind::Blocked));
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_report() {
        let gateway = MockGateway::new().with_html(
            &page_url(2),
            &listing(&["Donald Knuth", "Frances Allen", "John Backus"], None),
        );
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 10, &VisitedSet::new(), &cancel)
            .await;

        assert_eq!(report.records.len(), 3);
        assert!(report.partial);
        assert_eq!(gateway.fetch_count(&page_url(2)), 0);
    }

    #[tokio::test]
    async fn test_shared_visited_set_prevents_double_extraction() {
        let gateway = MockGateway::new().with_html(
            &page_url(2),
            &listing(&["Donald Knuth", "Frances Allen", "John Backus"], None),
        );
        let visited = VisitedSet::new();
        visited.insert(&page_url(2));
        let first = FetchedPage::new(
            page_url(1),
            listing(&["Ada Lovelace", "Alan Turing", "Grace Hopper"], Some("?page=2")),
        );

        let report = handler(&gateway)
            .run(first, &paginated(&page_url(1)), 10, &visited, &CancellationToken::new())
            .await;

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.records.len(), 3);
    }
}
