//! Discovery agent: root URL to ranked candidate directory URLs.
//!
//! Tiers, cheapest first:
//! - sitemap: robots.txt `Sitemap:` lines and conventional locations
//! - deep: bounded same-site BFS that only expands promising links
//! - search: an external web searcher
//! - vision: screenshot verification of the top candidates (auto mode only,
//!   and only when the cheaper tiers are inconclusive)
//!
//! Tier failures never propagate; they are recorded as skipped tiers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::html;
use crate::names::is_department_label;
use crate::pipeline::scorer::UrlScorer;
use crate::sitemap::{RobotsRules, Sitemap, SITEMAP_PATHS};
use crate::traits::classifier::{ClassifierInput, ContentClassifier};
use crate::traits::gateway::FetchGateway;
use crate::traits::searcher::WebSearcher;
use crate::types::candidate::{clamp_score, CandidateSet, CandidateUrl, SourceTier};
use crate::types::config::{DiscoveryConfig, DiscoveryMode, RunLimits};
use crate::types::page::{FetchedPage, LinkPosition, PageType};
use crate::types::result::{DiscoveryConfidence, Failure, FailureKind};
use crate::types::url_key::{normalize_parsed, same_site, strip_public_suffix};

/// Agent token matched against robots.txt groups.
pub const ROBOTS_AGENT: &str = "faculty-scout";

/// A tier that contributed nothing, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTier {
    pub tier: SourceTier,
    pub reason: String,
}

/// Output of [`DiscoveryAgent::discover`].
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// Candidates by score descending, ties in discovery order
    pub candidates: Vec<CandidateUrl>,
    pub confidence: DiscoveryConfidence,
    pub skipped: Vec<SkippedTier>,
    pub pages_fetched: usize,
    pub failures: Vec<Failure>,

    /// The root domain answered with a block condition
    pub blocked: bool,
}

impl DiscoveryReport {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            confidence: DiscoveryConfidence::None,
            skipped: Vec::new(),
            pages_fetched: 0,
            failures: Vec::new(),
            blocked: false,
        }
    }

    fn skip(&mut self, tier: SourceTier, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(tier = ?tier, reason = %reason, "Discovery tier skipped");
        self.skipped.push(SkippedTier { tier, reason });
    }
}

/// Converts a root URL into ranked candidate directory URLs.
pub struct DiscoveryAgent {
    gateway: Arc<dyn FetchGateway>,
    classifier: Option<Arc<dyn ContentClassifier>>,
    searcher: Option<Arc<dyn WebSearcher>>,
    scorer: UrlScorer,
    config: DiscoveryConfig,
}

impl DiscoveryAgent {
    pub fn new(gateway: Arc<dyn FetchGateway>, scorer: UrlScorer, config: DiscoveryConfig) -> Self {
        Self {
            gateway,
            classifier: None,
            searcher: None,
            scorer,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_searcher(mut self, searcher: Arc<dyn WebSearcher>) -> Self {
        self.searcher = Some(searcher);
        self
    }

    /// Discover candidate directory URLs for `root`.
    pub async fn discover(
        &self,
        root: &Url,
        mode: DiscoveryMode,
        limits: &RunLimits,
        cancel: &CancellationToken,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::new();
        let mut set = CandidateSet::new();
        let mut verified = false;

        match mode {
            DiscoveryMode::Sitemap => {
                let robots = self.load_robots(root, &mut report).await;
                self.sitemap_tier(root, robots.as_ref(), &mut set, &mut report).await;
            }
            DiscoveryMode::Deep => {
                let robots = self.load_robots(root, &mut report).await;
                self.deep_tier(root, robots.as_ref(), limits, &mut set, &mut report, cancel)
                    .await;
            }
            DiscoveryMode::Search => {
                self.search_tier(root, limits, &mut set, &mut report).await;
            }
            DiscoveryMode::Auto => {
                let robots = self.load_robots(root, &mut report).await;
                self.sitemap_tier(root, robots.as_ref(), &mut set, &mut report).await;

                if !report.blocked && !self.is_confident(&set) && !cancel.is_cancelled() {
                    debug!(root = %root, top = ?set.top_score(), "Sitemap inconclusive, crawling");
                    self.deep_tier(root, robots.as_ref(), limits, &mut set, &mut report, cancel)
                        .await;
                }

                if !report.blocked && !self.is_confident(&set) && !cancel.is_cancelled() {
                    verified = self.vision_tier(&mut set, &mut report).await;
                }
            }
        }

        report.confidence = if set.is_empty() {
            if mode == DiscoveryMode::Deep || mode == DiscoveryMode::Auto {
                // Budget spent without a candidate: reported, not raised.
                DiscoveryConfidence::Low
            } else {
                DiscoveryConfidence::None
            }
        } else if verified || self.is_confident(&set) {
            DiscoveryConfidence::High
        } else {
            DiscoveryConfidence::Low
        };
        report.candidates = set.into_ranked();

        info!(
            root = %root,
            mode = %mode,
            candidates = report.candidates.len(),
            confidence = ?report.confidence,
            pages_fetched = report.pages_fetched,
            "Discovery finished"
        );
        report
    }

    fn is_confident(&self, set: &CandidateSet) -> bool {
        set.top_score()
            .is_some_and(|top| top >= self.config.confidence_threshold)
    }

    /// Fetch a URL, recording blocks and (unless `quiet`) other failures.
    async fn fetch(
        &self,
        url: &str,
        render: bool,
        quiet: bool,
        report: &mut DiscoveryReport,
    ) -> Option<FetchedPage> {
        match self.gateway.fetch(url, render).await {
            Ok(page) if page.blocked => {
                let reason = page.block_reason.unwrap_or_else(|| "blocked".to_string());
                report
                    .failures
                    .push(Failure::new(url, FailureKind::Blocked, reason));
                report.blocked = true;
                None
            }
            Ok(page) => {
                report.pages_fetched += 1;
                Some(page)
            }
            Err(err) => {
                if err.is_block() {
                    report.blocked = true;
                    report.failures.push(Failure::from_fetch(url, &err));
                } else if !quiet {
                    report.failures.push(Failure::from_fetch(url, &err));
                } else {
                    debug!(url = %url, error = %err, "Optional fetch failed");
                }
                None
            }
        }
    }

    async fn load_robots(&self, root: &Url, report: &mut DiscoveryReport) -> Option<RobotsRules> {
        let robots_url = root.join("/robots.txt").ok()?;
        let page = self.fetch(robots_url.as_str(), false, true, report).await?;
        Some(RobotsRules::parse(&page.html, ROBOTS_AGENT))
    }

    async fn sitemap_tier(
        &self,
        root: &Url,
        robots: Option<&RobotsRules>,
        set: &mut CandidateSet,
        report: &mut DiscoveryReport,
    ) {
        let mut locations: Vec<String> = robots
            .map(|r| r.sitemaps().to_vec())
            .unwrap_or_default();
        for path in SITEMAP_PATHS {
            if let Ok(url) = root.join(path) {
                let url = url.to_string();
                if !locations.contains(&url) {
                    locations.push(url);
                }
            }
        }

        let mut page_urls: Vec<(String, String)> = Vec::new();
        let mut found_any = false;

        for location in &locations {
            if report.blocked {
                break;
            }
            let Some(page) = self.fetch(location, false, true, report).await else {
                continue;
            };
            match Sitemap::parse(&page.html) {
                Some(Sitemap::UrlSet(urls)) => {
                    found_any = true;
                    page_urls.extend(urls.into_iter().map(|u| (u, location.clone())));
                }
                Some(Sitemap::Index(children)) => {
                    found_any = true;
                    for child in children.iter().take(self.config.max_child_sitemaps) {
                        let Some(child_page) = self.fetch(child, false, true, report).await else {
                            continue;
                        };
                        // Nested indexes are not followed further.
                        if let Some(Sitemap::UrlSet(urls)) = Sitemap::parse(&child_page.html) {
                            page_urls.extend(urls.into_iter().map(|u| (u, child.clone())));
                        }
                    }
                }
                None => debug!(url = %location, "Not a sitemap"),
            }
            if found_any {
                break;
            }
        }

        if !found_any {
            report.skip(SourceTier::Sitemap, "no parseable sitemap");
            return;
        }

        let mut tier = CandidateSet::new();
        for (url, sitemap) in page_urls {
            let Ok(parsed) = Url::parse(&url) else {
                continue;
            };
            if !same_site(root, &parsed) {
                continue;
            }
            let score = self.scorer.score(&url, "", LinkPosition::Unknown);
            if score >= self.config.sitemap_threshold {
                tier.insert(CandidateUrl::new(url, SourceTier::Sitemap, score, sitemap));
            }
        }

        if tier.is_empty() {
            report.skip(SourceTier::Sitemap, "no sitemap entry above threshold");
            return;
        }
        for candidate in tier
            .into_ranked()
            .into_iter()
            .take(self.config.sitemap_top_n)
        {
            set.insert(candidate);
        }
    }

    async fn deep_tier(
        &self,
        root: &Url,
        robots: Option<&RobotsRules>,
        limits: &RunLimits,
        set: &mut CandidateSet,
        report: &mut DiscoveryReport,
        cancel: &CancellationToken,
    ) {
        let mut queue: VecDeque<(Url, usize)> = VecDeque::from([(root.clone(), 0)]);
        let mut visited: HashSet<String> = HashSet::from([normalize_parsed(root)]);
        let mut attempted = 0usize;
        let before = set.len();

        while let Some((url, depth)) = queue.pop_front() {
            if attempted >= limits.deep_max_pages || cancel.is_cancelled() || report.blocked {
                break;
            }
            // Failed fetches spend the budget too.
            attempted += 1;
            let Some(page) = self.fetch(url.as_str(), false, false, report).await else {
                continue;
            };

            for candidate in self.score_links(root, &page, self.config.deep_admission_threshold) {
                let Ok(target) = Url::parse(&candidate.url) else {
                    continue;
                };
                if robots.is_some_and(|r| !r.is_allowed(target.path())) {
                    continue;
                }
                if depth < limits.deep_max_depth && visited.insert(normalize_parsed(&target)) {
                    queue.push_back((target, depth + 1));
                }
                if candidate.score >= self.config.deep_result_threshold {
                    set.insert(candidate);
                }
            }
        }

        debug!(root = %root, attempted, queued = queue.len(), "Deep crawl finished");
        if set.len() == before {
            report.skip(
                SourceTier::KeywordCrawl,
                format!("no link above threshold in {attempted} pages"),
            );
        }
    }

    /// Same-site links of a page scored at or above `threshold`, as
    /// keyword-crawl candidates discovered from that page.
    pub fn score_links(&self, root: &Url, page: &FetchedPage, threshold: f32) -> Vec<CandidateUrl> {
        let base = Url::parse(&page.final_url).unwrap_or_else(|_| root.clone());
        let links = if page.links.is_empty() {
            html::extract_links(&page.html, &base)
        } else {
            page.links.clone()
        };

        links
            .into_iter()
            .filter_map(|link| {
                let target = Url::parse(&link.url).ok()?;
                if !same_site(root, &target) {
                    return None;
                }
                let score = self.scorer.score(&link.url, &link.text, link.position);
                (score >= threshold).then(|| {
                    CandidateUrl::new(link.url, SourceTier::KeywordCrawl, score, page.url.clone())
                })
            })
            .collect()
    }

    /// Child candidates of a gateway page: directory-like links first,
    /// otherwise links to academic units.
    pub fn expand_gateway(&self, root: &Url, page: &FetchedPage, max: usize) -> Vec<CandidateUrl> {
        let mut children = CandidateSet::new();
        children.extend(self.score_links(root, page, self.config.deep_result_threshold));

        if children.is_empty() {
            let base = Url::parse(&page.final_url).unwrap_or_else(|_| root.clone());
            let links = if page.links.is_empty() {
                html::extract_links(&page.html, &base)
            } else {
                page.links.clone()
            };
            for link in links {
                let Ok(target) = Url::parse(&link.url) else {
                    continue;
                };
                if same_site(root, &target)
                    && (is_department_label(&link.text) || is_department_label(target.path()))
                {
                    let score = self.scorer.score(&link.url, &link.text, link.position);
                    children.insert(CandidateUrl::new(
                        link.url,
                        SourceTier::KeywordCrawl,
                        score,
                        page.url.clone(),
                    ));
                }
            }
        }

        let mut ranked = children.into_ranked();
        ranked.truncate(max);
        ranked
    }

    async fn search_tier(
        &self,
        root: &Url,
        limits: &RunLimits,
        set: &mut CandidateSet,
        report: &mut DiscoveryReport,
    ) {
        let Some(searcher) = &self.searcher else {
            report.skip(SourceTier::SearchEngine, "no web searcher configured");
            return;
        };

        let institution = limits
            .institution_name
            .clone()
            .unwrap_or_else(|| institution_name(root));
        let query = format!("{institution} faculty directory");

        let results = match searcher.search(&query, self.config.search_max_results).await {
            Ok(results) => results,
            Err(err) => {
                report.skip(SourceTier::SearchEngine, err.to_string());
                return;
            }
        };

        let before = set.len();
        for result in results {
            if !same_site(root, &result.url) {
                continue;
            }
            set.insert(CandidateUrl::new(
                result.url.to_string(),
                SourceTier::SearchEngine,
                self.config.search_prior_score,
                root.to_string(),
            ));
        }
        if set.len() == before {
            report.skip(SourceTier::SearchEngine, format!("no on-site results for {query:?}"));
        }
    }

    /// Show screenshots of the top candidates to the classifier. Confirmed
    /// directories are re-tagged as vision candidates with the model's
    /// confidence. Returns whether any candidate was confirmed.
    async fn vision_tier(&self, set: &mut CandidateSet, report: &mut DiscoveryReport) -> bool {
        if !self.config.vision_verification {
            return false;
        }
        let Some(classifier) = &self.classifier else {
            report.skip(SourceTier::Vision, "no content classifier configured");
            return false;
        };
        if set.is_empty() {
            report.skip(SourceTier::Vision, "nothing to verify");
            return false;
        }

        let mut confirmed = false;
        for candidate in set.ranked().into_iter().take(self.config.vision_top_k) {
            let Some(page) = self.fetch(&candidate.url, true, false, report).await else {
                continue;
            };
            let Some(screenshot) = page.screenshot.as_deref().filter(|s| !s.is_empty()) else {
                report.skip(SourceTier::Vision, "gateway returned no screenshot");
                break;
            };

            let label = match classifier
                .classify_page(ClassifierInput::Screenshot(screenshot), &PageType::TAXONOMY)
                .await
            {
                Ok(label) => label,
                Err(err) => {
                    warn!(url = %candidate.url, error = %err, "Vision verification failed");
                    continue;
                }
            };

            let page_type = PageType::from_label(&label.label);
            let is_listing = page_type.is_some_and(|t| t.is_listing());
            if is_listing && label.confidence >= self.config.vision_min_confidence {
                if let Some(entry) = candidate.key().and_then(|k| set.get_mut(&k)) {
                    entry.source_tier = SourceTier::Vision;
                    entry.score = entry.score.max(clamp_score(label.confidence));
                }
                confirmed = true;
                debug!(url = %candidate.url, confidence = label.confidence, "Vision confirmed directory");
            }
        }
        confirmed
    }
}

/// Human-readable institution name derived from a root URL's host.
pub fn institution_name(root: &Url) -> String {
    let host = root.host_str().unwrap_or_default();
    strip_public_suffix(host)
        .split(['.', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockClassifier, MockFailure, MockGateway, MockSearcher};
    use crate::types::config::ScoringConfig;

    const ROOT: &str = "https://www.x.edu/";

    fn agent(gateway: &MockGateway) -> DiscoveryAgent {
        agent_with(gateway, DiscoveryConfig::default())
    }

    fn agent_with(gateway: &MockGateway, config: DiscoveryConfig) -> DiscoveryAgent {
        DiscoveryAgent::new(
            Arc::new(gateway.clone()),
            UrlScorer::new(ScoringConfig::default()),
            config,
        )
    }

    fn urlset(urls: &[&str]) -> String {
        let entries: String = urls.iter().map(|u| format!("<url><loc>{u}</loc></url>")).collect();
        format!(r#"<?xml version="1.0"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{entries}</urlset>"#)
    }

    async fn discover(agent: &DiscoveryAgent, mode: DiscoveryMode) -> DiscoveryReport {
        let root = Url::parse(ROOT).unwrap();
        agent
            .discover(&root, mode, &RunLimits::default(), &CancellationToken::new())
            .await
    }

    #[test]
    fn test_institution_name() {
        let mit = Url::parse("https://www.mit.edu/").unwrap();
        assert_eq!(institution_name(&mit), "Mit");
        let ox = Url::parse("https://cs.ox.ac.uk/people").unwrap();
        assert_eq!(institution_name(&ox), "Cs Ox");
    }

    #[tokio::test]
    async fn test_sitemap_ranks_directory_first() {
        let gateway = MockGateway::new().with_text(
            "https://www.x.edu/sitemap.xml",
            &urlset(&[
                "https://www.x.edu/about",
                "https://www.x.edu/news/2024",
                "https://www.x.edu/faculty/jane-doe",
                "https://www.x.edu/faculty/index.html",
                "https://partner.org/faculty",
            ]),
        );
        let report = discover(&agent(&gateway), DiscoveryMode::Auto).await;

        let urls: Vec<&str> = report.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.x.edu/faculty/index.html", "https://www.x.edu/faculty/jane-doe"]
        );
        assert!(report.candidates.iter().all(|c| c.source_tier == SourceTier::Sitemap));
        assert_eq!(report.confidence, DiscoveryConfidence::High);
        // Confident sitemap: the homepage is never crawled.
        assert_eq!(gateway.fetch_count(ROOT), 0);
    }

    #[tokio::test]
    async fn test_robots_sitemap_and_index_followed() {
        let gateway = MockGateway::new()
            .with_text(
                "https://www.x.edu/robots.txt",
                "User-agent: *\nDisallow: /private\nSitemap: https://www.x.edu/maps/main.xml\n",
            )
            .with_text(
                "https://www.x.edu/maps/main.xml",
                r#"<sitemapindex><sitemap><loc>https://www.x.edu/maps/pages.xml</loc></sitemap></sitemapindex>"#,
            )
            .with_text("https://www.x.edu/maps/pages.xml", &urlset(&["https://www.x.edu/people"]));
        let report = discover(&agent(&gateway), DiscoveryMode::Sitemap).await;

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].discovered_from, "https://www.x.edu/maps/pages.xml");
        assert_eq!(gateway.fetch_count("https://www.x.edu/sitemap.xml"), 0);
    }

    #[tokio::test]
    async fn test_deep_crawl_when_no_sitemap() {
        let gateway = MockGateway::new()
            .with_html(
                ROOT,
                r#"<nav><a href="/academics/faculty">Our Faculty</a><a href="/events">Events</a></nav>
                   <main><a href="/about">About us</a></main>"#,
            )
            .with_html("https://www.x.edu/academics/faculty", "<h1>Faculty</h1>");
        let report = discover(&agent(&gateway), DiscoveryMode::Auto).await;

        assert_eq!(report.candidates.len(), 1);
        let top = &report.candidates[0];
        assert_eq!(top.url, "https://www.x.edu/academics/faculty");
        assert_eq!(top.source_tier, SourceTier::KeywordCrawl);
        assert_eq!(top.discovered_from, ROOT);
        assert_eq!(report.confidence, DiscoveryConfidence::High);
        assert!(report
            .skipped
            .iter()
            .any(|s| s.tier == SourceTier::Sitemap && s.reason == "no parseable sitemap"));
    }

    #[tokio::test]
    async fn test_deep_crawl_respects_robots() {
        let gateway = MockGateway::new()
            .with_text("https://www.x.edu/robots.txt", "User-agent: *\nDisallow: /faculty\n")
            .with_html(ROOT, r#"<nav><a href="/faculty">Faculty</a></nav>"#);
        let report = discover(&agent(&gateway), DiscoveryMode::Deep).await;

        assert!(report.candidates.is_empty());
        assert_eq!(report.confidence, DiscoveryConfidence::Low);
        assert!(report.skipped.iter().any(|s| s.tier == SourceTier::KeywordCrawl));
    }

    #[tokio::test]
    async fn test_deep_crawl_budget_counts_failed_fetches() {
        let gateway = MockGateway::new().with_html(
            ROOT,
            r#"<nav>
                 <a href="/biology/faculty">Biology Faculty</a>
                 <a href="/chemistry/faculty">Chemistry Faculty</a>
                 <a href="/physics/faculty">Physics Faculty</a>
                 <a href="/history/faculty">History Faculty</a>
               </nav>"#,
        );
        let root = Url::parse(ROOT).unwrap();
        let limits = RunLimits::default().with_deep_crawl(3, 2);
        agent(&gateway)
            .discover(&root, DiscoveryMode::Deep, &limits, &CancellationToken::new())
            .await;

        // Root plus two department pages, all of which 404.
        let departments: usize = ["biology", "chemistry", "physics", "history"]
            .iter()
            .map(|d| gateway.fetch_count(&format!("https://www.x.edu/{d}/faculty")))
            .sum();
        assert_eq!(gateway.fetch_count(ROOT), 1);
        assert_eq!(departments, 2);
    }

    #[tokio::test]
    async fn test_search_keeps_same_site_results() {
        let gateway = MockGateway::new();
        let searcher = MockSearcher::new().with_results(
            "x faculty directory",
            &["https://www.x.edu/faculty", "https://rankings.org/x-faculty"],
        );
        let agent = agent(&gateway).with_searcher(Arc::new(searcher.clone()));
        let report = discover(&agent, DiscoveryMode::Search).await;

        assert_eq!(searcher.queries(), vec!["X faculty directory".to_string()]);
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].source_tier, SourceTier::SearchEngine);
        assert_eq!(report.candidates[0].score, 0.5);
        assert_eq!(report.confidence, DiscoveryConfidence::Low);
        assert_eq!(gateway.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_search_without_searcher_is_skipped() {
        let report = discover(&agent(&MockGateway::new()), DiscoveryMode::Search).await;
        assert!(report.candidates.is_empty());
        assert_eq!(report.confidence, DiscoveryConfidence::None);
        assert_eq!(report.skipped[0].tier, SourceTier::SearchEngine);
    }

    #[tokio::test]
    async fn test_search_failure_is_skipped_not_raised() {
        let agent = agent(&MockGateway::new()).with_searcher(Arc::new(MockSearcher::new().failing()));
        let report = discover(&agent, DiscoveryMode::Search).await;
        assert!(report.candidates.is_empty());
        assert!(report.skipped[0].reason.contains("503"));
    }

    #[tokio::test]
    async fn test_blocked_root_stops_discovery() {
        let gateway = MockGateway::new()
            .with_failure(
                "https://www.x.edu/robots.txt",
                MockFailure::Blocked("captcha".to_string()),
            )
            .with_html(ROOT, r#"<nav><a href="/faculty">Faculty</a></nav>"#);
        let report = discover(&agent(&gateway), DiscoveryMode::Auto).await;

        assert!(report.blocked);
        assert!(report.candidates.is_empty());
        assert!(report.failures.iter().any(|f| f.kind == FailureKind::Blocked));
        assert_eq!(gateway.fetch_count(ROOT), 0);
    }

    #[tokio::test]
    async fn test_vision_confirms_inconclusive_candidate() {
        let gateway = MockGateway::new()
            .with_text("https://www.x.edu/sitemap.xml", &urlset(&["https://www.x.edu/faculty/index.html"]))
            .with_html(ROOT, "<p>Welcome</p>")
            .with_rendered(
                FetchedPage::new("https://www.x.edu/faculty/index.html", "<p>rendered</p>")
                    .with_screenshot(b"directory-shot".to_vec()),
            );
        let classifier = MockClassifier::new().with_screenshot_label(b"directory-shot", PageType::Directory, 0.9);
        let agent = agent_with(&gateway, DiscoveryConfig::default().with_confidence_threshold(0.95))
            .with_classifier(Arc::new(classifier.clone()));
        let report = discover(&agent, DiscoveryMode::Auto).await;

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].source_tier, SourceTier::Vision);
        assert!((report.candidates[0].score - 0.9).abs() < 1e-6);
        assert_eq!(report.confidence, DiscoveryConfidence::High);
        assert_eq!(classifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_vision_disabled_leaves_low_confidence() {
        let gateway = MockGateway::new()
            .with_text("https://www.x.edu/sitemap.xml", &urlset(&["https://www.x.edu/faculty/jane-doe"]))
            .with_html(ROOT, "<p>Welcome</p>");
        let classifier = MockClassifier::new();
        let agent = agent_with(&gateway, DiscoveryConfig::default().with_vision_verification(false))
            .with_classifier(Arc::new(classifier.clone()));
        let report = discover(&agent, DiscoveryMode::Auto).await;

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.confidence, DiscoveryConfidence::Low);
        assert_eq!(classifier.call_count(), 0);
    }

    #[test]
    fn test_gateway_expansion_prefers_directory_links() {
        let agent = agent(&MockGateway::new());
        let root = Url::parse(ROOT).unwrap();
        let page = FetchedPage::new(
            "https://www.x.edu/academics",
            r#"<main>
                 <a href="/physics/people">Physics people</a>
                 <a href="/chemistry">Department of Chemistry</a>
               </main>"#,
        );
        let children = agent.expand_gateway(&root, &page, 10);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].url, "https://www.x.edu/physics/people");
        assert_eq!(children[0].discovered_from, "https://www.x.edu/academics");
    }

    #[test]
    fn test_gateway_expansion_falls_back_to_departments() {
        let agent = agent(&MockGateway::new());
        let root = Url::parse(ROOT).unwrap();
        let page = FetchedPage::new(
            "https://www.x.edu/academics",
            r#"<main>
                 <a href="/chemistry">Department of Chemistry</a>
                 <a href="/school-of-law">Law</a>
                 <a href="/visit">Visit campus</a>
                 <a href="https://other.edu/department-of-art">Department of Art</a>
               </main>"#,
        );
        let mut urls: Vec<String> = agent
            .expand_gateway(&root, &page, 10)
            .into_iter()
            .map(|c| c.url)
            .collect();
        urls.sort();
        assert_eq!(urls, vec!["https://www.x.edu/chemistry", "https://www.x.edu/school-of-law"]);
    }
}
