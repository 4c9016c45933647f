//! Configuration types for discovery, classification, extraction and the
//! rate/retry governor.
//!
//! Every threshold is tunable. Defaults mirror what works on typical
//! university sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Discovery strategy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Sitemap, then deep crawl, then vision verification
    #[default]
    Auto,
    Sitemap,
    Deep,
    Search,
}

impl FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sitemap" => Ok(Self::Sitemap),
            "deep" => Ok(Self::Deep),
            "search" => Ok(Self::Search),
            other => Err(format!("unknown discovery mode: {other}")),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Sitemap => "sitemap",
            Self::Deep => "deep",
            Self::Search => "search",
        })
    }
}

/// Lexical weights for the URL scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Strong directory keywords.
    pub primary_keywords: Vec<String>,

    /// Weak directory keywords.
    pub secondary_keywords: Vec<String>,

    /// Keywords that subtract score.
    pub negative_keywords: Vec<String>,

    /// File extensions that always score 0.
    pub excluded_extensions: Vec<String>,

    /// Path fragments that always score 0 (login, calendars).
    pub excluded_path_markers: Vec<String>,

    pub primary_path_weight: f32,
    pub primary_segment_bonus: f32,
    pub anchor_weight: f32,
    pub secondary_weight: f32,
    pub negative_penalty: f32,
    pub navigation_bonus: f32,
    pub body_bonus: f32,
    pub footer_penalty: f32,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            primary_keywords: strings(&["faculty", "people", "directory", "staff", "profiles"]),
            secondary_keywords: strings(&[
                "professor",
                "professors",
                "team",
                "researchers",
                "academics",
                "members",
                "personnel",
                "experts",
            ]),
            negative_keywords: strings(&[
                "news",
                "events",
                "admissions",
                "admission",
                "calendar",
                "alumni",
                "apply",
                "giving",
                "donate",
                "blog",
                "press",
                "jobs",
                "careers",
                "courses",
            ]),
            excluded_extensions: strings(&[
                "pdf", "jpg", "jpeg", "png", "gif", "svg", "webp", "zip", "doc", "docx", "xls",
                "xlsx", "ppt", "pptx", "mp4", "mp3", "css", "js", "xml", "rss", "ics",
            ]),
            excluded_path_markers: strings(&[
                "/login",
                "/logout",
                "/signin",
                "/sso/",
                "/cas/",
                "/wp-admin",
                "/wp-login",
                "/feed",
                "/calendar/",
                "/tag/",
                "/search",
            ]),
            primary_path_weight: 0.4,
            primary_segment_bonus: 0.2,
            anchor_weight: 0.3,
            secondary_weight: 0.1,
            negative_penalty: 0.3,
            navigation_bonus: 0.1,
            body_bonus: 0.05,
            footer_penalty: 0.05,
        }
    }
}

/// Discovery tier thresholds and budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Minimum score for a sitemap entry to be returned.
    pub sitemap_threshold: f32,

    /// Maximum candidates returned by the sitemap tier.
    pub sitemap_top_n: usize,

    /// Maximum child sitemaps followed from a sitemap index.
    pub max_child_sitemaps: usize,

    /// Links scoring below this are never expanded by the deep crawl.
    pub deep_admission_threshold: f32,

    /// Minimum score for a deep-crawl page to be returned.
    pub deep_result_threshold: f32,

    /// `auto` falls through to the next tier when the best score is below this.
    pub confidence_threshold: f32,

    /// Score assigned to search-engine hits.
    pub search_prior_score: f32,

    /// Maximum search results requested.
    pub search_max_results: usize,

    /// Enable the vision verification tier in `auto` mode.
    pub vision_verification: bool,

    /// Candidates shown to the vision tier.
    pub vision_top_k: usize,

    /// Classifier confidence needed for the vision tier to confirm a directory.
    pub vision_min_confidence: f32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sitemap_threshold: 0.3,
            sitemap_top_n: 20,
            max_child_sitemaps: 10,
            deep_admission_threshold: 0.1,
            deep_result_threshold: 0.3,
            confidence_threshold: 0.6,
            search_prior_score: 0.5,
            search_max_results: 10,
            vision_verification: true,
            vision_top_k: 3,
            vision_min_confidence: 0.6,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_vision_verification(mut self, enabled: bool) -> Self {
        self.vision_verification = enabled;
        self
    }
}

/// Page type classifier thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Heuristic results at or above this confidence skip the model.
    pub heuristic_threshold: f32,

    /// Pages with less visible text than this are low-signal.
    pub min_text_length: usize,

    /// Person-shaped repeated blocks needed to call a page a directory.
    pub min_person_blocks: usize,

    /// A listing pattern counts toward person blocks only when at most this
    /// fraction of its names fail the person-name heuristic.
    pub max_non_person_ratio: f32,

    /// Department links needed to call a page a gateway.
    pub min_gateway_links: usize,

    /// Case-insensitive markers of an anti-automation page.
    pub block_markers: Vec<String>,

    /// Characters of page text sent to the model.
    pub model_text_limit: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            heuristic_threshold: 0.75,
            min_text_length: 200,
            min_person_blocks: 5,
            max_non_person_ratio: 0.5,
            min_gateway_links: 3,
            block_markers: strings(&[
                "access denied",
                "captcha",
                "cloudflare ray id",
                "403 forbidden",
                "incapsula",
                "human verification",
                "verify you are human",
                "please enable javascript",
                "checking your browser",
            ]),
            model_text_limit: 12_000,
        }
    }
}

impl ClassifierConfig {
    pub fn with_heuristic_threshold(mut self, threshold: f32) -> Self {
        self.heuristic_threshold = threshold;
        self
    }

    pub fn with_min_gateway_links(mut self, min: usize) -> Self {
        self.min_gateway_links = min;
        self
    }
}

/// Extraction tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Tier 1 succeeds only with at least this many well-formed records.
    pub min_candidates: usize,

    /// Tier 1 rejects a container when more than this fraction of names
    /// fail the person-name heuristic.
    pub max_non_person_ratio: f32,

    /// Characters of markdown sent to the textual tier.
    pub markdown_limit: usize,

    /// Run the visual tier (needs a screenshot-capable gateway).
    pub visual_tier: bool,

    /// Extract a single record from PROFILE pages.
    pub extract_profiles: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_candidates: 3,
            max_non_person_ratio: 0.5,
            markdown_limit: 30_000,
            visual_tier: true,
            extract_profiles: true,
        }
    }
}

impl ExtractionConfig {
    pub fn with_min_candidates(mut self, min: usize) -> Self {
        self.min_candidates = min;
        self
    }

    pub fn with_visual_tier(mut self, enabled: bool) -> Self {
        self.visual_tier = enabled;
        self
    }
}

/// Pagination behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Ask the classifier for a "next" control when no link is found.
    pub visual_fallback: bool,

    /// Allow the visual extraction tier on pages after the first.
    pub visual_tier_on_followups: bool,

    /// Treat a page whose text fingerprint was already seen as a cycle.
    pub content_fingerprint: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            visual_fallback: true,
            visual_tier_on_followups: false,
            content_fingerprint: true,
        }
    }
}

/// Politeness, retry and concurrency caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Sustained requests per second per domain.
    pub requests_per_second: u32,

    /// Simultaneous in-flight fetches per domain.
    pub max_concurrent_per_domain: usize,

    /// Simultaneous remote-model calls across the whole run.
    pub max_model_calls: usize,

    /// Fetch attempts before a URL is reported failed.
    pub max_attempts: u32,

    pub base_backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,

    /// Upper bound of random jitter added to every wait.
    pub jitter_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            max_concurrent_per_domain: 2,
            max_model_calls: 4,
            max_attempts: 3,
            base_backoff_ms: 2_000,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

impl GovernorConfig {
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff base and cap.
    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.base_backoff_ms = base_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn with_max_model_calls(mut self, max: usize) -> Self {
        self.max_model_calls = max;
        self
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let ms = (self.base_backoff_ms as f64 * exp).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Top-level configuration for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub scoring: ScoringConfig,
    pub discovery: DiscoveryConfig,
    pub classifier: ClassifierConfig,
    pub extraction: ExtractionConfig,
    pub pagination: PaginationConfig,
    pub governor: GovernorConfig,
}

impl ScoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_governor(mut self, governor: GovernorConfig) -> Self {
        self.governor = governor;
        self
    }
}

/// Per-run budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLimits {
    /// Candidate directory URLs processed after discovery.
    pub max_candidates: usize,

    /// Pages followed per paginated directory (including the first).
    pub max_pages_per_directory: usize,

    /// Page-fetch budget of the deep crawl.
    pub deep_max_pages: usize,

    /// Link depth of the deep crawl.
    pub deep_max_depth: usize,

    /// How many times gateway pages may recurse into their children.
    pub max_gateway_depth: usize,

    /// Wall-clock deadline for the whole run, in seconds.
    pub deadline_secs: Option<u64>,

    /// Institution name used for search queries instead of the derived one.
    pub institution_name: Option<String>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            max_pages_per_directory: 20,
            deep_max_pages: 30,
            deep_max_depth: 2,
            max_gateway_depth: 1,
            deadline_secs: None,
            institution_name: None,
        }
    }
}

impl RunLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_max_pages(mut self, max: usize) -> Self {
        self.max_pages_per_directory = max;
        self
    }

    /// Set deep crawl budget and depth.
    pub fn with_deep_crawl(mut self, max_pages: usize, max_depth: usize) -> Self {
        self.deep_max_pages = max_pages;
        self.deep_max_depth = max_depth;
        self
    }

    pub fn with_gateway_depth(mut self, depth: usize) -> Self {
        self.max_gateway_depth = depth;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_secs = Some(deadline.as_secs().max(1));
        self
    }

    pub fn with_institution_name(mut self, name: impl Into<String>) -> Self {
        self.institution_name = Some(name.into());
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = GovernorConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for(3), Duration::from_secs(8));
        assert_eq!(config.backoff_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Sitemap".parse::<DiscoveryMode>(), Ok(DiscoveryMode::Sitemap));
        assert_eq!("auto".parse::<DiscoveryMode>(), Ok(DiscoveryMode::Auto));
        assert!("crawl".parse::<DiscoveryMode>().is_err());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: ScoutConfig =
            serde_json::from_str(r#"{"classifier": {"heuristic_threshold": 0.9}}"#).unwrap();
        assert_eq!(config.classifier.heuristic_threshold, 0.9);
        assert_eq!(config.classifier.min_text_length, 200);
        assert_eq!(config.governor.max_attempts, 3);
    }
}
