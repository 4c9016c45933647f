//! URL scorer: lexical directory-likelihood of a link.
//!
//! Pure and deterministic. The same `(url, anchor, position)` always yields
//! the same score, and nothing here touches the network.

use std::cmp::Ordering;
use url::Url;

use crate::types::config::ScoringConfig;
use crate::types::page::LinkPosition;
use crate::types::url_key::path_depth;

/// Trailing path segments that still denote the listing itself.
const INDEX_SEGMENTS: &[&str] = &["index", "default", "home", "list", "all"];

/// A URL with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredUrl {
    pub url: String,
    pub score: f32,
}

/// Scores links by how likely they lead to a faculty directory.
#[derive(Debug, Clone, Default)]
pub struct UrlScorer {
    config: ScoringConfig,
}

impl UrlScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score a link in `[0, 1]`.
    pub fn score(&self, url: &str, anchor_text: &str, position: LinkPosition) -> f32 {
        let Ok(parsed) = Url::parse(url) else {
            return 0.0;
        };
        let path = parsed.path().to_lowercase();
        if self.is_excluded(&path) {
            return 0.0;
        }

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let path_tokens = tokens(&path);
        let anchor = anchor_text.to_lowercase();
        let anchor_tokens = tokens(&anchor);
        let cfg = &self.config;

        let mut score = 0.0f32;

        if cfg.primary_keywords.iter().any(|kw| path.contains(kw.as_str())) {
            score += cfg.primary_path_weight;
            if self.keyword_is_leaf(&segments) {
                score += cfg.primary_segment_bonus;
            }
        }

        if cfg
            .primary_keywords
            .iter()
            .any(|kw| anchor_tokens.iter().any(|t| t.starts_with(kw.as_str())))
        {
            score += cfg.anchor_weight;
        }

        if cfg.secondary_keywords.iter().any(|kw| {
            path_tokens.contains(&kw.as_str()) || anchor_tokens.contains(&kw.as_str())
        }) {
            score += cfg.secondary_weight;
        }

        let negatives = cfg
            .negative_keywords
            .iter()
            .filter(|kw| path_tokens.contains(&kw.as_str()) || anchor_tokens.contains(&kw.as_str()))
            .count();
        score -= cfg.negative_penalty * negatives as f32;

        score += match position {
            LinkPosition::Navigation => cfg.navigation_bonus,
            LinkPosition::Body => cfg.body_bonus,
            LinkPosition::Footer => -cfg.footer_penalty,
            LinkPosition::Unknown => 0.0,
        };

        score.clamp(0.0, 1.0)
    }

    /// Excluded extensions and endpoints always score 0.
    pub fn is_excluded(&self, path: &str) -> bool {
        let last = path.rsplit('/').next().unwrap_or_default();
        if let Some((_, ext)) = last.rsplit_once('.') {
            if self.config.excluded_extensions.iter().any(|e| e == ext) {
                return true;
            }
        }
        self.config
            .excluded_path_markers
            .iter()
            .any(|marker| path.contains(marker.as_str()))
    }

    /// A primary keyword names the last meaningful segment, so the URL is
    /// the listing itself rather than something beneath it.
    fn keyword_is_leaf(&self, segments: &[&str]) -> bool {
        let mut meaningful: Vec<&str> = segments
            .iter()
            .map(|s| s.split('.').next().unwrap_or_default())
            .collect();
        while meaningful
            .last()
            .is_some_and(|s| INDEX_SEGMENTS.contains(s))
        {
            meaningful.pop();
        }
        let Some(leaf) = meaningful.last() else {
            return false;
        };
        let leaf_tokens = tokens(leaf);
        self.config
            .primary_keywords
            .iter()
            .any(|kw| leaf_tokens.contains(&kw.as_str()))
    }

    /// Order by score descending, then shallower path, then URL.
    pub fn rank(&self, mut scored: Vec<ScoredUrl>) -> Vec<ScoredUrl> {
        scored.sort_by(compare_ranked);
        scored
    }
}

fn compare_ranked(a: &ScoredUrl, b: &ScoredUrl) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| depth_of(&a.url).cmp(&depth_of(&b.url)))
        .then_with(|| a.url.cmp(&b.url))
}

fn depth_of(url: &str) -> usize {
    Url::parse(url).map(|u| path_depth(&u)).unwrap_or(usize::MAX)
}

fn tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}
