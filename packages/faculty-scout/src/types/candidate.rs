//! Candidate directory URLs produced by discovery.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::url_key::normalize_url;

/// Which discovery tier produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTier {
    Sitemap,
    KeywordCrawl,
    SearchEngine,
    Vision,
}

/// A URL that may lead to a faculty directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUrl {
    /// Absolute URL
    pub url: String,

    /// Tier that discovered it
    pub source_tier: SourceTier,

    /// Directory likelihood, always within `[0, 1]`
    pub score: f32,

    /// Page the link was found on (root for sitemap/search hits)
    pub discovered_from: String,
}

impl CandidateUrl {
    /// Create a candidate, clamping the score into `[0, 1]`.
    pub fn new(
        url: impl Into<String>,
        source_tier: SourceTier,
        score: f32,
        discovered_from: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            source_tier,
            score: clamp_score(score),
            discovered_from: discovered_from.into(),
        }
    }

    /// Canonical key used for dedup.
    pub fn key(&self) -> Option<String> {
        normalize_url(&self.url)
    }
}

pub(crate) fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Candidates deduplicated by normalized URL, in discovery order.
///
/// Re-inserting a known URL keeps its original position and raises the
/// stored score if the new sighting scored higher.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: IndexMap<String, CandidateUrl>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate. Returns `true` if its key was new.
    pub fn insert(&mut self, candidate: CandidateUrl) -> bool {
        let Some(key) = candidate.key() else {
            return false;
        };

        match self.entries.get_mut(&key) {
            Some(existing) => {
                if candidate.score > existing.score {
                    existing.score = candidate.score;
                    existing.source_tier = candidate.source_tier;
                }
                false
            }
            None => {
                self.entries.insert(key, candidate);
                true
            }
        }
    }

    pub fn extend(&mut self, candidates: impl IntoIterator<Item = CandidateUrl>) {
        for candidate in candidates {
            self.insert(candidate);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CandidateUrl> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest score in the set.
    pub fn top_score(&self) -> Option<f32> {
        self.entries.values().map(|c| c.score).reduce(f32::max)
    }

    /// Candidates sorted by score descending; ties keep discovery order.
    pub fn into_ranked(self) -> Vec<CandidateUrl> {
        let mut ranked: Vec<CandidateUrl> = self.entries.into_values().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Ranked view without consuming the set.
    pub fn ranked(&self) -> Vec<CandidateUrl> {
        self.clone().into_ranked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_clamped() {
        let c = CandidateUrl::new("https://x.edu/a", SourceTier::Sitemap, 1.7, "https://x.edu");
        assert_eq!(c.score, 1.0);
        let c = CandidateUrl::new("https://x.edu/a", SourceTier::Sitemap, -0.2, "https://x.edu");
        assert_eq!(c.score, 0.0);
        let c = CandidateUrl::new("https://x.edu/a", SourceTier::Sitemap, f32::NAN, "https://x.edu");
        assert_eq!(c.score, 0.0);
    }

    #[test]
    fn test_set_dedups_by_normalized_url() {
        let mut set = CandidateSet::new();
        assert!(set.insert(CandidateUrl::new(
            "https://x.edu/faculty/",
            SourceTier::Sitemap,
            0.4,
            "https://x.edu"
        )));
        assert!(!set.insert(CandidateUrl::new(
            "https://www.x.edu/faculty#list",
            SourceTier::KeywordCrawl,
            0.8,
            "https://x.edu/about"
        )));
        assert_eq!(set.len(), 1);

        let ranked = set.into_ranked();
        assert_eq!(ranked[0].url, "https://x.edu/faculty/");
        assert_eq!(ranked[0].score, 0.8);
        assert_eq!(ranked[0].source_tier, SourceTier::KeywordCrawl);
    }

    #[test]
    fn test_ranking_is_stable_for_ties() {
        let mut set = CandidateSet::new();
        for path in ["b", "a", "c"] {
            set.insert(CandidateUrl::new(
                format!("https://x.edu/{path}"),
                SourceTier::KeywordCrawl,
                0.5,
                "https://x.edu",
            ));
        }
        set.insert(CandidateUrl::new(
            "https://x.edu/top",
            SourceTier::KeywordCrawl,
            0.9,
            "https://x.edu",
        ));

        let urls: Vec<_> = set.into_ranked().into_iter().map(|c| c.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://x.edu/top",
                "https://x.edu/b",
                "https://x.edu/a",
                "https://x.edu/c"
            ]
        );
    }
}
