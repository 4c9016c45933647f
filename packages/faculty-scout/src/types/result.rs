//! Run results and the failure taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::FetchError;
use crate::types::candidate::CandidateUrl;
use crate::types::page::PageClassification;
use crate::types::profile::{ExtractionTier, ProfileCandidate};

/// Category of a scoped failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetch failed after retries
    TransientNetwork,
    /// Fetch failed for a reason retrying cannot fix (4xx, bad URL,
    /// unsupported operation)
    FetchFailed,
    /// Block condition; the domain was disabled
    Blocked,
    /// Page type could not be determined
    ClassificationUncertain,
    /// Every extraction tier failed
    ExtractionFailed { last_tier: ExtractionTier },
    /// Record dropped for violating the candidate invariants
    MalformedRecord,
    /// The profile sink rejected the batch
    Persistence,
    /// Work abandoned because of cancellation or the run deadline
    Cancelled,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::FetchFailed => "fetch_failed",
            Self::Blocked => "blocked",
            Self::ClassificationUncertain => "classification_uncertain",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::MalformedRecord => "malformed_record",
            Self::Persistence => "persistence",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A failure scoped to one URL, page or record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub url: String,
    #[serde(flatten)]
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(url: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Scope a fetch error to its URL.
    pub fn from_fetch(url: impl Into<String>, err: &FetchError) -> Self {
        let kind = match err {
            FetchError::Blocked { .. } | FetchError::DomainDisabled { .. } => FailureKind::Blocked,
            FetchError::Cancelled => FailureKind::Cancelled,
            FetchError::RetriesExhausted { .. } => FailureKind::TransientNetwork,
            e if e.is_transient() => FailureKind::TransientNetwork,
            _ => FailureKind::FetchFailed,
        };
        Self::new(url, kind, err.to_string())
    }
}

/// How much to trust the discovered candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryConfidence {
    /// Best candidate cleared the confidence threshold or was verified
    High,
    /// Candidates exist but none is convincing
    Low,
    /// Nothing found
    None,
}

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Records extracted with reasonable confidence
    Found,
    /// Records extracted but few, without contact details, or from a
    /// weakly-supported directory
    LowConfidence,
    /// No directory candidates or no records
    NoCandidates,
    /// The root domain blocked us before anything was extracted
    Blocked,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub root_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Finalized, deduplicated records
    pub candidates: Vec<ProfileCandidate>,

    /// Directory candidates that discovery returned
    pub directories: Vec<CandidateUrl>,

    /// One classification per processed page
    pub classifications: Vec<PageClassification>,

    pub pages_visited: usize,
    pub failures: Vec<Failure>,
    pub blocked_domains: Vec<String>,
    pub discovery_confidence: DiscoveryConfidence,
    pub outcome: RunOutcome,

    /// Records discarded by validation
    pub malformed_dropped: usize,

    /// Some work was abandoned (block, deadline, cancellation)
    pub partial: bool,
}

impl PipelineResult {
    /// Failure counts by kind label.
    pub fn failure_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn has_failure(&self, pred: impl Fn(&FailureKind) -> bool) -> bool {
        self.failures.iter().any(|f| pred(&f.kind))
    }

    /// Number of finalized records per extraction tier.
    pub fn tier_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for candidate in &self.candidates {
            *counts.entry(candidate.extraction_tier.rank()).or_insert(0) += 1;
        }
        counts
    }
}

/// Minimum record count for a `Found` verdict.
const MIN_CONFIDENT_RECORDS: usize = 3;

/// Judge the outcome of a run from its records and discovery confidence.
pub fn assess_outcome(
    candidates: &[ProfileCandidate],
    discovery_confidence: DiscoveryConfidence,
    root_blocked: bool,
) -> RunOutcome {
    if candidates.is_empty() {
        return if root_blocked {
            RunOutcome::Blocked
        } else {
            RunOutcome::NoCandidates
        };
    }

    let with_email = candidates.iter().filter(|c| c.email.is_some()).count();
    let with_link = candidates.iter().filter(|c| c.profile_url.is_some()).count();

    if candidates.len() < MIN_CONFIDENT_RECORDS
        || (with_email == 0 && with_link == 0)
        || discovery_confidence != DiscoveryConfidence::High
    {
        RunOutcome::LowConfidence
    } else {
        RunOutcome::Found
    }
}
