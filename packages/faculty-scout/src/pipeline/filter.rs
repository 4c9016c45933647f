//! Garbage and duplicate removal for extracted profile records.

use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::names::normalize_name;
use crate::types::profile::{push_unique, IdentityKey, ProfileCandidate};
use crate::types::url_key::{normalize_url, site_of_str};

/// Path fragments of links that never lead to a person's page.
const NON_PROFILE_PATHS: &[&str] = &[
    "/news/",
    "/events/",
    "/event/",
    "/admin/",
    "/calendar/",
    "/admissions/",
    "/login/",
];

/// Whether a link points at a known non-profile section.
pub fn is_non_profile_link(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = format!("{}/", parsed.path().to_lowercase().trim_end_matches('/'));
    NON_PROFILE_PATHS.iter().any(|p| path.contains(p))
}

/// Drops non-person entries and merges records by identity.
///
/// Output order is the order in which each identity was first seen.
#[derive(Debug, Default)]
pub struct ProfileFilter {
    entries: Vec<ProfileCandidate>,
    index: HashMap<IdentityKey, usize>,
    dropped: usize,
}

impl ProfileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot filter over a batch.
    pub fn filter(candidates: impl IntoIterator<Item = ProfileCandidate>) -> Vec<ProfileCandidate> {
        let mut filter = Self::new();
        filter.extend(candidates);
        filter.finish()
    }

    pub fn extend(&mut self, candidates: impl IntoIterator<Item = ProfileCandidate>) {
        for candidate in candidates {
            self.push(candidate);
        }
    }

    /// Add one record, dropping or merging it as needed. Returns whether it
    /// created a new entry.
    pub fn push(&mut self, candidate: ProfileCandidate) -> bool {
        if let Err(reason) = candidate.validate() {
            debug!(name = %candidate.name, %reason, "Dropping non-person record");
            self.dropped += 1;
            return false;
        }
        if candidate.profile_url.as_deref().is_some_and(is_non_profile_link) {
            debug!(name = %candidate.name, "Dropping record linked to a non-profile page");
            self.dropped += 1;
            return false;
        }

        let primary = candidate.identity_key();
        let alias = name_key(&candidate);

        let existing = self.index.get(&primary).copied().or_else(|| {
            self.index.get(&alias).copied().filter(|&idx| {
                // Namesakes with distinct profile pages are different people.
                match (&self.entries[idx].profile_url, &candidate.profile_url) {
                    (Some(a), Some(b)) => normalize_url(a) == normalize_url(b),
                    _ => true,
                }
            })
        });

        let (idx, created) = match existing {
            Some(idx) => {
                let merged = merge(self.entries[idx].clone(), candidate);
                self.entries[idx] = merged;
                (idx, false)
            }
            None => {
                self.entries.push(candidate);
                (self.entries.len() - 1, true)
            }
        };

        let entry = &self.entries[idx];
        let keys = [entry.identity_key(), name_key(entry), primary, alias];
        for key in keys {
            self.index.entry(key).or_insert(idx);
        }
        created
    }

    /// Records dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Vec<ProfileCandidate> {
        self.entries
    }
}

fn name_key(candidate: &ProfileCandidate) -> IdentityKey {
    IdentityKey::NameAtSite {
        name: normalize_name(&candidate.name),
        site: site_of_str(&candidate.source_url).unwrap_or_default(),
    }
}

/// Merge two records for the same person.
///
/// The record from the more reliable tier (or, on a tie, the one with more
/// populated fields) wins conflicts; the other fills blanks. Research
/// interests are unioned.
pub fn merge(existing: ProfileCandidate, incoming: ProfileCandidate) -> ProfileCandidate {
    let incoming_wins = match incoming.extraction_tier.rank().cmp(&existing.extraction_tier.rank()) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Equal => incoming.populated_fields() > existing.populated_fields(),
        std::cmp::Ordering::Greater => false,
    };
    let (mut primary, secondary) = if incoming_wins {
        (incoming, existing)
    } else {
        (existing, incoming)
    };

    if primary.title.is_empty() {
        primary.title = secondary.title;
    }
    if primary.email.is_none() {
        primary.email = secondary.email;
    }
    if primary.profile_url.is_none() {
        primary.profile_url = secondary.profile_url;
    }
    if primary.department_hint.is_none() {
        primary.department_hint = secondary.department_hint;
    }
    if primary.raw_snippet.is_empty() {
        primary.raw_snippet = secondary.raw_snippet;
    }
    for interest in secondary.research_interests {
        push_unique(&mut primary.research_interests, interest);
    }
    primary
}
