//! Extracted faculty profile records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::names::{is_non_person, is_valid_email, normalize_name};
use crate::types::url_key::{normalize_url, site_of_str};

/// Extraction tier that produced a record.
///
/// Lower rank means higher trust when merging conflicting fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionTier {
    Structural,
    TextualModel,
    VisualModel,
}

impl ExtractionTier {
    /// Tier number (1 = structural).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Structural => 1,
            Self::TextualModel => 2,
            Self::VisualModel => 3,
        }
    }
}

impl fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Structural => "structural",
            Self::TextualModel => "textual-model",
            Self::VisualModel => "visual-model",
        })
    }
}

/// A faculty record pulled from a directory page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCandidate {
    pub name: String,

    /// Job title; empty when the page shows none
    #[serde(default)]
    pub title: String,

    pub email: Option<String>,

    /// Absolute link to the person's own page
    pub profile_url: Option<String>,

    pub department_hint: Option<String>,

    /// Ordered, deduplicated research interests
    #[serde(default)]
    pub research_interests: Vec<String>,

    /// Text of the source container (truncated)
    #[serde(default)]
    pub raw_snippet: String,

    pub extraction_tier: ExtractionTier,

    /// Page the record was extracted from
    pub source_url: String,
}

/// Why a record failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    EmptyName,
    NonPersonName,
    InvalidEmail(String),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => f.write_str("empty name"),
            Self::NonPersonName => f.write_str("name matches non-person lexicon"),
            Self::InvalidEmail(e) => write!(f, "invalid email: {e}"),
        }
    }
}

/// Maximum stored length of `raw_snippet`.
const SNIPPET_LIMIT: usize = 500;

impl ProfileCandidate {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        extraction_tier: ExtractionTier,
    ) -> Self {
        Self {
            name: crate::names::clean_text(&name.into()),
            title: String::new(),
            email: None,
            profile_url: None,
            department_hint: None,
            research_interests: Vec::new(),
            raw_snippet: String::new(),
            extraction_tier,
            source_url: source_url.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = crate::names::clean_text(&title.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = Some(url.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department_hint = Some(department.into());
        self
    }

    pub fn with_interests(mut self, interests: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for interest in interests {
            push_unique(&mut self.research_interests, interest.into());
        }
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = crate::names::clean_text(&snippet.into());
        self.raw_snippet = truncate_chars(&snippet, SNIPPET_LIMIT);
        self
    }

    /// Check the record invariants: non-empty non-lexicon name and a
    /// well-formed email when one is present.
    pub fn validate(&self) -> Result<(), MalformedReason> {
        if self.name.trim().is_empty() {
            return Err(MalformedReason::EmptyName);
        }
        if is_non_person(&self.name) {
            return Err(MalformedReason::NonPersonName);
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(MalformedReason::InvalidEmail(email.clone()));
            }
        }
        Ok(())
    }

    /// Number of optional fields carrying data.
    pub fn populated_fields(&self) -> usize {
        [
            !self.title.is_empty(),
            self.email.is_some(),
            self.profile_url.is_some(),
            self.department_hint.is_some(),
            !self.research_interests.is_empty(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count()
    }

    /// Dedup key for this record.
    pub fn identity_key(&self) -> IdentityKey {
        if let Some(key) = self.profile_url.as_deref().and_then(normalize_url) {
            return IdentityKey::ProfileUrl(key);
        }
        IdentityKey::NameAtSite {
            name: normalize_name(&self.name),
            site: site_of_str(&self.source_url).unwrap_or_default(),
        }
    }
}

/// Key under which two records are considered the same person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    ProfileUrl(String),
    NameAtSite { name: String, site: String },
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProfileUrl(url) => write!(f, "url:{url}"),
            Self::NameAtSite { name, site } => write!(f, "name:{name}@{site}"),
        }
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, value: String) {
    let value = crate::names::clean_text(&value);
    if value.is_empty() {
        return;
    }
    let lower = value.to_lowercase();
    if !list.iter().any(|v| v.to_lowercase() == lower) {
        list.push(value);
    }
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let ok = ProfileCandidate::new("Jane Doe", "https://x.edu/people", ExtractionTier::Structural)
            .with_email("jdoe@x.edu");
        assert!(ok.validate().is_ok());

        let dept = ProfileCandidate::new(
            "Department of Physics",
            "https://x.edu/people",
            ExtractionTier::Structural,
        );
        assert_eq!(dept.validate(), Err(MalformedReason::NonPersonName));

        let bad_email = ProfileCandidate::new("Jane Doe", "https://x.edu", ExtractionTier::TextualModel)
            .with_email("jdoe-at-x");
        assert!(matches!(bad_email.validate(), Err(MalformedReason::InvalidEmail(_))));

        let empty = ProfileCandidate::new("   ", "https://x.edu", ExtractionTier::TextualModel);
        assert_eq!(empty.validate(), Err(MalformedReason::EmptyName));
    }

    #[test]
    fn test_identity_prefers_profile_url() {
        let a = ProfileCandidate::new("Jane Doe", "https://x.edu/people?page=1", ExtractionTier::Structural)
            .with_profile_url("https://x.edu/people/jdoe/");
        let b = ProfileCandidate::new("J. Doe", "https://x.edu/people?page=2", ExtractionTier::Structural)
            .with_profile_url("https://www.x.edu/people/jdoe");
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_identity_falls_back_to_name_and_site() {
        let a = ProfileCandidate::new("Dr. Jane Doe", "https://cs.x.edu/people", ExtractionTier::Structural);
        let b = ProfileCandidate::new("Jane Doe", "https://x.edu/faculty?page=2", ExtractionTier::TextualModel);
        assert_eq!(a.identity_key(), b.identity_key());

        let other_site = ProfileCandidate::new("Jane Doe", "https://y.edu/people", ExtractionTier::Structural);
        assert_ne!(a.identity_key(), other_site.identity_key());
    }

    #[test]
    fn test_interests_deduplicated_in_order() {
        let p = ProfileCandidate::new("Jane Doe", "https://x.edu", ExtractionTier::Structural)
            .with_interests(["Robotics", "robotics", " Machine  Learning "]);
        assert_eq!(p.research_interests, vec!["Robotics", "Machine Learning"]);
    }

    #[test]
    fn test_snippet_truncated() {
        let long = "a".repeat(SNIPPET_LIMIT + 50);
        let p = ProfileCandidate::new("Jane Doe", "https://x.edu", ExtractionTier::Structural)
            .with_snippet(long);
        assert_eq!(p.raw_snippet.chars().count(), SNIPPET_LIMIT);
    }
}
