//! Content classifier trait.
//!
//! Abstracts the remote semantic/visual model the pipeline falls back to:
//! - page-type labelling from text or a screenshot
//! - schema-constrained record extraction from page text
//! - reverse-engineering a listing selector from a screenshot
//! - locating a "next page" control from a screenshot
//!
//! Calls are request/response; the pipeline keeps no state between them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClassifierResult;
use crate::traits::gateway::PageAction;
use crate::types::page::PageType;

/// What the classifier is shown.
#[derive(Debug, Clone, Copy)]
pub enum ClassifierInput<'a> {
    /// Page text or markdown
    Text(&'a str),
    /// PNG screenshot
    Screenshot(&'a [u8]),
}

impl ClassifierInput<'_> {
    pub fn is_visual(&self) -> bool {
        matches!(self, Self::Screenshot(_))
    }
}

/// A label with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub label: String,
    pub confidence: f32,
}

impl Label {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    pub fn page_type(page_type: PageType, confidence: f32) -> Self {
        Self::new(page_type.as_label(), confidence)
    }
}

/// Output schema for record extraction.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSchema {
    /// Entity being extracted
    pub entity: String,

    /// Field names with one-line descriptions
    pub fields: Vec<(String, String)>,
}

impl RecordSchema {
    /// The faculty profile schema used by the textual tier.
    pub fn faculty_profile() -> Self {
        let fields = [
            ("name", "full name of the person, without honorifics"),
            ("title", "academic or job title"),
            ("email", "email address, if shown"),
            ("profile_url", "link to the person's own page, if shown"),
            ("department", "department or unit, if shown"),
            ("research_interests", "list of research areas, if shown"),
        ];
        Self {
            entity: "faculty member".to_string(),
            fields: fields
                .into_iter()
                .map(|(name, desc)| (name.to_string(), desc.to_string()))
                .collect(),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

/// One record as returned by the model, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
    pub department: Option<String>,
    pub research_interests: Vec<String>,
}

impl RawRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
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
}

/// Remote content-understanding capability.
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Label a page with one of `taxonomy`.
    async fn classify_page(
        &self,
        input: ClassifierInput<'_>,
        taxonomy: &[PageType],
    ) -> ClassifierResult<Label>;

    /// Extract records matching `schema` from page text.
    async fn extract_records(
        &self,
        text: &str,
        schema: &RecordSchema,
    ) -> ClassifierResult<Vec<RawRecord>>;

    /// Propose a CSS selector for the repeated element described by
    /// `objective`, or `None` when the screenshot shows no such pattern.
    async fn locate_selector(
        &self,
        screenshot: &[u8],
        objective: &str,
    ) -> ClassifierResult<Option<String>>;

    /// Describe the control that advances to the next page, if any.
    async fn locate_pagination_control(
        &self,
        screenshot: &[u8],
    ) -> ClassifierResult<Option<PageAction>>;
}
