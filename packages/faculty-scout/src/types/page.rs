//! Fetched pages and their classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a link sits in the page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPosition {
    /// Inside `<nav>`, `<header>` or a menu container
    Navigation,
    /// Main content
    Body,
    /// Inside `<footer>`
    Footer,
    /// Position not known (sitemap entries, search results)
    #[default]
    Unknown,
}

/// An outgoing link discovered on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    /// Absolute URL
    pub url: String,

    /// Visible anchor text (whitespace-collapsed)
    #[serde(default)]
    pub text: String,

    /// Layout position
    #[serde(default)]
    pub position: LinkPosition,
}

impl PageLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: String::new(),
            position: LinkPosition::Unknown,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_position(mut self, position: LinkPosition) -> Self {
        self.position = position;
        self
    }
}

/// A page as returned by the fetch gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// URL after redirects (or after a simulated interaction)
    pub final_url: String,

    /// HTTP status
    pub status: u16,

    /// Rendered HTML
    pub html: String,

    /// Links extracted by the gateway
    #[serde(default)]
    pub links: Vec<PageLink>,

    /// PNG screenshot, when rendering was requested and supported
    #[serde(default, skip_serializing)]
    pub screenshot: Option<Vec<u8>>,

    /// Gateway detected a block condition
    #[serde(default)]
    pub blocked: bool,

    /// Why the page is considered blocked
    pub block_reason: Option<String>,
}

impl FetchedPage {
    /// Create a successful page with no links.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            html: html.into(),
            links: Vec::new(),
            screenshot: None,
            blocked: false,
            block_reason: None,
        }
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_links(mut self, links: Vec<PageLink>) -> Self {
        self.links = links;
        self
    }

    pub fn with_screenshot(mut self, screenshot: Vec<u8>) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    /// Mark the page as blocked.
    pub fn blocked(mut self, reason: impl Into<String>) -> Self {
        self.blocked = true;
        self.block_reason = Some(reason.into());
        self
    }

    pub fn has_screenshot(&self) -> bool {
        self.screenshot.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Page-type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageType {
    Directory,
    Gateway,
    Paginated,
    Profile,
    Blocked,
    Unknown,
}

impl PageType {
    /// Labels offered to the content classifier.
    pub const TAXONOMY: [PageType; 5] = [
        PageType::Directory,
        PageType::Gateway,
        PageType::Paginated,
        PageType::Profile,
        PageType::Blocked,
    ];

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Directory => "DIRECTORY",
            Self::Gateway => "GATEWAY",
            Self::Paginated => "PAGINATED",
            Self::Profile => "PROFILE",
            Self::Blocked => "BLOCKED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a model-provided label, tolerating case, punctuation and
    /// surrounding prose.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned: String = label
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
            .collect();

        cleaned.split_whitespace().find_map(|token| match token {
            "DIRECTORY" => Some(Self::Directory),
            "GATEWAY" => Some(Self::Gateway),
            "PAGINATED" => Some(Self::Paginated),
            "PROFILE" => Some(Self::Profile),
            "BLOCKED" => Some(Self::Blocked),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        })
    }

    /// Pages whose records go through the extraction engine.
    pub fn is_listing(&self) -> bool {
        matches!(self, Self::Directory | Self::Paginated)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// How a classification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Heuristic,
    Model,
}

/// Result of classifying one fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageClassification {
    pub url: String,
    pub page_type: PageType,
    pub confidence: f32,
    pub method: ClassificationMethod,

    /// Human-readable reason (rule fired, model label, degradation cause)
    #[serde(default)]
    pub reason: String,
}

impl PageClassification {
    pub fn heuristic(url: impl Into<String>, page_type: PageType, confidence: f32) -> Self {
        Self {
            url: url.into(),
            page_type,
            confidence,
            method: ClassificationMethod::Heuristic,
            reason: String::new(),
        }
    }

    pub fn model(url: impl Into<String>, page_type: PageType, confidence: f32) -> Self {
        Self {
            url: url.into(),
            page_type,
            confidence,
            method: ClassificationMethod::Model,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}
