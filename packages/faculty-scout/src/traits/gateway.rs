//! Fetch gateway trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, FetchResult};
use crate::types::page::FetchedPage;

/// A simulated user interaction, as proposed by the content classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAction {
    /// Natural-language description ("click the › arrow below the list")
    pub description: String,

    /// CSS selector of the control, when the classifier could name one
    #[serde(default)]
    pub selector: Option<String>,

    /// Visible label of the control
    #[serde(default)]
    pub label: Option<String>,
}

impl PageAction {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            selector: None,
            label: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Retrieves pages for the pipeline.
///
/// Implementations report transport failures as errors and anti-automation
/// responses through [`FetchedPage::blocked`]; they never return a silent
/// empty page.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    /// Fetch a URL. With `render` set, the gateway should execute scripts
    /// and attach a screenshot when it can.
    async fn fetch(&self, url: &str, render: bool) -> FetchResult<FetchedPage>;

    /// Perform an interaction on a page and return the page it leads to.
    async fn perform_action(&self, page_url: &str, action: &PageAction) -> FetchResult<FetchedPage> {
        let _ = (page_url, action);
        Err(FetchError::Unsupported("page interaction"))
    }
}
