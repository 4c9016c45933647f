//! OpenAI implementation of the content classifier.
//!
//! Every call is one chat completion with `response_format: json_object`.
//! Screenshots go out as base64 PNG data URLs, so the configured model must
//! accept image input.
//!
//! # Example
//!
//! ```rust,ignore
//! use faculty_scout::ai::OpenAiClassifier;
//!
//! let classifier = OpenAiClassifier::new("sk-...").with_model("gpt-4o-mini");
//! let pipeline = Pipeline::new(gateway, config).with_classifier(Arc::new(classifier));
//! ```

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::credentials::ApiKey;
use crate::error::{ClassifierError, ClassifierResult};
use crate::traits::classifier::{ClassifierInput, ContentClassifier, Label, RawRecord, RecordSchema};
use crate::traits::gateway::PageAction;
use crate::types::page::PageType;

const CLASSIFY_SYSTEM: &str = "You label pages of university websites. \
Return JSON: {\"label\": one of the allowed labels, \"confidence\": number between 0 and 1}.";

const SELECTOR_SYSTEM: &str = "You read screenshots of web pages and name CSS selectors. \
Return JSON: {\"selector\": a CSS selector matching every instance of the described element, or null if there is none}.";

const PAGINATION_SYSTEM: &str = "You read screenshots of directory listings. \
Find the control that shows the next page of results. Return JSON: \
{\"found\": boolean, \"description\": what to click, \"selector\": CSS selector or null, \"label\": visible text or null}.";

/// OpenAI-backed [`ContentClassifier`].
#[derive(Clone)]
pub struct OpenAiClassifier {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClassifier {
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Create from `OPENAI_API_KEY`, if set.
    pub fn from_env() -> Option<Self> {
        ApiKey::from_env("OPENAI_API_KEY").map(Self::new)
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (Azure, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_json<T: DeserializeOwned>(&self, system: &str, user: Value) -> ClassifierResult<T> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: Value::String(system.to_string()),
                },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
            response_format: json!({"type": "json_object"}),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", self.api_key.bearer())
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::Request(Box::new(e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Request(
                format!("OpenAI API error {status}: {error_text}").into(),
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Request(Box::new(e)))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ClassifierError::MalformedResponse("no choices in response".into()))?;

        debug!(model = %self.model, chars = content.len(), "OpenAI completion received");
        parse_json(&content)
    }
}

/// Parse a JSON reply, tolerating a markdown code fence around it.
fn parse_json<T: DeserializeOwned>(content: &str) -> ClassifierResult<T> {
    serde_json::from_str(content).or_else(|_| {
        let inner = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        serde_json::from_str(inner).map_err(ClassifierError::from)
    })
}

fn image_part(screenshot: &[u8]) -> Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(screenshot);
    json!({
        "type": "image_url",
        "image_url": {"url": format!("data:image/png;base64,{encoded}")}
    })
}

fn text_part(text: impl Into<String>) -> Value {
    json!({"type": "text", "text": text.into()})
}

fn taxonomy_prompt(taxonomy: &[PageType]) -> String {
    let labels: Vec<&str> = taxonomy.iter().map(|t| t.as_label()).collect();
    format!(
        "Allowed labels: {}. DIRECTORY lists many people; PAGINATED is a directory split over pages; \
GATEWAY links to department or unit directories; PROFILE is one person's page; \
BLOCKED is a CAPTCHA, login wall or access-denied page.",
        labels.join(", ")
    )
}

fn extraction_prompt(schema: &RecordSchema) -> String {
    let fields: Vec<String> = schema
        .fields
        .iter()
        .map(|(name, desc)| format!("- {name}: {desc}"))
        .collect();
    format!(
        "Extract every {} listed in the page below. Return JSON {{\"records\": [...]}} where each record has:\n{}\n\
Use null for missing values. Do not invent data. Skip navigation, departments and news items.",
        schema.entity,
        fields.join("\n")
    )
}

#[async_trait]
impl ContentClassifier for OpenAiClassifier {
    async fn classify_page(&self, input: ClassifierInput<'_>, taxonomy: &[PageType]) -> ClassifierResult<Label> {
        let prompt = taxonomy_prompt(taxonomy);
        let user = match input {
            ClassifierInput::Text(text) => Value::String(format!("{prompt}\n\nPage text:\n{text}")),
            ClassifierInput::Screenshot(bytes) => json!([text_part(prompt), image_part(bytes)]),
        };
        let reply: LabelReply = self.complete_json(CLASSIFY_SYSTEM, user).await?;
        Ok(Label::new(reply.label, reply.confidence.clamp(0.0, 1.0)))
    }

    async fn extract_records(&self, text: &str, schema: &RecordSchema) -> ClassifierResult<Vec<RawRecord>> {
        let user = Value::String(format!("{}\n\n---\n{text}", extraction_prompt(schema)));
        let reply: RecordsReply = self
            .complete_json("You extract structured records from web pages.", user)
            .await?;
        Ok(reply.records)
    }

    async fn locate_selector(&self, screenshot: &[u8], objective: &str) -> ClassifierResult<Option<String>> {
        let user = json!([text_part(format!("Element: {objective}")), image_part(screenshot)]);
        let reply: SelectorReply = self.complete_json(SELECTOR_SYSTEM, user).await?;
        Ok(reply.selector.filter(|s| !s.trim().is_empty()))
    }

    async fn locate_pagination_control(&self, screenshot: &[u8]) -> ClassifierResult<Option<PageAction>> {
        let user = json!([image_part(screenshot)]);
        let reply: PaginationReply = self.complete_json(PAGINATION_SYSTEM, user).await?;
        Ok(reply.into_action())
    }
}

// Request/Response types

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct LabelReply {
    label: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Deserialize)]
struct RecordsReply {
    #[serde(default)]
    records: Vec<RawRecord>,
}

#[derive(Deserialize)]
struct SelectorReply {
    selector: Option<String>,
}

#[derive(Deserialize)]
struct PaginationReply {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

impl PaginationReply {
    fn into_action(self) -> Option<PageAction> {
        if !self.found {
            return None;
        }
        let description = self
            .description
            .or_else(|| self.label.as_ref().map(|l| format!("click \"{l}\"")))?;
        let mut action = PageAction::new(description);
        if let Some(selector) = self.selector.filter(|s| !s.trim().is_empty()) {
            action = action.with_selector(selector);
        }
        if let Some(label) = self.label {
            action = action.with_label(label);
        }
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let classifier = OpenAiClassifier::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_base_url("https://custom.api.com");
        assert_eq!(classifier.model(), "gpt-4o-mini");
        assert_eq!(classifier.base_url, "https://custom.api.com");
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply: LabelReply = parse_json("```json\n{\"label\": \"DIRECTORY\", \"confidence\": 0.8}\n```").unwrap();
        assert_eq!(reply.label, "DIRECTORY");
        assert!(parse_json::<LabelReply>("not json").is_err());
    }

    #[test]
    fn test_records_reply_tolerates_nulls() {
        let reply: RecordsReply = parse_json(
            r#"{"records": [{"name": "Jane Doe", "title": null, "email": "jdoe@x.edu", "research_interests": []}]}"#,
        )
        .unwrap();
        assert_eq!(reply.records, vec![RawRecord::named("Jane Doe").with_email("jdoe@x.edu")]);
    }

    #[test]
    fn test_pagination_reply() {
        let reply: PaginationReply =
            parse_json(r#"{"found": true, "description": null, "selector": "", "label": "›"}"#).unwrap();
        let action = reply.into_action().unwrap();
        assert_eq!(action.description, "click \"›\"");
        assert_eq!(action.selector, None);
        assert_eq!(action.label.as_deref(), Some("›"));

        let none: PaginationReply = parse_json(r#"{"found": false}"#).unwrap();
        assert!(none.into_action().is_none());
    }

    #[test]
    fn test_image_part_is_data_url() {
        let part = image_part(b"png");
        assert_eq!(part["image_url"]["url"], "data:image/png;base64,cG5n");
    }
}
