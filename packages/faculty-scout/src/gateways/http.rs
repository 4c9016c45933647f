//! Plain HTTP fetch gateway.
//!
//! Fetches without executing scripts, extracts links with anchor text and
//! layout position, and reports anti-automation responses as blocked pages.
//! It cannot take screenshots or perform interactions; rendered fetches
//! return the static page.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{FetchError, FetchResult};
use crate::html::extract_links;
use crate::traits::gateway::FetchGateway;
use crate::types::page::FetchedPage;

/// Statuses that mean "blocked" when the body carries a challenge.
const CHALLENGE_STATUSES: &[u16] = &[401, 403, 429, 503];

/// Body markers of bot challenges and login walls.
const CHALLENGE_MARKERS: &[&str] = &[
    "g-recaptcha",
    "h-captcha",
    "cf-challenge",
    "cf_chl_",
    "challenge-platform",
    "_incapsula_resource",
    "px-captcha",
    "captcha",
    "verify you are human",
    "checking your browser",
    "access denied",
];

/// Markers that block even a 200 response.
const HARD_MARKERS: &[&str] = &[
    "g-recaptcha",
    "h-captcha",
    "cf-challenge",
    "cf_chl_",
    "_incapsula_resource",
    "px-captcha",
];

/// Login-wall markers on pages reached by redirect.
const LOGIN_MARKERS: &[&str] = &["type=\"password\"", "type='password'", "single sign-on", "sign in to continue"];

/// HTTP gateway built on `reqwest`.
///
/// # Example
///
/// ```rust,ignore
/// use faculty_scout::gateways::HttpGateway;
///
/// let gateway = HttpGateway::new().with_timeout(Duration::from_secs(20));
/// let page = gateway.fetch("https://www.example.edu/faculty", false).await?;
/// ```
pub struct HttpGateway {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpGateway {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            user_agent: format!("faculty-scout/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured client (proxies, TLS settings).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

/// Decide whether a response is an anti-automation page.
fn detect_block(status: u16, body: &str, redirected: bool) -> Option<String> {
    let lower = body.to_lowercase();

    if CHALLENGE_STATUSES.contains(&status) {
        if let Some(marker) = CHALLENGE_MARKERS.iter().find(|m| lower.contains(*m)) {
            return Some(format!("HTTP {status} with challenge marker `{marker}`"));
        }
        if status == 401 || status == 403 {
            return Some(format!("HTTP {status}"));
        }
        return None;
    }

    if let Some(marker) = HARD_MARKERS.iter().find(|m| lower.contains(*m)) {
        return Some(format!("challenge marker `{marker}`"));
    }
    if redirected {
        if let Some(marker) = LOGIN_MARKERS.iter().find(|m| lower.contains(*m)) {
            return Some(format!("login wall `{marker}`"));
        }
    }
    None
}

#[async_trait]
impl FetchGateway for HttpGateway {
    async fn fetch(&self, url: &str, render: bool) -> FetchResult<FetchedPage> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl { url: url.to_string() })?;
        if render {
            debug!(url, "Rendering not supported, fetching static HTML");
        }

        let response = self
            .client
            .get(parsed.clone())
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| request_error(url, e))?;

        let redirected = final_url.path() != parsed.path() || final_url.host_str() != parsed.host_str();
        if let Some(reason) = detect_block(status, &body, redirected) {
            warn!(url, status, reason = %reason, "Block condition detected");
            return Ok(FetchedPage::new(url, body)
                .with_final_url(final_url.to_string())
                .with_status(status)
                .blocked(reason));
        }

        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let links = extract_links(&body, &final_url);
        debug!(url, status, links = links.len(), bytes = body.len(), "Fetched page");
        Ok(FetchedPage::new(url, body)
            .with_final_url(final_url.to_string())
            .with_status(status)
            .with_links(links))
    }
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Connection {
            url: url.to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_is_blocked() {
        assert_eq!(detect_block(403, "<h1>Forbidden</h1>", false).as_deref(), Some("HTTP 403"));
    }

    #[test]
    fn test_overload_without_challenge_is_not_blocked() {
        assert!(detect_block(503, "<p>Service temporarily unavailable</p>", false).is_none());
        assert!(detect_block(429, "<p>slow down</p>", false).is_none());
    }

    #[test]
    fn test_challenge_status_with_marker() {
        let body = r#"<div class="cf-challenge">Checking your browser</div>"#;
        assert!(detect_block(503, body, false).unwrap().contains("cf-challenge"));
    }

    #[test]
    fn test_ok_page_with_recaptcha_widget() {
        let body = r#"<form><div class="g-recaptcha" data-sitekey="x"></div></form>"#;
        assert!(detect_block(200, body, false).is_some());
    }

    #[test]
    fn test_login_wall_only_after_redirect() {
        let body = r#"<form><input type="password" name="pw"></form>"#;
        assert!(detect_block(200, body, true).is_some());
        assert!(detect_block(200, body, false).is_none());
    }

    #[test]
    fn test_directory_page_passes() {
        let body = "<main><h3>Jane Doe</h3><p>Professor</p></main>";
        assert!(detect_block(200, body, false).is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let gateway = HttpGateway::new();
        let err = gateway.fetch("not a url", false).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
