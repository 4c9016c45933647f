//! HTML helpers shared by the gateway, classifier, extraction and
//! pagination stages.
//!
//! `scraper::Html` is not `Send`, so every function here parses, inspects
//! and drops the document synchronously; callers never hold one across an
//! await point.

use scraper::{ElementRef, Html, Node, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::names::clean_text;
use crate::types::page::{LinkPosition, PageLink};

const SKIPPED_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Parse a CSS selector that is known to be valid.
pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Whitespace-collapsed text of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Visible body text, with script/style content removed.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document_text(&document)
}

pub(crate) fn document_text(document: &Html) -> String {
    let mut parts = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_TEXT_PARENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    clean_text(&parts.join(" "))
}

/// `<title>` of a document.
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = selector("title")?;
    document
        .select(&title)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Containers that usually hold the main content, in preference order.
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "[role='main']",
    "article",
    "#content",
    "#main",
    ".content",
    ".main",
];

/// HTML of the main content area, or the whole body.
pub fn main_content_html(html: &str) -> String {
    let document = Html::parse_document(html);
    for css in MAIN_SELECTORS {
        if let Some(main) = selector(css).and_then(|s| document.select(&s).next()) {
            return main.html();
        }
    }
    selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|body| body.html())
        .unwrap_or_else(|| document.html())
}

/// Convert HTML to Markdown, falling back to plain text.
pub fn to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| visible_text(html))
}

/// SHA-256 of the visible text, hex-encoded.
pub fn content_fingerprint(html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(visible_text(html).as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolve an href against a base, keeping only http(s) targets.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
    {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// All outgoing links with anchor text and layout position.
pub fn extract_links(html: &str, base: &Url) -> Vec<PageLink> {
    let document = Html::parse_document(html);
    links_of(&document, base)
}

pub(crate) fn links_of(document: &Html, base: &Url) -> Vec<PageLink> {
    let Some(anchor) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&anchor)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let url = resolve_href(base, href)?;
            let mut text = element_text(el);
            if text.is_empty() {
                text = el
                    .value()
                    .attr("aria-label")
                    .or_else(|| el.value().attr("title"))
                    .map(clean_text)
                    .unwrap_or_default();
            }
            Some(
                PageLink::new(url.to_string())
                    .with_text(text)
                    .with_position(link_position(el)),
            )
        })
        .collect()
}

/// Classify where an element sits by walking its ancestors.
pub fn link_position(el: ElementRef<'_>) -> LinkPosition {
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        let element = ancestor.value();
        match element.name() {
            "footer" => return LinkPosition::Footer,
            "nav" | "header" => return LinkPosition::Navigation,
            _ => {}
        }
        if element.attr("role") == Some("navigation") {
            return LinkPosition::Navigation;
        }
        let marker = format!(
            "{} {}",
            element.attr("class").unwrap_or_default(),
            element.attr("id").unwrap_or_default()
        )
        .to_lowercase();
        if marker.contains("footer") {
            return LinkPosition::Footer;
        }
        if marker.contains("navbar") || marker.contains("menu") || marker.contains("main-nav") {
            return LinkPosition::Navigation;
        }
    }
    LinkPosition::Body
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title> Faculty | Physics </title><style>.x{}</style></head>
        <body>
          <nav><a href="/people">People</a></nav>
          <main>
            <a href="profiles/jdoe#bio">Jane Doe</a>
            <a href="mailto:jdoe@x.edu">email</a>
            <a href="javascript:void(0)">noop</a>
            <a href="https://other.org/x" aria-label="Partner"></a>
          </main>
          <div class="site-footer"><a href="/news/">News</a></div>
          <script>var hidden = "secret";</script>
        </body></html>
    "#;

    #[test]
    fn test_links_with_positions() {
        let base = Url::parse("https://x.edu/dept/").unwrap();
        let links = extract_links(PAGE, &base);
        let summary: Vec<_> = links
            .iter()
            .map(|l| (l.url.as_str(), l.text.as_str(), l.position))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("https://x.edu/people", "People", LinkPosition::Navigation),
                ("https://x.edu/dept/profiles/jdoe", "Jane Doe", LinkPosition::Body),
                ("https://other.org/x", "Partner", LinkPosition::Body),
                ("https://x.edu/news/", "News", LinkPosition::Footer),
            ]
        );
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let text = visible_text(PAGE);
        assert!(text.contains("Jane Doe"));
        assert!(!text.contains("secret"));
        assert!(!text.contains(".x{}"));
    }

    #[test]
    fn test_main_content() {
        let main = main_content_html(PAGE);
        assert!(main.starts_with("<main>"));
        assert!(!main.contains("site-footer"));
    }

    #[test]
    fn test_title() {
        assert_eq!(page_title(PAGE).as_deref(), Some("Faculty | Physics"));
    }

    #[test]
    fn test_fingerprint_ignores_markup_changes() {
        let a = content_fingerprint("<p>Jane Doe</p>");
        let b = content_fingerprint("<div><span>Jane</span>   Doe</div>");
        assert_eq!(a, b);
        assert_ne!(a, content_fingerprint("<p>John Roe</p>"));
    }
}
