//! Tier 1: structural extraction with generic listing patterns.
//!
//! Patterns are tried in priority order; each yields a set of item
//! containers that share one container-to-fields routine. When no pattern
//! is accepted, a generic detector looks for sibling elements with the
//! same tag and class signature.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::html::{element_text, resolve_href, selector};
use crate::names::{clean_email, find_email, looks_like_person_name};
use crate::pipeline::extract::{Attempt, ExtractionContext, ExtractionStrategy};
use crate::types::config::ExtractionConfig;
use crate::types::page::FetchedPage;
use crate::types::profile::{ExtractionTier, ProfileCandidate};
use crate::types::url_key::normalize_url;

/// A named group of item selectors.
struct ListingPattern {
    name: &'static str,
    items: &'static str,
}

/// Listing patterns, most specific first.
const LISTING_PATTERNS: &[ListingPattern] = &[
    ListingPattern {
        name: "microdata",
        items: r#"[itemtype*="schema.org/Person"]"#,
    },
    ListingPattern {
        name: "datatable",
        items: "table.dataTable tbody tr, table[id*='DataTable'] tbody tr",
    },
    ListingPattern {
        name: "cards",
        items: "[class*='card'], [class*='profile'], [class*='person'], [class*='faculty-member'], [class*='people-item'], [class*='directory-item']",
    },
    ListingPattern {
        name: "table",
        items: "table tr",
    },
    ListingPattern {
        name: "grid",
        items: "[class*='grid'] > div, [class*='row'] > [class*='col']",
    },
    ListingPattern {
        name: "list",
        items: "ul[class*='faculty'] > li, ul[class*='people'] > li, ul[class*='staff'] > li, ul[class*='directory'] > li, ol > li, ul > li",
    },
    ListingPattern {
        name: "definition_list",
        items: "dl > dt",
    },
    ListingPattern {
        name: "generic_div",
        items: "div[class*='member'], div[class*='staff'], div[class*='faculty'], article",
    },
];

const NAME_SELECTORS: &str = "[itemprop='name'], [class*='name']";
const NAME_FALLBACK_SELECTORS: &str = "h1, h2, h3, h4, h5, h6, strong, b, a";
const TITLE_SELECTORS: &str = "[itemprop='jobTitle'], [class*='title'], [class*='position'], [class*='role'], [class*='designation']";
const DEPARTMENT_SELECTORS: &str = "[itemprop='affiliation'], [itemprop='department'], [class*='department'], [class*='dept']";
const INTEREST_SELECTORS: &str = "[class*='research'], [class*='interest'], [class*='expertise']";

const TITLE_WORDS: &[&str] = &[
    "professor",
    "lecturer",
    "director",
    "chair",
    "dean",
    "fellow",
    "scientist",
    "researcher",
    "instructor",
    "emeritus",
    "postdoc",
    "reader",
    "faculty",
    "head of",
];

const PROFILE_LINK_TEXT: &[&str] = &[
    "profile",
    "view profile",
    "more",
    "read more",
    "bio",
    "biography",
    "homepage",
    "website",
];

/// One item container after field extraction.
struct Item {
    /// Text in the name position, person-shaped or not
    name_guess: Option<String>,
    record: Option<ProfileCandidate>,
}

/// Records pulled from one listing, before acceptance checks.
#[derive(Debug, Default)]
pub struct Listing {
    pub pattern: &'static str,
    pub records: Vec<ProfileCandidate>,
    pub items: usize,
    pub non_person_ratio: f32,
}

impl Listing {
    fn with_contact(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.email.is_some() || r.profile_url.is_some())
            .count()
    }
}

/// Tier 1 strategy.
pub struct StructuralStrategy {
    config: ExtractionConfig,
}

impl StructuralStrategy {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract from a page with the prioritised patterns, then the generic
    /// detector. Returns the first accepted listing.
    pub fn extract_listing(&self, html: &str, source_url: &str) -> Option<Listing> {
        let document = Html::parse_document(html);
        let base = Url::parse(source_url).ok()?;

        for pattern in LISTING_PATTERNS {
            let Some(items) = selector(pattern.items) else {
                continue;
            };
            let containers = outermost(document.select(&items).collect());
            let listing = build_listing(pattern.name, &containers, &base, source_url);
            if self.accepts(&listing) {
                return Some(listing);
            }
        }

        repeated_groups(&document, self.config.min_candidates.max(2))
            .into_iter()
            .map(|group| build_listing("repeated_blocks", &group, &base, source_url))
            .filter(|listing| self.accepts(listing))
            .max_by_key(|listing| listing.records.len())
    }

    /// Extract using a selector proposed for this page (visual tier).
    pub fn extract_with_selector(&self, html: &str, source_url: &str, css: &str) -> Option<Listing> {
        let document = Html::parse_document(html);
        let base = Url::parse(source_url).ok()?;
        let items = selector(css)?;
        let containers = outermost(document.select(&items).collect());
        let listing = build_listing("proposed_selector", &containers, &base, source_url);
        (!listing.records.is_empty()
            && listing.non_person_ratio <= self.config.max_non_person_ratio)
            .then_some(listing)
    }

    fn accepts(&self, listing: &Listing) -> bool {
        listing.records.len() >= self.config.min_candidates
            && listing.non_person_ratio <= self.config.max_non_person_ratio
    }

    /// A single person's record from a profile page.
    pub fn extract_single(&self, html: &str, source_url: &str) -> Option<ProfileCandidate> {
        let document = Html::parse_document(html);
        let base = Url::parse(source_url).ok()?;

        let scope = selector(r#"[itemtype*="schema.org/Person"]"#)
            .and_then(|s| document.select(&s).next())
            .or_else(|| selector("main").and_then(|s| document.select(&s).next()))
            .unwrap_or_else(|| document.root_element());

        let name = first_person_text(scope, "[itemprop='name'], h1, h2")?;
        let mut record = fields_from(scope, name, &base, source_url);
        // The page itself is the profile.
        record.profile_url = Some(source_url.to_string());
        record.validate().ok()?;
        Some(record)
    }
}

/// Number of person-shaped containers with contact details in the best
/// listing pattern of a document. Patterns whose non-person share exceeds
/// `max_non_person_ratio` are ignored.
pub fn count_person_blocks(document: &Html, source_url: &str, max_non_person_ratio: f32) -> usize {
    let Ok(base) = Url::parse(source_url) else {
        return 0;
    };
    LISTING_PATTERNS
        .iter()
        .filter_map(|pattern| {
            let items = selector(pattern.items)?;
            let containers = outermost(document.select(&items).collect());
            Some(build_listing(pattern.name, &containers, &base, source_url))
        })
        .filter(|listing| listing.non_person_ratio <= max_non_person_ratio)
        .map(|listing| listing.with_contact())
        .max()
        .unwrap_or(0)
}

#[async_trait]
impl ExtractionStrategy for StructuralStrategy {
    fn tier(&self) -> ExtractionTier {
        ExtractionTier::Structural
    }

    async fn attempt(&self, page: &FetchedPage, ctx: &ExtractionContext) -> Attempt {
        if let Some(css) = ctx.selector.as_deref() {
            if let Some(listing) = self.extract_with_selector(&page.html, &page.final_url, css) {
                tracing::debug!(
                    url = %page.final_url,
                    selector = %css,
                    records = listing.records.len(),
                    "Known selector reused"
                );
                return Attempt::extracted(listing.records).with_selector(css);
            }
        }

        match self.extract_listing(&page.html, &page.final_url) {
            Some(listing) => {
                tracing::debug!(
                    url = %page.final_url,
                    pattern = listing.pattern,
                    records = listing.records.len(),
                    "Structural pattern accepted"
                );
                Attempt::extracted(listing.records)
            }
            None => Attempt::declined("no listing pattern produced enough person records"),
        }
    }

    async fn attempt_single(&self, page: &FetchedPage, _ctx: &ExtractionContext) -> Option<ProfileCandidate> {
        self.extract_single(&page.html, &page.final_url)
    }
}

/// Reduce matched elements to item containers.
///
/// A match that wraps two or more other matches is a list wrapper and is
/// dropped; of what remains, only the outermost elements are kept. Table
/// rows without data cells are skipped.
fn outermost(elements: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids: HashSet<_> = elements.iter().map(|e| e.id()).collect();

    let mut nearest_counts: HashMap<_, usize> = HashMap::new();
    for el in &elements {
        if let Some(parent) = el.ancestors().map(|a| a.id()).find(|id| ids.contains(id)) {
            *nearest_counts.entry(parent).or_insert(0) += 1;
        }
    }
    let kept: Vec<ElementRef<'_>> = elements
        .into_iter()
        .filter(|el| nearest_counts.get(&el.id()).copied().unwrap_or(0) < 2)
        .collect();
    let kept_ids: HashSet<_> = kept.iter().map(|e| e.id()).collect();

    kept.into_iter()
        .filter(|el| !el.ancestors().any(|a| kept_ids.contains(&a.id())))
        .filter(|el| {
            el.value().name() != "tr"
                || selector("td").is_some_and(|td| el.select(&td).next().is_some())
        })
        .collect()
}

/// Fields of a `<dt>` item live in the `<dd>` that follows it.
fn detail_scope(el: ElementRef<'_>) -> ElementRef<'_> {
    if el.value().name() != "dt" {
        return el;
    }
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|sibling| sibling.value().name() == "dd")
        .unwrap_or(el)
}

fn build_listing(
    pattern: &'static str,
    containers: &[ElementRef<'_>],
    base: &Url,
    source_url: &str,
) -> Listing {
    let items: Vec<Item> = containers
        .iter()
        .map(|el| item_from(*el, base, source_url))
        .collect();

    let guesses: Vec<&str> = items.iter().filter_map(|i| i.name_guess.as_deref()).collect();
    let non_person = guesses.iter().filter(|g| !looks_like_person_name(g)).count();
    let non_person_ratio = if guesses.is_empty() {
        1.0
    } else {
        non_person as f32 / guesses.len() as f32
    };

    Listing {
        pattern,
        items: items.len(),
        non_person_ratio,
        records: items.into_iter().filter_map(|i| i.record).collect(),
    }
}

fn item_from(el: ElementRef<'_>, base: &Url, source_url: &str) -> Item {
    let name_guess = name_guess(el);
    let record = name_guess
        .as_deref()
        .filter(|n| looks_like_person_name(n))
        .map(|name| fields_from(detail_scope(el), name.to_string(), base, source_url))
        .filter(|record| record.validate().is_ok());
    Item { name_guess, record }
}

/// Text in the name position: a person-shaped candidate if there is one,
/// otherwise the first non-empty candidate.
fn name_guess(el: ElementRef<'_>) -> Option<String> {
    if let Some(name) = first_person_text(el, NAME_SELECTORS) {
        return Some(name);
    }
    if let Some(name) = first_person_text(el, NAME_FALLBACK_SELECTORS) {
        return Some(name);
    }
    let chunks = text_chunks(el);
    if let Some(name) = chunks.iter().find(|c| looks_like_person_name(c)) {
        return Some(name.clone());
    }
    selector(NAME_FALLBACK_SELECTORS)
        .and_then(|s| el.select(&s).map(element_text).find(|t| !t.is_empty()))
        .or_else(|| chunks.into_iter().next())
}

fn first_person_text(el: ElementRef<'_>, css: &str) -> Option<String> {
    let sel = selector(css)?;
    el.select(&sel)
        .map(element_text)
        .find(|t| looks_like_person_name(t))
}

fn text_chunks(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(crate::names::clean_text)
        .filter(|t| !t.is_empty() && t.chars().count() <= 160)
        .collect()
}

fn select_text(el: ElementRef<'_>, css: &str, exclude: &str) -> Option<String> {
    let sel: Selector = selector(css)?;
    el.select(&sel)
        .map(element_text)
        .find(|t| !t.is_empty() && t != exclude && t.chars().count() <= 200)
}

/// The shared container-to-fields routine.
fn fields_from(el: ElementRef<'_>, name: String, base: &Url, source_url: &str) -> ProfileCandidate {
    let mut record = ProfileCandidate::new(name.clone(), source_url, ExtractionTier::Structural)
        .with_snippet(element_text(el));

    let title = select_text(el, TITLE_SELECTORS, &name).or_else(|| {
        text_chunks(el).into_iter().find(|chunk| {
            let lower = chunk.to_lowercase();
            chunk != &name && !chunk.contains('@') && TITLE_WORDS.iter().any(|w| lower.contains(w))
        })
    });
    if let Some(title) = title {
        record = record.with_title(title);
    }

    if let Some(email) = email_in(el) {
        record = record.with_email(email);
    }
    if let Some(url) = profile_link(el, &name, base, source_url) {
        record = record.with_profile_url(url);
    }
    if let Some(dept) = select_text(el, DEPARTMENT_SELECTORS, &name) {
        record = record.with_department(dept);
    }
    if let Some(interests) = select_text(el, INTEREST_SELECTORS, &name) {
        record = record.with_interests(split_interests(&interests));
    }
    record
}

fn email_in(el: ElementRef<'_>) -> Option<String> {
    if let Some(sel) = selector("a[href^='mailto:'], a[href^='MAILTO:']") {
        if let Some(email) = el
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .find_map(clean_email)
        {
            return Some(email);
        }
    }
    if let Some(sel) = selector("[itemprop='email']") {
        if let Some(email) = el.select(&sel).map(element_text).find_map(|t| clean_email(&t)) {
            return Some(email);
        }
    }
    find_email(&element_text(el))
}

fn profile_link(el: ElementRef<'_>, name: &str, base: &Url, source_url: &str) -> Option<String> {
    let anchor = selector("a[href]")?;
    let source_key = normalize_url(source_url);
    let name_lower = name.to_lowercase();

    let links: Vec<(String, String)> = el
        .select(&anchor)
        .filter_map(|a| {
            let url = resolve_href(base, a.value().attr("href")?)?;
            let url = url.to_string();
            (normalize_url(&url) != source_key).then(|| (url, element_text(a).to_lowercase()))
        })
        .collect();

    links
        .iter()
        .find(|(_, text)| !text.is_empty() && (text.contains(&name_lower) || name_lower.contains(text.as_str())))
        .or_else(|| links.iter().find(|(_, text)| PROFILE_LINK_TEXT.contains(&text.as_str())))
        .or_else(|| {
            links.iter().find(|(url, _)| {
                let lower = url.to_lowercase();
                ["profile", "people", "faculty", "staff", "directory", "person"]
                    .iter()
                    .any(|p| lower.contains(p))
            })
        })
        .or_else(|| links.first())
        .map(|(url, _)| url.clone())
}

pub(crate) fn split_interests(text: &str) -> Vec<String> {
    let body = match text.split_once(':') {
        Some((label, rest)) if label.chars().count() <= 40 => rest,
        _ => text,
    };
    body.split([',', ';', '•', '|', '\n'])
        .map(|s| s.trim().trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty() && s.chars().count() <= 80)
        .collect()
}

/// Groups of sibling elements sharing a tag and class signature.
fn repeated_groups<'a>(document: &'a Html, min_size: usize) -> Vec<Vec<ElementRef<'a>>> {
    let mut groups = Vec::new();
    for parent in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let mut by_signature: HashMap<String, Vec<ElementRef<'a>>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for child in parent.children().filter_map(ElementRef::wrap) {
            let name = child.value().name();
            if matches!(name, "script" | "style" | "br" | "hr" | "option") {
                continue;
            }
            let mut classes: Vec<&str> = child.value().classes().collect();
            classes.sort_unstable();
            let signature = format!("{name}.{}", classes.join("."));
            if !by_signature.contains_key(&signature) {
                order.push(signature.clone());
            }
            by_signature.entry(signature).or_default().push(child);
        }
        for signature in order {
            if let Some(group) = by_signature.remove(&signature) {
                if group.len() >= min_size {
                    groups.push(group);
                }
            }
        }
    }
    groups
}
