//! Person-name heuristics, the non-person lexicon and email grammar.
//!
//! These are shared by the page classifier (counting person-shaped cards),
//! the extraction tiers (validating candidate names) and the garbage filter.

use regex::Regex;
use std::sync::LazyLock;

/// Whole-name matches that are navigation or section labels, not people.
const NON_PERSON_EXACT: &[&str] = &[
    "home",
    "about",
    "about us",
    "contact",
    "contact us",
    "login",
    "log in",
    "search",
    "menu",
    "read more",
    "more",
    "view",
    "view profile",
    "view all",
    "profile",
    "news",
    "events",
    "calendar",
    "faculty",
    "staff",
    "people",
    "directory",
    "research",
    "teaching",
    "academics",
    "admissions",
    "apply",
    "sitemap",
    "history",
    "alumni",
    "give",
    "giving",
    "next",
    "previous",
    "back",
    "emeriti",
    "visiting faculty",
    "adjunct faculty",
];

/// Phrases that mark an organisational unit or role mailbox when they
/// appear anywhere in a "name".
const NON_PERSON_PHRASES: &[&str] = &[
    "department of",
    "dept. of",
    "dept of",
    "school of",
    "college of",
    "faculty of",
    "institute of",
    "institute for",
    "center for",
    "centre for",
    "office of",
    "division of",
    "program in",
    "programme in",
    "laboratory",
    "'s office",
    "\u{2019}s office",
    "university",
    "graduate studies",
    "undergraduate studies",
    "student services",
    "all rights reserved",
    "copyright",
];

/// Single words that never occur inside a person's name.
const NON_PERSON_WORDS: &[&str] = &[
    "department",
    "office",
    "news",
    "events",
    "admissions",
    "committee",
    "council",
    "board",
    "services",
    "programs",
    "programmes",
    "courses",
    "seminar",
    "newsletter",
    "login",
    "directory",
];

/// Markers of a link to an academic unit rather than a person.
const DEPARTMENT_MARKERS: &[&str] = &[
    "department",
    "dept",
    "school of",
    "faculty of",
    "college of",
    "institute",
    "division of",
    "centre for",
    "center for",
    "program in",
    "programme in",
];

/// Honorifics and post-nominals stripped before identity comparison.
const HONORIFICS: &[&str] = &[
    "dr", "prof", "professor", "mr", "mrs", "ms", "miss", "mx", "sir", "phd", "md", "jr", "sr",
];

/// Lowercase particles allowed inside a name.
const NAME_PARTICLES: &[&str] = &[
    "de", "del", "della", "der", "di", "da", "do", "dos", "du", "la", "le", "van", "von", "bin",
    "binti", "ibn", "al", "y", "e", "ter", "den",
];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("static email regex")
});

static EMAIL_IN_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("static email regex")
});

/// Collapse runs of whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether the text matches the non-person lexicon.
pub fn is_non_person(name: &str) -> bool {
    let lower = clean_text(name).to_lowercase();
    if lower.is_empty() {
        return true;
    }
    if NON_PERSON_EXACT.contains(&lower.as_str()) {
        return true;
    }
    if NON_PERSON_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| NON_PERSON_WORDS.contains(&word))
}

/// Whether link text (or its URL) names an academic unit.
pub fn is_department_label(text: &str) -> bool {
    let lower = text.to_lowercase().replace(['-', '_'], " ");
    DEPARTMENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Whether a string is shaped like a person's name.
///
/// Accepts 2-6 tokens, each capitalised (or an allowed particle, initial,
/// or honorific), with no digits, `@`, or lexicon hits. Handles
/// "Last, First" ordering.
pub fn looks_like_person_name(text: &str) -> bool {
    let cleaned = clean_text(text);
    if cleaned.len() < 4 || cleaned.len() > 60 {
        return false;
    }
    if cleaned.chars().any(|c| c.is_ascii_digit() || c == '@' || c == '|' || c == '/') {
        return false;
    }
    if is_non_person(&cleaned) {
        return false;
    }

    let tokens: Vec<&str> = cleaned
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .collect();

    let mut name_tokens = 0;
    for token in &tokens {
        let bare = token.trim_matches(|c: char| c == '.' || c == '(' || c == ')');
        let lower = bare.to_lowercase();
        if HONORIFICS.contains(&lower.as_str()) {
            continue;
        }
        if NAME_PARTICLES.contains(&bare) {
            continue;
        }
        let Some(first) = bare.chars().next() else {
            continue;
        };
        if !first.is_uppercase() {
            return false;
        }
        if !bare
            .chars()
            .all(|c| c.is_alphabetic() || c == '-' || c == '\'' || c == '\u{2019}' || c == '.')
        {
            return false;
        }
        name_tokens += 1;
    }

    (2..=6).contains(&name_tokens)
}

/// Canonical form of a name for identity comparison.
///
/// Lowercases, strips honorifics and punctuation, and reorders
/// "Last, First" into "first last".
pub fn normalize_name(name: &str) -> String {
    let cleaned = clean_text(name);
    let reordered = match cleaned.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() && !last.contains(' ') => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => cleaned,
    };

    reordered
        .to_lowercase()
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'')
                .to_string()
        })
        .filter(|t| !t.is_empty() && !HONORIFICS.contains(&t.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a string is a syntactically valid email address.
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Normalize an email pulled from markup (`mailto:` prefix, query, obfuscation).
pub fn clean_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("mailto:")
        .or_else(|| trimmed.strip_prefix("MAILTO:"))
        .unwrap_or(trimmed);
    let address = without_scheme
        .split('?')
        .next()
        .unwrap_or_default()
        .replace(" [at] ", "@")
        .replace("[at]", "@")
        .replace(" (at) ", "@")
        .replace("(at)", "@")
        .replace(" [dot] ", ".")
        .replace("[dot]", ".")
        .trim()
        .to_string();

    is_valid_email(&address).then_some(address)
}

/// First email-shaped substring of free text.
pub fn find_email(text: &str) -> Option<String> {
    EMAIL_IN_TEXT_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|e| is_valid_email(e))
}

/// Fraction of `names` that pass [`looks_like_person_name`].
pub fn person_name_ratio<'a>(names: impl IntoIterator<Item = &'a str>) -> f32 {
    let mut total = 0usize;
    let mut people = 0usize;
    for name in names {
        total += 1;
        if looks_like_person_name(name) {
            people += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        people as f32 / total as f32
    }
}
