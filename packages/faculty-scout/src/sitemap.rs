//! `robots.txt` rules and sitemap parsing.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Conventional sitemap locations tried when robots.txt lists none.
pub const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap/sitemap.xml"];

static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<loc>\s*(?:<!\[CDATA\[)?\s*(.*?)\s*(?:\]\]>)?\s*</loc>").expect("static loc regex")
});

/// Rules from a `robots.txt` that apply to us.
///
/// Only the groups for `*` and our own agent token are kept; when both
/// exist, the agent-specific group wins.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
    sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Parse `robots.txt` content for `agent`.
    pub fn parse(content: &str, agent: &str) -> Self {
        let agent = agent.to_lowercase();
        let mut wildcard = (Vec::new(), Vec::new());
        let mut specific: Option<(Vec<String>, Vec<String>)> = None;
        let mut sitemaps = Vec::new();

        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_lowercase();
            let value = value.trim();

            match field.as_str() {
                "user-agent" => {
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    if value.is_empty() {
                        continue;
                    }
                    let target = if group_agents.iter().any(|a| a != "*" && agent.contains(a.as_str())) {
                        specific.get_or_insert_with(|| (Vec::new(), Vec::new()))
                    } else if group_agents.iter().any(|a| a == "*") {
                        &mut wildcard
                    } else {
                        continue;
                    };
                    if field == "allow" {
                        target.0.push(value.to_string());
                    } else {
                        target.1.push(value.to_string());
                    }
                }
                "sitemap" => {
                    // "Sitemap: https://..." splits on the first colon
                    let full = line[line.find(':').map_or(0, |i| i + 1)..].trim();
                    if !full.is_empty() {
                        sitemaps.push(full.to_string());
                    }
                }
                _ => {}
            }
        }

        let (allow, disallow) = specific.unwrap_or(wildcard);
        Self {
            allow,
            disallow,
            sitemaps,
        }
    }

    /// Whether `path` may be fetched. The longest matching rule wins;
    /// ties go to `Allow`.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|rule| rule_matches(rule, path))
                .map(|rule| rule.len())
                .max()
        };
        match (longest(&self.allow), longest(&self.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }

    /// Sitemap URLs listed in the file.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

/// Prefix match with `*` wildcards and a trailing `$` anchor.
fn rule_matches(rule: &str, path: &str) -> bool {
    let (pattern, anchored) = match rule.strip_suffix('$') {
        Some(p) => (p, true),
        None => (rule, false),
    };
    if !pattern.contains('*') {
        return if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let mut rest = path;
    let mut parts = pattern.split('*').peekable();
    let mut first = true;
    while let Some(part) = parts.next() {
        let last = parts.peek().is_none();
        if first {
            if !rest.starts_with(part) {
                return false;
            }
            rest = &rest[part.len()..];
            first = false;
        } else if last && anchored {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(idx) => rest = &rest[idx + part.len()..],
                None => return false,
            }
        }
    }
    !anchored || rest.is_empty() || pattern.ends_with('*')
}

/// Parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sitemap {
    /// `<urlset>`: page URLs
    UrlSet(Vec<String>),
    /// `<sitemapindex>`: child sitemap URLs
    Index(Vec<String>),
}

impl Sitemap {
    /// Parse sitemap XML. Returns `None` when the body is not a sitemap.
    pub fn parse(body: &str) -> Option<Self> {
        let head_end = body.char_indices().nth(2048).map_or(body.len(), |(i, _)| i);
        let head = body[..head_end].to_lowercase();
        let is_index = head.contains("<sitemapindex");
        if !is_index && !head.contains("<urlset") {
            return None;
        }

        let locs = LOC_RE
            .captures_iter(body)
            .filter_map(|cap| cap.get(1))
            .map(|m| unescape_xml(m.as_str()))
            .filter(|loc| Url::parse(loc).is_ok())
            .collect();

        Some(if is_index {
            Sitemap::Index(locs)
        } else {
            Sitemap::UrlSet(locs)
        })
    }
}

fn unescape_xml(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_robots_wildcard_group() {
        let robots = RobotsRules::parse(
            "User-agent: *\nDisallow: /private/\nAllow: /private/faculty/\n\
             Sitemap: https://x.edu/sitemap.xml\n",
            "faculty-scout",
        );
        assert!(robots.is_allowed("/people"));
        assert!(!robots.is_allowed("/private/admin"));
        assert!(robots.is_allowed("/private/faculty/list"));
        assert_eq!(robots.sitemaps(), &["https://x.edu/sitemap.xml".to_string()]);
    }

    #[test]
    fn test_robots_specific_agent_wins() {
        let robots = RobotsRules::parse(
            "User-agent: *\nDisallow: /\n\nUser-agent: faculty-scout\nDisallow: /tmp\n",
            "faculty-scout/0.1",
        );
        assert!(robots.is_allowed("/faculty"));
        assert!(!robots.is_allowed("/tmp/x"));
    }

    #[test]
    fn test_robots_wildcards() {
        let robots = RobotsRules::parse("User-agent: *\nDisallow: /*.pdf$\nDisallow: /search*\n", "bot");
        assert!(!robots.is_allowed("/files/cv.pdf"));
        assert!(robots.is_allowed("/files/cv.pdf.html"));
        assert!(!robots.is_allowed("/search?q=x"));
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://x.edu/faculty/index.html</loc></url>
              <url><loc><![CDATA[https://x.edu/news?a=1&amp;b=2]]></loc></url>
              <url><loc>not a url</loc></url>
            </urlset>"#;
        assert_eq!(
            Sitemap::parse(xml),
            Some(Sitemap::UrlSet(vec![
                "https://x.edu/faculty/index.html".to_string(),
                "https://x.edu/news?a=1&b=2".to_string(),
            ]))
        );
    }

    #[test]
    fn test_parse_index_and_garbage() {
        let xml = "<sitemapindex><sitemap><loc>https://x.edu/s1.xml</loc></sitemap></sitemapindex>";
        assert_eq!(
            Sitemap::parse(xml),
            Some(Sitemap::Index(vec!["https://x.edu/s1.xml".to_string()]))
        );
        assert_eq!(Sitemap::parse("<html>Not found</html>"), None);
    }
}
