//! Canonical URL keys.
//!
//! Every visited-set, candidate dedup and pagination cycle guard in the
//! pipeline is keyed by the string produced here, never by the raw URL.

use url::Url;

/// Query parameters that never change page content.
const NOISE_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "sessionid",
    "sid",
    "phpsessid",
    "jsessionid",
    "ref",
    "_ga",
];

/// Two-label public suffixes common for academic hosts.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "ac.uk", "co.uk", "org.uk", "ac.in", "edu.in", "co.in", "ac.jp", "edu.au", "com.au",
    "edu.cn", "ac.nz", "ac.za", "edu.sg", "ac.kr", "edu.br", "ac.il", "edu.hk", "edu.tr",
    "ac.id", "edu.my", "edu.pk", "ac.th",
];

/// Normalize a URL string into its canonical key.
///
/// Returns `None` when the input does not parse as an absolute http(s) URL.
pub fn normalize_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.host_str()?;
    Some(normalize_parsed(&parsed))
}

/// Canonical key of an already-parsed URL.
///
/// Lowercases scheme and host, drops `www.`, default ports, fragments,
/// trailing slashes and tracking parameters; remaining query pairs are
/// sorted so parameter order does not create distinct keys.
pub fn normalize_parsed(url: &Url) -> String {
    let host = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_lowercase();

    let mut key = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        key.push_str(&format!(":{port}"));
    }

    let path = url.path().trim_end_matches('/');
    key.push_str(path);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_noise_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        pairs.sort();
        let query = pairs
            .iter()
            .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&query);
    }

    key
}

fn is_noise_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with("utm_") || NOISE_PARAMS.contains(&lower.as_str())
}

/// The registrable domain (eTLD+1) of a host, using a small academic
/// suffix table rather than the full public-suffix list.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let keep = if MULTI_LABEL_SUFFIXES
        .iter()
        .any(|suffix| host.ends_with(&format!(".{suffix}")))
    {
        3
    } else {
        2
    };

    if labels.len() <= keep {
        labels.join(".")
    } else {
        labels[labels.len() - keep..].join(".")
    }
}

/// Host labels left of the public suffix (`cs.ox.ac.uk` -> `cs.ox`).
pub fn strip_public_suffix(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.trim_start_matches("www.");
    if let Some(suffix) = MULTI_LABEL_SUFFIXES
        .iter()
        .find(|suffix| host.ends_with(&format!(".{suffix}")))
    {
        return host[..host.len() - suffix.len() - 1].to_string();
    }
    match host.rsplit_once('.') {
        Some((rest, _tld)) => rest.to_string(),
        None => host.to_string(),
    }
}

/// Registrable domain of a URL, if it has a host.
pub fn site_of(url: &Url) -> Option<String> {
    url.host_str().map(registrable_domain)
}

/// Registrable domain of a raw URL string.
pub fn site_of_str(raw: &str) -> Option<String> {
    Url::parse(raw).ok().as_ref().and_then(site_of)
}

/// Whether two URLs belong to the same registrable domain.
pub fn same_site(a: &Url, b: &Url) -> bool {
    match (site_of(a), site_of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Number of non-empty path segments.
pub fn path_depth(url: &Url) -> usize {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).count())
        .unwrap_or(0)
}
