//! URL helpers shared by identifier resolution and the REST client

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

static UUID_ANYWHERE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

/// True if the whole string is a hyphenated UUID (any case)
pub fn is_uuid(s: &str) -> bool {
    UUID_RE.is_match(s)
}

/// Parse `s` as an absolute URL with a host, rejecting things like `urn:` or `mailto:`
pub fn absolute_url(s: &str) -> Option<Url> {
    let url = Url::parse(s).ok()?;
    url.has_host().then_some(url)
}

/// Last path segment of a URL string, ignoring query, fragment and trailing slashes.
///
/// Returns a slice of the input so callers can hand it back without allocating.
pub fn trailing_segment(raw: &str) -> &str {
    let without_suffix = raw.split(['?', '#']).next().unwrap_or(raw);
    let trimmed = without_suffix.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// The last UUID appearing anywhere in a URL.
///
/// For `/authors/{a}/entries/{e}` this yields the entry UUID, not the author's.
pub fn last_uuid_in(url: &str) -> Option<&str> {
    UUID_ANYWHERE_RE.find_iter(url).last().map(|m| m.as_str())
}

/// `scheme://host[:port]` of a URL, without path
pub fn base_host(url: &str) -> Option<String> {
    absolute_url(url).map(|u| u.origin().ascii_serialization())
}

/// The API root of a node URL: everything up to and including an `api` path segment,
/// or the bare origin with a trailing slash when there is none.
pub fn api_base_url(url: &str) -> Option<String> {
    let parsed = absolute_url(url)?;
    let origin = parsed.origin().ascii_serialization();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.iter().position(|seg| *seg == "api") {
        Some(idx) => Some(format!("{origin}/{}/", segments[..=idx].join("/"))),
        None => Some(format!("{origin}/")),
    }
}

/// Normalize an author URL so the same author served by different nodes compares equal:
/// lowercase scheme and host, default ports dropped, trailing slash removed.
///
/// Unparseable input is returned unchanged.
pub fn normalize_author_url(raw: &str) -> String {
    let Some(parsed) = absolute_url(raw) else {
        return raw.to_string();
    };

    let mut out = format!("{}://", parsed.scheme());
    if !parsed.username().is_empty() {
        out.push_str(parsed.username());
        if let Some(password) = parsed.password() {
            out.push(':');
            out.push_str(password);
        }
        out.push('@');
    }
    out.push_str(parsed.host_str().unwrap_or_default());
    // `Url::port` is already None for the scheme's default port
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{port}"));
    }
    out.push_str(parsed.path().trim_end_matches('/'));
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
