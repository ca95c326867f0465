//! URL Filter Patterns
//!
//! The two filter shapes understood by the dynamic rule set:
//! - Domain anchor: ||example.com^ (the domain and all of its subdomains)
//! - Substring: any other text, matched anywhere in the request URL
//!
//! Richer filter syntax (wildcards, start/end anchors, options) is
//! deliberately not interpreted; such filters are matched as plain substrings.

use std::fmt;

const DOMAIN_ANCHOR: &str = "||";
const SEPARATOR: char = '^';

/// Shape of a parsed filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// `||domain^`
    Domain,
    /// Free-text substring
    Substring,
}

/// A parsed url filter, normalized for case-insensitive matching
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlFilter {
    kind: FilterKind,
    /// Lowercased domain (for `Domain`) or lowercased text (for `Substring`)
    pattern: String,
}

impl UrlFilter {
    /// Parse a raw url filter string
    pub fn parse(raw: &str) -> Self {
        match domain_of(raw) {
            Some(domain) => Self {
                kind: FilterKind::Domain,
                pattern: domain.to_ascii_lowercase(),
            },
            None => Self {
                kind: FilterKind::Substring,
                pattern: raw.to_ascii_lowercase(),
            },
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// The lowercased domain or substring
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check this filter against a request URL and its host
    pub fn matches(&self, url: &str, host: Option<&str>) -> bool {
        match self.kind {
            FilterKind::Domain => host.is_some_and(|h| host_matches_domain(h, &self.pattern)),
            FilterKind::Substring => url.to_ascii_lowercase().contains(&self.pattern),
        }
    }
}

impl fmt::Display for UrlFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FilterKind::Domain => write!(f, "{}{}{}", DOMAIN_ANCHOR, self.pattern, SEPARATOR),
            FilterKind::Substring => write!(f, "{}", self.pattern),
        }
    }
}

/// Build the domain-anchored filter for a domain: `||domain^`
pub fn domain_filter(domain: &str) -> String {
    format!("{}{}{}", DOMAIN_ANCHOR, domain, SEPARATOR)
}

/// Extract the domain from a `||domain^` filter.
///
/// Returns `None` for any other shape, including the degenerate `||^`.
pub fn domain_of(filter: &str) -> Option<&str> {
    let domain = filter
        .strip_prefix(DOMAIN_ANCHOR)?
        .strip_suffix(SEPARATOR)?;

    if domain.is_empty() {
        return None;
    }
    Some(domain)
}

/// Domain-anchor semantics: the host is the domain itself or one of its
/// subdomains. Comparison is ASCII case-insensitive.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    if host.len() == domain.len() {
        return host.eq_ignore_ascii_case(domain);
    }
    if host.len() <= domain.len() {
        return false;
    }

    let split = host.len() - domain.len();
    host.as_bytes()[split - 1] == b'.'
        && host.is_char_boundary(split)
        && host[split..].eq_ignore_ascii_case(domain)
}
