//! Filter Normalizer
//!
//! Turns whatever the user typed into a url filter the rule set understands.
//! Classifiers are tried in order and the first one that recognizes the
//! input wins:
//! 1. Absolute URL → `||host^`; a URL without a usable host is rejected
//! 2. Bare domain (`news.example.com`) → `||domain^`
//! 3. Anything else → the text itself, matched as a substring

use once_cell::sync::Lazy;
use regex::Regex;
use sitewall_network::domain_filter;
use url::Url;

/// One or more dot-separated labels ending in a 2+ letter top-level label
static BARE_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9-]+\.)+[a-z]{2,}$").expect("invalid bare domain pattern")
});

/// Which classifier recognized the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Url,
    Domain,
    FreeText,
}

/// Result of normalizing user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub kind: InputKind,
    pub url_filter: String,
}

/// Verdict of a single classifier
#[derive(Debug, Clone, PartialEq, Eq)]
enum Classified {
    /// Recognized; this is the filter
    Matched(String),
    /// Recognized, but there is nothing to block
    Rejected,
    /// Not this classifier's shape; try the next one
    NotMine,
}

type Classifier = fn(&str) -> Classified;

/// Ordered classifier chain; free text is the catch-all after it
const CLASSIFIERS: &[(InputKind, Classifier)] = &[
    (InputKind::Url, from_url),
    (InputKind::Domain, from_bare_domain),
];

/// Strip a leading `www.` label.
///
/// Stand-in for a real registrable-domain (eTLD+1) computation.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn from_url(input: &str) -> Classified {
    let Ok(url) = Url::parse(input) else {
        return Classified::NotMine;
    };
    // mailto:, about:blank, localhost:3000 and friends parse without a host
    match url.host_str().map(strip_www) {
        Some(host) if !host.is_empty() => Classified::Matched(domain_filter(host)),
        _ => Classified::Rejected,
    }
}

fn from_bare_domain(input: &str) -> Classified {
    if !BARE_DOMAIN.is_match(input) {
        return Classified::NotMine;
    }
    Classified::Matched(domain_filter(strip_www(input)))
}

/// Classify input and derive its url filter.
///
/// `None` for blank input and for URLs without a host.
pub fn classify(input: &str) -> Option<Normalized> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    for (kind, classifier) in CLASSIFIERS {
        match classifier(trimmed) {
            Classified::Matched(url_filter) => {
                return Some(Normalized {
                    kind: *kind,
                    url_filter,
                });
            }
            Classified::Rejected => return None,
            Classified::NotMine => {}
        }
    }

    Some(Normalized {
        kind: InputKind::FreeText,
        url_filter: trimmed.to_string(),
    })
}

/// Derive the url filter for raw user input.
///
/// `None` for blank input and for URLs without a host.
pub fn normalize(input: &str) -> Option<String> {
    classify(input).map(|n| n.url_filter)
}
