//! Fallback Matcher
//!
//! Runs in the context of a loading page. A page served from cache or a
//! service worker never produces a network request, so the dynamic rules
//! never see it; this re-checks the page's host against the stored domain
//! filters and redirects locally.
//!
//! Only `||domain^` filters are re-checked. Substring filters stay the job
//! of the dynamic rule set.
//!
//! Nothing here may break page loading: every failure is logged and dropped.

use crate::entry::{BlockEntry, load_entries};
use crate::normalize::strip_www;
use crate::origin::ExtensionOrigin;
use crate::storage::{KeyValueStore, StorageError};
use async_trait::async_trait;
use sitewall_network::{domain_of, host_matches_domain};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Navigation failed: {0}")]
pub struct NavigationError(pub String);

/// Navigation of the page the check runs in
#[async_trait]
pub trait PageNavigator: Send + Sync {
    /// Replace the current page without leaving a history entry
    async fn replace(&self, url: &str) -> Result<(), NavigationError>;
}

#[derive(Debug, Error)]
enum FallbackError {
    #[error("Unparsable page location: {0}")]
    Location(#[from] url::ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// First entry whose domain filter covers `host`
pub fn matching_entry<'a>(host: &str, entries: &'a [BlockEntry]) -> Option<&'a BlockEntry> {
    entries.iter().find(|entry| {
        domain_of(&entry.url_filter).is_some_and(|domain| host_matches_domain(host, domain))
    })
}

/// Whether any stored domain filter covers `host`
pub fn matches(host: &str, entries: &[BlockEntry]) -> bool {
    matching_entry(host, entries).is_some()
}

pub struct FallbackMatcher {
    storage: Arc<dyn KeyValueStore>,
    origin: ExtensionOrigin,
    blocked_url: String,
}

impl FallbackMatcher {
    pub fn new(storage: Arc<dyn KeyValueStore>, origin: ExtensionOrigin, blocked_page: &str) -> Self {
        let blocked_url = origin.get_url(blocked_page);
        Self {
            storage,
            origin,
            blocked_url,
        }
    }

    pub fn blocked_url(&self) -> &str {
        &self.blocked_url
    }

    /// Look up the entry blocking `page_url`, without navigating
    pub async fn check(&self, page_url: &str) -> Option<BlockEntry> {
        match self.find(page_url).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Fallback check skipped for {}: {}", page_url, e);
                None
            }
        }
    }

    /// Check the page and redirect it to the blocked page on a match.
    ///
    /// Returns whether the page was redirected.
    pub async fn run(&self, page_url: &str, navigator: &dyn PageNavigator) -> bool {
        match self.try_run(page_url, navigator).await {
            Ok(redirected) => redirected,
            Err(e) => {
                debug!("Fallback check skipped for {}: {}", page_url, e);
                false
            }
        }
    }

    async fn try_run(
        &self,
        page_url: &str,
        navigator: &dyn PageNavigator,
    ) -> Result<bool, FallbackError> {
        let Some(entry) = self.find(page_url).await? else {
            return Ok(false);
        };

        navigator.replace(&self.blocked_url).await?;
        info!(
            "Fallback redirected {} (matched '{}')",
            page_url, entry.url_filter
        );
        Ok(true)
    }

    async fn find(&self, page_url: &str) -> Result<Option<BlockEntry>, FallbackError> {
        let location = Url::parse(page_url)?;
        if self.origin.is_extension_page(&location) {
            return Ok(None);
        }

        let host = strip_www(location.host_str().unwrap_or_default());
        if host.is_empty() {
            return Ok(None);
        }

        let entries = load_entries(self.storage.as_ref()).await?;
        Ok(matching_entry(host, &entries).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNavigator {
        visited: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PageNavigator for RecordingNavigator {
        async fn replace(&self, url: &str) -> Result<(), NavigationError> {
            if self.fail {
                return Err(NavigationError("frame detached".to_string()));
            }
            self.visited.lock().await.push(url.to_string());
            Ok(())
        }
    }

    fn entry(id: u32, filter: &str) -> BlockEntry {
        BlockEntry {
            id,
            original_input: filter.to_string(),
            url_filter: filter.to_string(),
        }
    }

    fn create_matcher(storage: MemoryStorage) -> FallbackMatcher {
        FallbackMatcher::new(
            Arc::new(storage),
            ExtensionOrigin::new("ext"),
            "/blocked.html",
        )
    }

    fn seeded_storage() -> MemoryStorage {
        MemoryStorage::with_items(json!({
            "blockedRules": [
                { "id": 1, "input": "casino", "urlFilter": "casino" },
                { "id": 2, "input": "example.org", "urlFilter": "||example.org^" },
            ],
        }))
    }

    #[test]
    fn test_domain_matching() {
        let entries = vec![entry(1, "||example.org^")];

        assert!(matches("example.org", &entries));
        assert!(matches("sub.example.org", &entries));
        assert!(!matches("notexample.org", &entries));
        assert!(!matches("example.org.evil.net", &entries));
    }

    #[test]
    fn test_substring_filters_ignored() {
        let entries = vec![entry(1, "example"), entry(2, "||^")];
        assert!(!matches("example.org", &entries));
    }

    #[tokio::test]
    async fn test_redirects_matching_page() {
        let matcher = create_matcher(seeded_storage());
        let navigator = RecordingNavigator::default();

        assert!(matcher.run("https://www.sub.example.org/feed", &navigator).await);
        assert_eq!(
            *navigator.visited.lock().await,
            vec!["chrome-extension://ext/blocked.html".to_string()]
        );
    }

    #[tokio::test]
    async fn test_www_is_stripped_from_page_host() {
        let matcher = create_matcher(seeded_storage());
        assert_eq!(
            matcher.check("https://www.example.org/").await.map(|e| e.id),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_leaves_other_pages_alone() {
        let matcher = create_matcher(seeded_storage());
        let navigator = RecordingNavigator::default();

        assert!(!matcher.run("https://notexample.org/", &navigator).await);
        // Substring filters are not the fallback's business
        assert!(!matcher.run("https://casino.test/", &navigator).await);
        // Never redirect extension pages
        assert!(!matcher.run("chrome-extension://ext/blocked.html", &navigator).await);
        assert!(!matcher.run("about:blank", &navigator).await);
        assert!(navigator.visited.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let corrupt = create_matcher(MemoryStorage::with_items(json!({ "blockedRules": 5 })));
        let navigator = RecordingNavigator::default();
        assert!(!corrupt.run("https://example.org/", &navigator).await);
        assert!(!corrupt.run("not a url", &navigator).await);

        let matcher = create_matcher(seeded_storage());
        let broken = RecordingNavigator {
            fail: true,
            ..Default::default()
        };
        assert!(!matcher.run("https://example.org/", &broken).await);
    }
}
