//! Tab host: the browser side the background services act on.

use async_trait::async_trait;
use sitewall_core::NavigationError;
use std::fmt;

/// Unique identifier for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u64);

impl TabId {
    /// Create a new tab ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tab({})", self.0)
    }
}

/// The focused tab of the current window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTab {
    pub id: TabId,
    /// Missing for tabs the extension may not inspect
    pub url: Option<String>,
}

#[async_trait]
pub trait TabHost: Send + Sync {
    /// Active tab in the current window, if any
    async fn active_tab(&self) -> Option<ActiveTab>;

    /// Load `url` in the given tab
    async fn navigate(&self, tab: TabId, url: &str) -> Result<(), NavigationError>;
}

/// Host with no tabs, for contexts without a browser window (CLI)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTabs;

#[async_trait]
impl TabHost for NoTabs {
    async fn active_tab(&self) -> Option<ActiveTab> {
        None
    }

    async fn navigate(&self, tab: TabId, _url: &str) -> Result<(), NavigationError> {
        Err(NavigationError(format!("{} does not exist", tab)))
    }
}
