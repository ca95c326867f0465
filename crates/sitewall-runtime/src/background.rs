//! Background services: answers control requests and reacts to
//! install/startup events.

use crate::message::{Request, Response};
use crate::tab::TabHost;
use sitewall_core::{AddOutcome, ExtensionOrigin, RuleStore, StoreError, strip_www};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Control surface errors
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("No active tab")]
    NoActiveTarget,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Background services stopped")]
    Stopped,
}

pub struct Background {
    store: RuleStore,
    tabs: Arc<dyn TabHost>,
    blocked_url: String,
}

impl Background {
    pub fn new(store: RuleStore, tabs: Arc<dyn TabHost>, origin: &ExtensionOrigin) -> Self {
        let blocked_url = origin.get_url(&store.synchronizer().config().blocked_page);
        Self {
            store,
            tabs,
            blocked_url,
        }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// Extension installed or updated: re-apply rules from storage
    pub async fn on_installed(&self) -> Result<(), StoreError> {
        info!("Installed: rebuilding dynamic rules from storage");
        self.store.reconcile().await
    }

    /// Browser started: re-apply rules from storage
    pub async fn on_startup(&self) -> Result<(), StoreError> {
        info!("Startup: rebuilding dynamic rules from storage");
        self.store.reconcile().await
    }

    /// Answer one request. Never fails; errors become `{ok: false}`.
    pub async fn handle(&self, request: Request) -> Response {
        debug!("Handling {:?}", request);

        let result = match request {
            Request::List => self.list().await,
            Request::Add { input } => self.add(&input).await,
            Request::Remove { id } => self.remove(id).await,
            Request::BlockCurrent => self.block_current().await,
            Request::BlockLink { url } => self.add(&url).await,
        };

        result.unwrap_or_else(|e| {
            debug!("Request failed: {}", e);
            Response::error(e)
        })
    }

    async fn list(&self) -> Result<Response, ControlError> {
        Ok(Response::list(self.store.list().await?))
    }

    async fn add(&self, input: &str) -> Result<Response, ControlError> {
        Ok(match self.store.add(input).await? {
            AddOutcome::Added(entry) => Response::added(entry),
            AddOutcome::Duplicate => Response::duplicate(),
        })
    }

    async fn remove(&self, id: u32) -> Result<Response, ControlError> {
        self.store.remove(id).await?;
        Ok(Response::ok())
    }

    /// Block the active tab's site, then send the tab to the blocked page
    async fn block_current(&self) -> Result<Response, ControlError> {
        let response = self.block_current_site().await?;
        if response.ok {
            self.redirect_active_to_blocked().await;
        }
        Ok(response)
    }

    async fn block_current_site(&self) -> Result<Response, ControlError> {
        let tab = self
            .tabs
            .active_tab()
            .await
            .ok_or(ControlError::NoActiveTarget)?;
        let url = tab.url.as_deref().ok_or(ControlError::NoActiveTarget)?;

        let location = Url::parse(url)?;
        let domain = strip_www(location.host_str().unwrap_or_default());
        self.add(domain).await
    }

    /// Best effort: navigation failures are ignored
    async fn redirect_active_to_blocked(&self) {
        let Some(tab) = self.tabs.active_tab().await else {
            return;
        };
        if let Err(e) = self.tabs.navigate(tab.id, &self.blocked_url).await {
            debug!("Could not redirect {}: {}", tab.id, e);
        }
    }
}
