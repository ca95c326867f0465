//! Extension origin: where bundled pages such as the blocked page live.

use serde::{Deserialize, Serialize};
use url::Url;

/// Scheme of extension-owned pages
pub const EXTENSION_SCHEME: &str = "chrome-extension";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionOrigin {
    pub scheme: String,
    pub id: String,
}

impl ExtensionOrigin {
    pub fn new(id: &str) -> Self {
        Self {
            scheme: EXTENSION_SCHEME.to_string(),
            id: id.to_string(),
        }
    }

    /// Absolute URL of a bundled resource, e.g. `chrome-extension://<id>/blocked.html`
    pub fn get_url(&self, path: &str) -> String {
        format!("{}://{}/{}", self.scheme, self.id, path.trim_start_matches('/'))
    }

    /// Whether `url` is served by an extension (ours or any other)
    pub fn is_extension_page(&self, url: &Url) -> bool {
        url.scheme() == self.scheme
    }
}
