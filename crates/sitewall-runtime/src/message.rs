//! Message types for the control surface (popup, blocked page, CLI).
//!
//! Every request is answered with the same response shape:
//! `{ "ok": true, ...payload }` or `{ "ok": false, "error": "..." }`.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use sitewall_core::BlockEntry;
use std::fmt;

/// Requests accepted by the background services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    /// List all blocked entries
    List,
    /// Block whatever the raw text normalizes to
    Add { input: String },
    /// Unblock an entry
    Remove {
        #[serde(deserialize_with = "lenient_id")]
        id: u32,
    },
    /// Block the active tab's site and send the tab to the blocked page
    BlockCurrent,
    /// Block a link target (context menu)
    BlockLink { url: String },
}

impl Request {
    /// Parse a JSON message
    pub fn from_json(message: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(message)
    }
}

/// Ids arrive as numbers from most senders, as strings from form fields
fn lenient_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u32),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(de::Error::custom),
    }
}

/// Uniform response to every request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_rules: Option<Vec<BlockEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<BlockEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Success without payload
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn list(entries: Vec<BlockEntry>) -> Self {
        Self {
            ok: true,
            blocked_rules: Some(entries),
            ..Default::default()
        }
    }

    pub fn added(entry: BlockEntry) -> Self {
        Self {
            ok: true,
            entry: Some(entry),
            ..Default::default()
        }
    }

    /// Soft success: the filter was already blocked
    pub fn duplicate() -> Self {
        Self {
            ok: true,
            duplicate: Some(true),
            ..Default::default()
        }
    }

    pub fn error(error: impl fmt::Display) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"ok":false,"error":"unserializable response: {}"}}"#, e)
        })
    }
}
