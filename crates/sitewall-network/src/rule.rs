//! Declarative rule definitions.
//!
//! Serialized the same way the browser's declarative request API spells
//! them, so a rule list can be handed to a real host unchanged.

use serde::{Deserialize, Serialize};

/// Type of resource being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level document
    MainFrame,
    /// Nested document (iframe)
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Xmlhttprequest,
    Media,
    Websocket,
    Other,
}

impl ResourceType {
    /// Page loads only: the resource types every block rule applies to
    pub const PAGE_LOADS: [ResourceType; 2] = [ResourceType::MainFrame, ResourceType::SubFrame];
}

/// What a rule does when it matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionType {
    Block,
    Redirect,
    Allow,
}

/// Redirect target
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    /// Path inside the extension package, e.g. `/blocked.html`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_path: Option<String>,
    /// Absolute redirect URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: RuleActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

impl RuleAction {
    /// Redirect to a resource bundled with the extension
    pub fn redirect_to_extension_path(path: &str) -> Self {
        Self {
            kind: RuleActionType::Redirect,
            redirect: Some(Redirect {
                extension_path: Some(path.to_string()),
                url: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// A single dynamic rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    /// Rule redirecting page loads matching `url_filter` to an extension page
    pub fn page_redirect(id: u32, priority: u32, url_filter: &str, extension_path: &str) -> Self {
        Self {
            id,
            priority,
            action: RuleAction::redirect_to_extension_path(extension_path),
            condition: RuleCondition {
                url_filter: url_filter.to_string(),
                resource_types: ResourceType::PAGE_LOADS.to_vec(),
            },
        }
    }

    pub fn url_filter(&self) -> &str {
        &self.condition.url_filter
    }

    pub fn applies_to(&self, resource_type: ResourceType) -> bool {
        self.condition.resource_types.contains(&resource_type)
    }
}

/// One atomic change to the dynamic rule set.
///
/// Removals are applied before additions, so a rule can be replaced by
/// listing its id in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    #[serde(default)]
    pub remove_rule_ids: Vec<u32>,
    #[serde(default)]
    pub add_rules: Vec<Rule>,
}

impl RuleUpdate {
    pub fn add(rule: Rule) -> Self {
        Self {
            remove_rule_ids: Vec::new(),
            add_rules: vec![rule],
        }
    }

    pub fn remove(id: u32) -> Self {
        Self {
            remove_rule_ids: vec![id],
            add_rules: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remove_rule_ids.is_empty() && self.add_rules.is_empty()
    }
}
