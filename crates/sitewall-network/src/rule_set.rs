//! Dynamic Rule Set
//!
//! In-process implementation of the declarative blocking mechanism.
//! Rules are installed and removed in atomic batches; navigation requests
//! are evaluated against them without the caller inspecting each rule.
//!
//! Flow:
//! 1. Update comes in → whole batch validated against the resulting set
//! 2. Index rebuilt (domain suffix map + substring automaton)
//! 3. Request evaluated → highest-priority matching rule, if any

use crate::filter::{FilterKind, UrlFilter};
use crate::rule::{ResourceType, Rule, RuleActionType, RuleUpdate};
use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Browser cap on dynamic rules with redirect actions
pub const MAX_DYNAMIC_RULES: usize = 5000;

/// Errors reported by a rule backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleSetError {
    #[error("Rule id must be a positive integer")]
    InvalidId,

    #[error("Rule with id {0} already exists")]
    DuplicateId(u32),

    #[error("Invalid rule {id}: {reason}")]
    InvalidRule { id: u32, reason: String },

    #[error("Dynamic rule limit exceeded: {count} > {max}")]
    LimitExceeded { count: usize, max: usize },

    #[error("Failed to index rules: {0}")]
    Index(String),

    #[error("Rule backend unavailable: {0}")]
    Unavailable(String),
}

/// The declarative blocking mechanism, as seen by the synchronizer.
#[async_trait]
pub trait RuleBackend: Send + Sync {
    /// All currently installed rules
    async fn dynamic_rules(&self) -> Result<Vec<Rule>, RuleSetError>;

    /// Apply removals then additions atomically; nothing changes on error
    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuleSetError>;
}

/// Configuration for the dynamic rule set
#[derive(Debug, Clone)]
pub struct RuleSetConfig {
    /// Maximum number of installed rules
    pub max_rules: usize,
}

impl Default for RuleSetConfig {
    fn default() -> Self {
        Self {
            max_rules: MAX_DYNAMIC_RULES,
        }
    }
}

/// Evaluation statistics
#[derive(Debug, Default)]
pub struct RuleSetStats {
    pub total_requests: AtomicU64,
    pub matched_requests: AtomicU64,
}

/// Lookup structures derived from the installed rules
struct RuleIndex {
    rules: BTreeMap<u32, Rule>,
    /// Lowercased domain -> ids of `||domain^` rules
    domains: HashMap<String, Vec<u32>>,
    /// Automaton over all substring filters
    substrings: Option<AhoCorasick>,
    /// Pattern index in `substrings` -> rule id
    substring_ids: Vec<u32>,
}

impl RuleIndex {
    fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
            domains: HashMap::new(),
            substrings: None,
            substring_ids: Vec::new(),
        }
    }

    fn build(rules: BTreeMap<u32, Rule>) -> Result<Self, RuleSetError> {
        let mut domains: HashMap<String, Vec<u32>> = HashMap::new();
        let mut patterns = Vec::new();
        let mut substring_ids = Vec::new();

        for rule in rules.values() {
            let filter = UrlFilter::parse(rule.url_filter());
            match filter.kind() {
                FilterKind::Domain => {
                    domains
                        .entry(filter.pattern().to_string())
                        .or_default()
                        .push(rule.id);
                }
                FilterKind::Substring => {
                    patterns.push(filter.pattern().to_string());
                    substring_ids.push(rule.id);
                }
            }
        }

        // Overlapping search needs standard match semantics
        let substrings = if patterns.is_empty() {
            None
        } else {
            let automaton = AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .match_kind(MatchKind::Standard)
                .build(&patterns)
                .map_err(|e| RuleSetError::Index(e.to_string()))?;
            Some(automaton)
        };

        Ok(Self {
            rules,
            domains,
            substrings,
            substring_ids,
        })
    }

    /// Ids of every rule whose filter matches, in no particular order
    fn candidates(&self, url: &str, host: Option<&str>) -> Vec<u32> {
        let mut ids = Vec::new();

        // Iterative suffix walk: sub.example.org -> example.org -> org
        if let Some(host) = host {
            let mut part = host.trim_end_matches('.');
            loop {
                if let Some(found) = self.domains.get(part) {
                    ids.extend_from_slice(found);
                }
                match part.find('.') {
                    Some(idx) => {
                        part = &part[idx + 1..];
                        if part.is_empty() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        if let Some(ref automaton) = self.substrings {
            for found in automaton.find_overlapping_iter(url) {
                ids.push(self.substring_ids[found.pattern().as_usize()]);
            }
        }

        ids
    }
}

/// Dynamic rule set with atomic batch updates
pub struct DynamicRuleSet {
    config: RuleSetConfig,
    index: RwLock<RuleIndex>,
    stats: RuleSetStats,
}

impl DynamicRuleSet {
    /// Create an empty rule set
    pub fn new(config: RuleSetConfig) -> Self {
        Self {
            config,
            index: RwLock::new(RuleIndex::empty()),
            stats: RuleSetStats::default(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RuleSetConfig::default())
    }

    /// Number of installed rules
    pub async fn rule_count(&self) -> usize {
        self.index.read().await.rules.len()
    }

    /// Evaluate a request against the installed rules.
    ///
    /// Returns the winning rule: highest priority, ties broken by lowest id.
    pub async fn evaluate(&self, url: &str, resource_type: ResourceType) -> Option<Rule> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        let parsed = Url::parse(url).ok();
        let host = parsed
            .as_ref()
            .and_then(|u| u.host_str())
            .map(|h| h.to_ascii_lowercase());
        let haystack = parsed.as_ref().map_or(url, |u| u.as_str());

        let index = self.index.read().await;
        let winner = index
            .candidates(haystack, host.as_deref())
            .into_iter()
            .filter_map(|id| index.rules.get(&id))
            .filter(|rule| rule.applies_to(resource_type))
            .max_by_key(|rule| (rule.priority, Reverse(rule.id)))
            .cloned();

        if let Some(ref rule) = winner {
            self.stats.matched_requests.fetch_add(1, Ordering::Relaxed);
            debug!("Rule {} ('{}') matched {}", rule.id, rule.url_filter(), url);
        }

        winner
    }

    /// Get statistics: (total requests, matched requests)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.total_requests.load(Ordering::Relaxed),
            self.stats.matched_requests.load(Ordering::Relaxed),
        )
    }

    fn validate_rule(rule: &Rule) -> Result<(), RuleSetError> {
        let invalid = |reason: &str| RuleSetError::InvalidRule {
            id: rule.id,
            reason: reason.to_string(),
        };

        if rule.id == 0 {
            return Err(RuleSetError::InvalidId);
        }
        if rule.url_filter().is_empty() {
            return Err(invalid("urlFilter must not be empty"));
        }
        if !rule.url_filter().is_ascii() {
            return Err(invalid("urlFilter must only contain ASCII characters"));
        }
        if rule.condition.resource_types.is_empty() {
            return Err(invalid("resourceTypes must not be empty"));
        }
        if rule.action.kind == RuleActionType::Redirect {
            let Some(ref redirect) = rule.action.redirect else {
                return Err(invalid("redirect action requires a redirect target"));
            };
            match (&redirect.extension_path, &redirect.url) {
                (Some(path), _) if !path.starts_with('/') => {
                    return Err(invalid("extensionPath must start with '/'"));
                }
                (None, None) => {
                    return Err(invalid("redirect target needs extensionPath or url"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        current: &BTreeMap<u32, Rule>,
        update: RuleUpdate,
    ) -> Result<BTreeMap<u32, Rule>, RuleSetError> {
        let mut rules = current.clone();
        for id in &update.remove_rule_ids {
            rules.remove(id);
        }

        let mut added = HashSet::new();
        for rule in update.add_rules {
            Self::validate_rule(&rule)?;
            if !added.insert(rule.id) || rules.contains_key(&rule.id) {
                return Err(RuleSetError::DuplicateId(rule.id));
            }
            rules.insert(rule.id, rule);
        }

        if rules.len() > self.config.max_rules {
            return Err(RuleSetError::LimitExceeded {
                count: rules.len(),
                max: self.config.max_rules,
            });
        }
        Ok(rules)
    }
}

impl Default for DynamicRuleSet {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl RuleBackend for DynamicRuleSet {
    async fn dynamic_rules(&self) -> Result<Vec<Rule>, RuleSetError> {
        Ok(self.index.read().await.rules.values().cloned().collect())
    }

    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<(), RuleSetError> {
        let removed = update.remove_rule_ids.len();
        let added = update.add_rules.len();

        let mut index = self.index.write().await;
        let rules = match self.apply(&index.rules, update) {
            Ok(rules) => rules,
            Err(e) => {
                warn!("Rejected dynamic rule update: {}", e);
                return Err(e);
            }
        };
        *index = RuleIndex::build(rules)?;

        info!(
            "Dynamic rules updated: -{} +{} ({} installed, {} domain keys)",
            removed,
            added,
            index.rules.len(),
            index.domains.len()
        );
        Ok(())
    }
}
