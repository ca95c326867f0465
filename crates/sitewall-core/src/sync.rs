//! Network Rule Synchronizer
//!
//! Keeps the declarative rule set in one-to-one correspondence with the
//! stored entries: rule id == entry id, rule filter == entry filter.
//!
//! - `reconcile_all` is the self-healing path, run at install/startup:
//!   every active rule is dropped and the full set is rebuilt in one update.
//! - `add_rule` / `remove_rule` are the incremental paths used by the store.

use crate::entry::BlockEntry;
use sitewall_network::{Rule, RuleBackend, RuleSetError, RuleUpdate};
use std::sync::Arc;
use tracing::{debug, info};

/// Priority shared by every block rule
pub const DEFAULT_RULE_PRIORITY: u32 = 1;

/// Extension page that blocked navigations land on
pub const BLOCKED_PAGE_PATH: &str = "/blocked.html";

/// How entries are projected onto rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub priority: u32,
    /// Extension path of the blocked page
    pub blocked_page: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_RULE_PRIORITY,
            blocked_page: BLOCKED_PAGE_PATH.to_string(),
        }
    }
}

pub struct RuleSynchronizer {
    backend: Arc<dyn RuleBackend>,
    config: SyncConfig,
}

impl RuleSynchronizer {
    pub fn new(backend: Arc<dyn RuleBackend>, config: SyncConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn RuleBackend> {
        &self.backend
    }

    /// The rule an entry is projected onto
    pub fn build_rule(&self, entry: &BlockEntry) -> Rule {
        Rule::page_redirect(
            entry.id,
            self.config.priority,
            &entry.url_filter,
            &self.config.blocked_page,
        )
    }

    /// Replace every active rule with freshly built rules for `entries`
    pub async fn reconcile_all(&self, entries: &[BlockEntry]) -> Result<(), RuleSetError> {
        let existing = self.backend.dynamic_rules().await?;
        let update = RuleUpdate {
            remove_rule_ids: existing.iter().map(|r| r.id).collect(),
            add_rules: entries.iter().map(|e| self.build_rule(e)).collect(),
        };

        self.backend.update_dynamic_rules(update).await?;

        info!(
            "Reconciled dynamic rules: dropped {}, installed {}",
            existing.len(),
            entries.len()
        );
        Ok(())
    }

    /// Install the rule for a single new entry
    pub async fn add_rule(&self, entry: &BlockEntry) -> Result<(), RuleSetError> {
        debug!("Installing rule {} for '{}'", entry.id, entry.url_filter);
        self.backend
            .update_dynamic_rules(RuleUpdate::add(self.build_rule(entry)))
            .await
    }

    /// Remove the rule of a single entry
    pub async fn remove_rule(&self, id: u32) -> Result<(), RuleSetError> {
        debug!("Removing rule {}", id);
        self.backend
            .update_dynamic_rules(RuleUpdate::remove(id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitewall_network::{DynamicRuleSet, ResourceType};

    fn entry(id: u32, filter: &str) -> BlockEntry {
        BlockEntry {
            id,
            original_input: filter.to_string(),
            url_filter: filter.to_string(),
        }
    }

    fn create_synchronizer() -> (Arc<DynamicRuleSet>, RuleSynchronizer) {
        let backend = Arc::new(DynamicRuleSet::with_defaults());
        let sync = RuleSynchronizer::new(backend.clone(), SyncConfig::default());
        (backend, sync)
    }

    #[test]
    fn test_build_rule() {
        let (_, sync) = create_synchronizer();
        let rule = sync.build_rule(&entry(4, "||example.org^"));

        assert_eq!(rule.id, 4);
        assert_eq!(rule.priority, DEFAULT_RULE_PRIORITY);
        assert_eq!(rule.url_filter(), "||example.org^");
        assert_eq!(rule.condition.resource_types, ResourceType::PAGE_LOADS.to_vec());
        assert_eq!(
            rule.action
                .redirect
                .as_ref()
                .and_then(|r| r.extension_path.as_deref()),
            Some("/blocked.html")
        );
    }

    #[tokio::test]
    async fn test_reconcile_replaces_stale_rules() {
        let (backend, sync) = create_synchronizer();

        // Stale state: an orphan and a rule with the wrong filter
        backend
            .update_dynamic_rules(RuleUpdate {
                remove_rule_ids: vec![],
                add_rules: vec![
                    sync.build_rule(&entry(1, "old")),
                    sync.build_rule(&entry(42, "orphan")),
                ],
            })
            .await
            .unwrap();

        let entries = vec![entry(1, "||example.org^"), entry(2, "casino")];
        sync.reconcile_all(&entries).await.unwrap();

        let rules = backend.dynamic_rules().await.unwrap();
        let expected: Vec<_> = entries.iter().map(|e| sync.build_rule(e)).collect();
        assert_eq!(rules, expected);
    }

    #[tokio::test]
    async fn test_reconcile_empty() {
        let (backend, sync) = create_synchronizer();
        sync.add_rule(&entry(3, "x")).await.unwrap();

        sync.reconcile_all(&[]).await.unwrap();
        assert_eq!(backend.rule_count().await, 0);
    }

    #[tokio::test]
    async fn test_incremental_add_remove() {
        let (backend, sync) = create_synchronizer();

        sync.add_rule(&entry(1, "||example.org^")).await.unwrap();
        assert_eq!(backend.rule_count().await, 1);
        assert!(matches!(
            sync.add_rule(&entry(1, "again")).await,
            Err(RuleSetError::DuplicateId(1))
        ));

        sync.remove_rule(1).await.unwrap();
        assert_eq!(backend.rule_count().await, 0);
    }
}
