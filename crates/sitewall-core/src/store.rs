//! Rule Store
//!
//! Owns the persisted entry list and id counter. All mutation goes through
//! [`RuleStore::add`] and [`RuleStore::remove`], which keep the dynamic rule
//! set in step with storage:
//!
//! - add: rule installed first, then entry persisted (rule removed again if
//!   persisting fails)
//! - remove: rule removed first, then entry dropped (rule re-installed if
//!   persisting fails)

use crate::entry::{BlockEntry, RuleStoreState};
use crate::normalize::normalize;
use crate::storage::{KeyValueStore, StorageError};
use crate::sync::RuleSynchronizer;
use sitewall_network::RuleSetError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Rule store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Empty input")]
    EmptyInput,

    #[error("Not found: {0}")]
    NotFound(u32),

    #[error("Rule ids exhausted")]
    IdsExhausted,

    #[error("Synchronization failure: {0}")]
    SynchronizationFailure(#[from] RuleSetError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of a successful add
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(BlockEntry),
    /// An entry with the same url filter already exists; nothing changed
    Duplicate,
}

pub struct RuleStore {
    storage: Arc<dyn KeyValueStore>,
    sync: RuleSynchronizer,
    /// Held across every read-modify-write of the persisted state
    lock: Mutex<()>,
}

impl RuleStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, sync: RuleSynchronizer) -> Self {
        Self {
            storage,
            sync,
            lock: Mutex::new(()),
        }
    }

    pub fn synchronizer(&self) -> &RuleSynchronizer {
        &self.sync
    }

    /// Current entries in display order
    pub async fn list(&self) -> Result<Vec<BlockEntry>, StoreError> {
        Ok(RuleStoreState::load(self.storage.as_ref()).await?.entries)
    }

    /// Block whatever `input` normalizes to.
    ///
    /// Two inputs with the same derived filter collapse into the first entry.
    pub async fn add(&self, input: &str) -> Result<AddOutcome, StoreError> {
        let url_filter = normalize(input).ok_or(StoreError::EmptyInput)?;

        let _guard = self.lock.lock().await;
        let mut state = RuleStoreState::load(self.storage.as_ref()).await?;

        if state.entries.iter().any(|e| e.url_filter == url_filter) {
            debug!("Filter '{}' already blocked", url_filter);
            return Ok(AddOutcome::Duplicate);
        }

        // The counter must be able to move past the id handed out
        let next_id = state
            .next_id
            .checked_add(1)
            .ok_or(StoreError::IdsExhausted)?;
        let entry = BlockEntry {
            id: state.next_id,
            original_input: input.trim().to_string(),
            url_filter,
        };

        self.sync.add_rule(&entry).await?;

        state.entries.push(entry.clone());
        state.next_id = next_id;

        if let Err(e) = state.persist(self.storage.as_ref()).await {
            warn!("Persisting entry {} failed, removing its rule: {}", entry.id, e);
            if let Err(rollback) = self.sync.remove_rule(entry.id).await {
                warn!("Rule {} left installed: {}", entry.id, rollback);
            }
            return Err(e.into());
        }

        info!(
            "Blocked '{}' as {} (id {})",
            entry.original_input, entry.url_filter, entry.id
        );
        Ok(AddOutcome::Added(entry))
    }

    /// Unblock the entry with `id`
    pub async fn remove(&self, id: u32) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut state = RuleStoreState::load(self.storage.as_ref()).await?;

        let idx = state
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))?;

        self.sync.remove_rule(id).await?;
        let entry = state.entries.remove(idx);

        if let Err(e) = state.persist_entries(self.storage.as_ref()).await {
            warn!("Persisting removal of {} failed, restoring its rule: {}", id, e);
            if let Err(rollback) = self.sync.add_rule(&entry).await {
                warn!("Rule {} left removed: {}", id, rollback);
            }
            return Err(e.into());
        }

        info!("Unblocked '{}' (id {})", entry.url_filter, id);
        Ok(())
    }

    /// Rebuild the whole dynamic rule set from storage
    pub async fn reconcile(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let state = RuleStoreState::load(self.storage.as_ref()).await?;
        self.sync.reconcile_all(&state.entries).await?;
        Ok(())
    }
}
