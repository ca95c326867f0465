//! Block entries and their persisted layout.

use crate::storage::{KeyValueStore, StorageError, StorageItems};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage key holding the entry list
pub const ENTRIES_KEY: &str = "blockedRules";
/// Storage key holding the next id counter
pub const NEXT_ID_KEY: &str = "nextRuleId";

/// First id handed out by an empty store
pub const FIRST_ID: u32 = 1;

/// One blocked site, as the user entered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEntry {
    /// Also the id of the matching dynamic rule
    pub id: u32,
    /// Trimmed user input, for display
    #[serde(rename = "input", alias = "originalInput")]
    pub original_input: String,
    pub url_filter: String,
}

/// Snapshot of everything the rule store persists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStoreState {
    pub entries: Vec<BlockEntry>,
    pub next_id: u32,
}

impl Default for RuleStoreState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: FIRST_ID,
        }
    }
}

impl RuleStoreState {
    /// Read the state, filling in defaults for missing keys
    pub async fn load(storage: &dyn KeyValueStore) -> Result<Self, StorageError> {
        let mut items = storage.get(&[ENTRIES_KEY, NEXT_ID_KEY]).await?;
        let entries = decode_entries(items.remove(ENTRIES_KEY))?;
        let stored_next = decode_next_id(items.remove(NEXT_ID_KEY))?;

        // Never hand out an id that is still in use, even if the counter was lost
        let floor = entries
            .iter()
            .map(|e| e.id.saturating_add(1))
            .max()
            .unwrap_or(FIRST_ID);

        Ok(Self {
            entries,
            next_id: stored_next.max(floor),
        })
    }

    /// Write entries and the counter together
    pub async fn persist(&self, storage: &dyn KeyValueStore) -> Result<(), StorageError> {
        let mut items = entries_item(&self.entries)?;
        items.insert(NEXT_ID_KEY.to_string(), Value::from(self.next_id));
        storage.set(items).await
    }

    /// Write the entry list only; the counter is left untouched
    pub async fn persist_entries(&self, storage: &dyn KeyValueStore) -> Result<(), StorageError> {
        storage.set(entries_item(&self.entries)?).await
    }
}

/// Read only the entry list (the fallback path never touches the counter)
pub async fn load_entries(storage: &dyn KeyValueStore) -> Result<Vec<BlockEntry>, StorageError> {
    let mut items = storage.get(&[ENTRIES_KEY]).await?;
    decode_entries(items.remove(ENTRIES_KEY))
}

fn entries_item(entries: &[BlockEntry]) -> Result<StorageItems, StorageError> {
    let value = serde_json::to_value(entries).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    let mut items = StorageItems::new();
    items.insert(ENTRIES_KEY.to_string(), value);
    Ok(items)
}

fn decode_entries(value: Option<Value>) -> Result<Vec<BlockEntry>, StorageError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| StorageError::Corrupt(format!("{}: {}", ENTRIES_KEY, e))),
    }
}

fn decode_next_id(value: Option<Value>) -> Result<u32, StorageError> {
    match value {
        None | Some(Value::Null) => Ok(FIRST_ID),
        Some(value) => {
            let id: u32 = serde_json::from_value(value)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", NEXT_ID_KEY, e)))?;
            Ok(id.max(FIRST_ID))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn entry(id: u32, filter: &str) -> BlockEntry {
        BlockEntry {
            id,
            original_input: filter.to_string(),
            url_filter: filter.to_string(),
        }
    }

    #[test]
    fn test_entry_wire_format() {
        let value = serde_json::to_value(entry(3, "||example.org^")).unwrap();
        assert_eq!(
            value,
            json!({ "id": 3, "input": "||example.org^", "urlFilter": "||example.org^" })
        );

        let parsed: BlockEntry = serde_json::from_value(
            json!({ "id": 4, "originalInput": "example.net", "urlFilter": "||example.net^" }),
        )
        .unwrap();
        assert_eq!(parsed.original_input, "example.net");
    }

    #[tokio::test]
    async fn test_load_defaults() {
        let storage = MemoryStorage::new();
        let state = RuleStoreState::load(&storage).await.unwrap();
        assert_eq!(state, RuleStoreState::default());
        assert_eq!(state.next_id, 1);
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let storage = MemoryStorage::new();
        let state = RuleStoreState {
            entries: vec![entry(1, "a"), entry(4, "b")],
            next_id: 7,
        };
        state.persist(&storage).await.unwrap();

        assert_eq!(RuleStoreState::load(&storage).await.unwrap(), state);
        assert_eq!(load_entries(&storage).await.unwrap(), state.entries);
    }

    #[tokio::test]
    async fn test_counter_never_below_live_ids() {
        let storage = MemoryStorage::with_items(json!({
            "blockedRules": [{ "id": 9, "input": "x", "urlFilter": "x" }],
            "nextRuleId": 2,
        }));
        let state = RuleStoreState::load(&storage).await.unwrap();
        assert_eq!(state.next_id, 10);
    }

    #[tokio::test]
    async fn test_null_and_zero_use_defaults() {
        let storage = MemoryStorage::with_items(json!({
            "blockedRules": null,
            "nextRuleId": 0,
        }));
        let state = RuleStoreState::load(&storage).await.unwrap();
        assert!(state.entries.is_empty());
        assert_eq!(state.next_id, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entries() {
        let storage = MemoryStorage::with_items(json!({ "blockedRules": "oops" }));
        assert!(matches!(
            load_entries(&storage).await,
            Err(StorageError::Corrupt(_))
        ));
    }
}
