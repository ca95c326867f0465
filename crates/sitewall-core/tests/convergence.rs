use sitewall_core::{
    AddOutcome, BlockEntry, FileStorage, MemoryStorage, RuleStore, RuleSynchronizer, StoreError,
    SyncConfig,
};
use sitewall_network::{DynamicRuleSet, ResourceType, RuleBackend};
use std::collections::HashSet;
use std::sync::Arc;

fn create_store(
    storage: Arc<dyn sitewall_core::KeyValueStore>,
) -> (Arc<DynamicRuleSet>, RuleStore) {
    let backend = Arc::new(DynamicRuleSet::with_defaults());
    let sync = RuleSynchronizer::new(backend.clone(), SyncConfig::default());
    (backend, RuleStore::new(storage, sync))
}

async fn assert_mirrored(backend: &DynamicRuleSet, store: &RuleStore) {
    let rules: Vec<(u32, String)> = backend
        .dynamic_rules()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.condition.url_filter))
        .collect();

    let mut entries: Vec<(u32, String)> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e: BlockEntry| (e.id, e.url_filter))
        .collect();
    entries.sort();

    assert_eq!(rules, entries);
}

#[tokio::test]
async fn test_mixed_sequence_stays_mirrored() {
    let (backend, store) = create_store(Arc::new(MemoryStorage::new()));
    let mut issued = HashSet::new();

    let inputs = [
        "example.org",
        "https://www.news.example.com/today",
        "casino",
        "example.org",
        "   ",
        "www.video.test",
    ];

    for input in inputs {
        match store.add(input).await {
            Ok(AddOutcome::Added(entry)) => assert!(issued.insert(entry.id)),
            Ok(AddOutcome::Duplicate) | Err(StoreError::EmptyInput) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert_mirrored(&backend, &store).await;
    }

    store.remove(2).await.unwrap();
    assert_mirrored(&backend, &store).await;

    for id in [2, 9] {
        assert!(matches!(store.remove(id).await, Err(StoreError::NotFound(n)) if n == id));
        assert_mirrored(&backend, &store).await;
    }

    let outcome = store.add("https://news.example.com/").await.unwrap();
    let AddOutcome::Added(entry) = outcome else {
        panic!("expected a fresh entry");
    };
    assert!(issued.insert(entry.id), "id {} was reused", entry.id);
    assert_eq!(entry.id, 5);
    assert_mirrored(&backend, &store).await;
}

#[tokio::test]
async fn test_startup_reconcile_from_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    {
        let storage = Arc::new(FileStorage::open(&path).await.unwrap());
        let (_, store) = create_store(storage);
        store.add("example.org").await.unwrap();
        store.add("casino").await.unwrap();
        store.remove(1).await.unwrap();
    }

    // Fresh process: empty rule set until startup reconciliation
    let storage = Arc::new(FileStorage::open(&path).await.unwrap());
    let (backend, store) = create_store(storage);
    assert_eq!(backend.rule_count().await, 0);

    store.reconcile().await.unwrap();
    assert_mirrored(&backend, &store).await;

    let hit = backend
        .evaluate("https://online-casino.test/", ResourceType::MainFrame)
        .await;
    assert_eq!(hit.map(|r| r.id), Some(2));

    let next = store.add("example.net").await.unwrap();
    assert!(matches!(next, AddOutcome::Added(ref e) if e.id == 3));
}
