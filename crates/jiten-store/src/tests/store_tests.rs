use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use crate::{CountTarget, Query, SchemaUpgrade, Store, StoreDefinition, StoreError, UpdateItem};

const TEST_SCHEMA: &[SchemaUpgrade] = &[
    SchemaUpgrade {
        version: 10,
        stores: &[StoreDefinition {
            name: "words",
            indices: &["dictionary", "text"],
        }],
    },
    SchemaUpgrade {
        version: 20,
        stores: &[StoreDefinition {
            name: "labels",
            indices: &["dictionary", "name"],
        }],
    },
];

const VERSION: u64 = 20;

async fn open_store(dir: &TempDir) -> Store {
    let store = Store::new();
    store
        .open(dir.path().join("test.redb"), VERSION, Some(TEST_SCHEMA))
        .await
        .expect("open failed");
    store
}

fn word(dictionary: &str, text: &str) -> serde_json::Value {
    json!({ "dictionary": dictionary, "text": text })
}

#[tokio::test]
async fn open_twice_fails_fast() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let result = store
        .open(dir.path().join("test.redb"), VERSION, Some(TEST_SCHEMA))
        .await;
    assert!(matches!(result, Err(StoreError::AlreadyOpen)));
}

#[tokio::test]
async fn reopening_current_version_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .bulk_add("words", &[word("d1", "apple")], 0, 1)
        .await
        .unwrap();
    store.close().unwrap();
    assert!(!store.is_open());

    // Same version, same history: nothing recreated, nothing lost.
    store
        .open(dir.path().join("test.redb"), VERSION, Some(TEST_SCHEMA))
        .await
        .expect("reopen failed");
    let rows = store
        .get_all("words", Some("text"), Some(&Query::only("apple")))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn upgradeless_open_of_empty_file_reports_corruption() {
    let dir = TempDir::new().unwrap();
    let store = Store::new();
    let result = store
        .open(dir.path().join("empty.redb"), VERSION, None)
        .await;
    assert!(matches!(result, Err(StoreError::Corrupted)));
    assert!(!store.is_open());
}

#[tokio::test]
async fn bulk_add_clamps_to_slice_bounds() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let items = [word("d1", "a"), word("d1", "b"), word("d1", "c")];

    // Count larger than the remaining slice is clamped.
    store.bulk_add("words", &items, 1, 10).await.unwrap();
    let rows = store.get_all("words", None, None).await.unwrap();
    assert_eq!(rows.len(), 2);

    // Start past the end adds nothing.
    store.bulk_add("words", &items, 5, 1).await.unwrap();
    assert_eq!(store.get_all("words", None, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn ids_are_assigned_monotonically_and_never_reused() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let first = store
        .add_with_result("words", word("d1", "a"))
        .await
        .unwrap();
    let second = store
        .add_with_result("words", word("d1", "b"))
        .await
        .unwrap();
    assert!(second > first);

    store.delete("words", second).await.unwrap();
    let third = store
        .add_with_result("words", word("d1", "c"))
        .await
        .unwrap();
    assert!(third > second);
}

#[tokio::test]
async fn point_and_range_queries_agree_on_index_content() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let items = [
        word("d1", "encyclopedia"),
        word("d1", "ency"),
        word("d2", "pedia"),
    ];
    store.bulk_add("words", &items, 0, items.len()).await.unwrap();

    let only = store
        .get_all("words", Some("text"), Some(&Query::only("ency")))
        .await
        .unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].1["text"], "ency");

    let prefixed = store
        .get_all("words", Some("text"), Some(&Query::prefix("ency")))
        .await
        .unwrap();
    assert_eq!(prefixed.len(), 2);

    let keys = store
        .get_all_keys("words", Some("dictionary"), Some(&Query::only("d1")))
        .await
        .unwrap();
    assert_eq!(keys.len(), 2);
}

#[tokio::test]
async fn find_first_walks_in_key_order_with_predicate() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let items = [word("d1", "apple"), word("d2", "apple"), word("d3", "apple")];
    store.bulk_add("words", &items, 0, items.len()).await.unwrap();

    let hit = store
        .find_first("words", Some("text"), Some(&Query::only("apple")), |row| {
            row["dictionary"] == "d2"
        })
        .await
        .unwrap();
    assert_eq!(hit.expect("no row found").1["dictionary"], "d2");

    let miss = store
        .find_first("words", Some("text"), Some(&Query::only("apple")), |row| {
            row["dictionary"] == "d9"
        })
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn bulk_count_results_align_with_request_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let items = [word("d1", "a"), word("d1", "b"), word("d2", "c")];
    store.bulk_add("words", &items, 0, items.len()).await.unwrap();

    let counts = store
        .bulk_count(vec![
            CountTarget {
                store: "words".to_string(),
                index: None,
                query: None,
            },
            CountTarget {
                store: "words".to_string(),
                index: Some("dictionary".to_string()),
                query: Some(Query::only("d1")),
            },
            CountTarget {
                store: "words".to_string(),
                index: Some("dictionary".to_string()),
                query: Some(Query::only("d9")),
            },
            CountTarget {
                store: "labels".to_string(),
                index: None,
                query: None,
            },
        ])
        .await
        .unwrap();
    assert_eq!(counts, vec![3, 2, 0, 0]);
}

#[tokio::test]
async fn bulk_update_overwrites_in_place_and_reindexes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let id = store
        .add_with_result("words", word("d1", "old"))
        .await
        .unwrap();

    store
        .bulk_update(
            "words",
            &[UpdateItem {
                primary_key: Some(id),
                data: word("d1", "new"),
            }],
            0,
            1,
        )
        .await
        .unwrap();

    let old = store
        .get_all("words", Some("text"), Some(&Query::only("old")))
        .await
        .unwrap();
    assert!(old.is_empty());
    let new = store
        .get_all("words", Some("text"), Some(&Query::only("new")))
        .await
        .unwrap();
    assert_eq!(new, vec![(id, word("d1", "new"))]);
}

#[tokio::test]
async fn bulk_delete_filters_keys_and_reports_progress() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let items: Vec<_> = (0..10).map(|i| word("d1", &format!("w{i}"))).collect();
    store.bulk_add("words", &items, 0, items.len()).await.unwrap();

    let discovered = Arc::new(Mutex::new(0usize));
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let discovered_in = Arc::clone(&discovered);
    let ticks_in = Arc::clone(&ticks);

    store
        .bulk_delete(
            "words",
            Some("dictionary"),
            &Query::only("d1"),
            Some(Box::new(move |keys| {
                *discovered_in.lock().unwrap() = keys.len();
                // Keep every other key.
                keys.into_iter().step_by(2).collect()
            })),
            Some(Box::new(move |completed, total| {
                ticks_in.lock().unwrap().push((completed, total));
            })),
        )
        .await
        .unwrap();

    assert_eq!(*discovered.lock().unwrap(), 10);
    assert_eq!(
        *ticks.lock().unwrap(),
        vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );
    let remaining = store
        .get_all("words", Some("dictionary"), Some(&Query::only("d1")))
        .await
        .unwrap();
    assert_eq!(remaining.len(), 5);
}

#[tokio::test]
async fn bulk_delete_removes_index_entries() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let items = [word("d1", "apple"), word("d2", "apple")];
    store.bulk_add("words", &items, 0, items.len()).await.unwrap();

    store
        .bulk_delete("words", Some("dictionary"), &Query::only("d1"), None, None)
        .await
        .unwrap();

    let by_text = store
        .get_all("words", Some("text"), Some(&Query::only("apple")))
        .await
        .unwrap();
    assert_eq!(by_text.len(), 1);
    assert_eq!(by_text[0].1["dictionary"], "d2");
}

#[tokio::test]
async fn operations_fail_cleanly_when_not_open() {
    let store = Store::new();
    let result = store.get_all("words", None, None).await;
    assert!(matches!(result, Err(StoreError::NotOpen)));
}
