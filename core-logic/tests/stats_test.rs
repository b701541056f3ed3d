use core_logic::{StatsStore, StorageError};
use std::sync::Arc;

const ALICE: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
const BOB: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

fn routers() -> Vec<String> {
    vec!["faroswap".to_string(), "zenith".to_string()]
}

fn store_in(dir: &tempfile::TempDir) -> StatsStore {
    StatsStore::new(dir.path().join("stats.json"), routers())
}

#[tokio::test]
async fn test_init_creates_normalized_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.init(ALICE, "0xAlice").await.unwrap();
    let record = store.get_stats(ALICE).await.unwrap().unwrap();

    assert_eq!(record.address.as_deref(), Some("0xAlice"));
    assert_eq!(record.swaps.total, 0);
    assert_eq!(record.swaps.get("faroswap"), 0);
    assert_eq!(record.target("zenith"), 0);
    assert!(store.get_stats(BOB).await.unwrap().is_none());
}

#[tokio::test]
async fn test_init_keeps_existing_address() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.init(ALICE, "0xFirst").await.unwrap();
    store.init(ALICE, "0xSecond").await.unwrap();

    let record = store.get_stats(ALICE).await.unwrap().unwrap();
    assert_eq!(record.address.as_deref(), Some("0xFirst"));
}

#[tokio::test]
async fn test_ensure_targets_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let first = store.ensure_targets(ALICE, 80, 137).await.unwrap();
    for router in routers() {
        let target = first[&router];
        assert!((80..=137).contains(&target), "{} out of range", target);
    }

    let second = store.ensure_targets(ALICE, 1, 2).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_targets_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let targets = store_in(&dir).ensure_targets(ALICE, 5, 9).await.unwrap();

    let reopened = store_in(&dir);
    let record = reopened.get_stats(ALICE).await.unwrap().unwrap();
    assert_eq!(record.targets, targets);
}

#[tokio::test]
async fn test_record_swap_updates_total_and_router() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.record_swap(ALICE, "FaroSwap").await.unwrap();
    let record = store.record_swap(ALICE, "zenith").await.unwrap();

    assert_eq!(record.swaps.total, 2);
    assert_eq!(record.swaps.get("faroswap"), 1);
    assert_eq!(record.swaps.get("zenith"), 1);
}

#[tokio::test]
async fn test_unknown_router_only_counts_total() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let record = store.record_swap(ALICE, "mystery").await.unwrap();

    assert_eq!(record.swaps.total, 1);
    assert_eq!(record.swaps.get("faroswap"), 0);
    assert_eq!(record.swaps.get("zenith"), 0);
    assert_eq!(record.swaps.get("mystery"), 0);
}

#[tokio::test]
async fn test_concurrent_record_swaps_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_in(&dir));

    let mut handles = Vec::new();
    for i in 0..24 {
        let store = store.clone();
        let identity = if i % 2 == 0 { ALICE } else { BOB };
        let router = if i % 3 == 0 { "faroswap" } else { "zenith" };
        handles.push(tokio::spawn(async move {
            store.record_swap(identity, router).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let alice = store.get_stats(ALICE).await.unwrap().unwrap();
    let bob = store.get_stats(BOB).await.unwrap().unwrap();
    assert_eq!(alice.swaps.total, 12);
    assert_eq!(bob.swaps.total, 12);
    assert_eq!(
        alice.swaps.get("faroswap")
            + alice.swaps.get("zenith")
            + bob.swaps.get("faroswap")
            + bob.swaps.get("zenith"),
        24
    );
}

#[tokio::test]
async fn test_deficit_and_targets_met() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.ensure_targets(ALICE, 1, 1).await.unwrap();
    store.record_swap(ALICE, "faroswap").await.unwrap();

    let record = store.get_stats(ALICE).await.unwrap().unwrap();
    assert_eq!(record.deficit("faroswap"), 0);
    assert_eq!(record.deficit("zenith"), 1);
    assert!(!record.targets_met(&routers()));

    let record = store.record_swap(ALICE, "zenith").await.unwrap();
    assert!(record.targets_met(&routers()));
}

#[tokio::test]
async fn test_transfers_and_liquidity_counters() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    store.record_transfer(ALICE).await.unwrap();
    store.record_liquidity_add(ALICE, "ZENITH").await.unwrap();

    let record = store.get_stats(ALICE).await.unwrap().unwrap();
    assert_eq!(record.transfers, 1);
    assert_eq!(record.liquidity_adds.total, 1);
    assert_eq!(record.liquidity_adds.get("zenith"), 1);
    assert_eq!(record.swaps.total, 0);
}

#[tokio::test]
async fn test_document_layout_is_camel_case_and_flat() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.record_swap(ALICE, "zenith").await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let record = &doc[ALICE];

    assert!(record.get("lastUpdatedAt").is_some());
    assert!(record.get("liquidityAdds").is_some());
    assert_eq!(record["swaps"]["total"], 1);
    assert_eq!(record["swaps"]["zenith"], 1);
}

#[tokio::test]
async fn test_corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    std::fs::write(store.path(), "{ not json").unwrap();

    let err = store.record_swap(ALICE, "zenith").await.unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }));

    // The broken file is left alone
    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert_eq!(raw, "{ not json");
}
