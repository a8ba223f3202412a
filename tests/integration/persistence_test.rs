// tests/integration/persistence_test.rs

//! Covers persistence: snapshot round-trip across a simulated restart,
//! corrupt-snapshot fallback to `.bak`, and `destroyDB`.

use objectdb::core::acl::{AclEngine, SubjectAcl};
use objectdb::core::object_store::{ObjectStore, SetOptions};
use objectdb::core::persistence::{BackupConfig, PersistenceHandle};
use objectdb::core::pubsub::PubSubDispatcher;
use objectdb::core::types::{ObjectId, ADMIN_USER};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Builds a standalone `ObjectStore` rooted at `data_dir`, without the file
/// store or façade, for persistence round-trip tests. Returns the store
/// alongside its `PersistenceHandle` so tests can force a synchronous flush
/// instead of waiting out the 5s debounce.
async fn open_store(data_dir: &std::path::Path) -> (Arc<ObjectStore>, Arc<PersistenceHandle>) {
    let acl = Arc::new(AclEngine::new());
    let pubsub = Arc::new(PubSubDispatcher::new());
    let persistence = Arc::new(PersistenceHandle::new(
        data_dir.to_path_buf(),
        BackupConfig { disabled: true, ..BackupConfig::default() },
    ));
    let store = ObjectStore::new(acl, pubsub, persistence.clone());
    store.load_from_disk().await;
    (store, persistence)
}

#[tokio::test]
async fn snapshot_round_trips_across_simulated_restart() {
    let tempdir = TempDir::new().unwrap();
    let (store_a, persistence_a) = open_store(tempdir.path()).await;
    let admin = SubjectAcl::admin(ADMIN_USER);

    for id in ["light.kitchen", "light.bedroom", "sensor.temp"] {
        let id_parsed = ObjectId::parse(id).unwrap();
        store_a
            .set_object(&admin, &id_parsed, json!({"common": {"name": id}}), &SetOptions::default())
            .await
            .unwrap();
    }
    persistence_a.flush(&store_a).await;

    let (store_b, _persistence_b) = open_store(tempdir.path()).await;
    let mut keys_a = store_a.get_keys(&admin, "*").await;
    let mut keys_b = store_b.get_keys(&admin, "*").await;
    keys_a.sort();
    keys_b.sort();
    assert_eq!(keys_a, keys_b);

    for id in &keys_a {
        let parsed = ObjectId::parse(id.clone()).unwrap();
        let obj_a = store_a.get_object(&admin, &parsed).await.unwrap();
        let obj_b = store_b.get_object(&admin, &parsed).await.unwrap();
        assert_eq!(obj_a.map(|o| o.0), obj_b.map(|o| o.0));
    }
}

#[tokio::test]
async fn corrupt_snapshot_falls_back_to_backup() {
    let tempdir = TempDir::new().unwrap();
    let (store_a, persistence_a) = open_store(tempdir.path()).await;
    let admin = SubjectAcl::admin(ADMIN_USER);

    let id = ObjectId::parse("obj.a").unwrap();
    store_a.set_object(&admin, &id, json!({"common": {"name": "first"}}), &SetOptions::default()).await.unwrap();
    persistence_a.flush(&store_a).await;

    // A second write rotates the first snapshot into `.bak`.
    store_a.set_object(&admin, &id, json!({"common": {"name": "second"}}), &SetOptions::default()).await.unwrap();
    persistence_a.flush(&store_a).await;

    // Corrupt the canonical snapshot; `.bak` should still hold "first".
    tokio::fs::write(tempdir.path().join("objects.json"), b"not json").await.unwrap();

    let (store_b, _persistence_b) = open_store(tempdir.path()).await;
    let obj = store_b.get_object(&admin, &id).await.unwrap().unwrap();
    assert_eq!(obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("first"));
}

#[tokio::test]
async fn destroy_db_removes_snapshot_leaving_store_empty_on_restart() {
    let tempdir = TempDir::new().unwrap();
    let (store_a, persistence_a) = open_store(tempdir.path()).await;
    let admin = SubjectAcl::admin(ADMIN_USER);

    let id = ObjectId::parse("obj.a").unwrap();
    store_a.set_object(&admin, &id, json!({"common": {}}), &SetOptions::default()).await.unwrap();
    persistence_a.flush(&store_a).await;

    store_a.destroy_db(&admin).await.unwrap();
    assert!(!tempdir.path().join("objects.json").exists());

    let (store_b, _persistence_b) = open_store(tempdir.path()).await;
    assert!(store_b.get_keys(&admin, "*").await.is_empty());
}

#[tokio::test]
async fn destroy_db_leaves_bak_in_place_for_restart_to_load() {
    let tempdir = TempDir::new().unwrap();
    let (store_a, persistence_a) = open_store(tempdir.path()).await;
    let admin = SubjectAcl::admin(ADMIN_USER);

    let id = ObjectId::parse("obj.a").unwrap();
    store_a.set_object(&admin, &id, json!({"common": {"name": "first"}}), &SetOptions::default()).await.unwrap();
    persistence_a.flush(&store_a).await;

    // A second write rotates the first snapshot into `.bak`.
    store_a.set_object(&admin, &id, json!({"common": {"name": "second"}}), &SetOptions::default()).await.unwrap();
    persistence_a.flush(&store_a).await;
    assert!(tempdir.path().join("objects.json.bak").exists());

    store_a.destroy_db(&admin).await.unwrap();
    assert!(!tempdir.path().join("objects.json").exists());
    assert!(tempdir.path().join("objects.json.bak").exists(), "destroyDB must not remove the .bak");

    let (store_b, _persistence_b) = open_store(tempdir.path()).await;
    let obj = store_b.get_object(&admin, &id).await.unwrap().unwrap();
    assert_eq!(
        obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()),
        Some("first"),
        "restart with no canonical snapshot but a .bak present should load the .bak"
    );
}
