// tests/integration/object_store_test.rs

use crate::integration::test_helpers::TestContext;
use objectdb::core::errors::CoreError;
use objectdb::core::object_store::SetOptions;
use objectdb::core::types::ADMIN_USER;
use serde_json::json;

#[tokio::test]
async fn set_and_get_round_trip() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"type": "state", "common": {"name": "Kitchen"}}), SetOptions::default())
        .await
        .unwrap();

    let obj = ctx.facade.get_object(ADMIN_USER, "light.kitchen").await.unwrap().unwrap();
    assert_eq!(obj.0.get("_id").and_then(|v| v.as_str()), Some("light.kitchen"));
    assert_eq!(obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("Kitchen"));
}

#[tokio::test]
async fn set_object_rejects_null_body() {
    let ctx = TestContext::new().await;
    let err = ctx
        .facade
        .set_object(ADMIN_USER, "x", json!(null), SetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ObjNull));
}

#[tokio::test]
async fn get_keys_matches_glob_pattern() {
    let ctx = TestContext::new().await;
    for id in ["light.kitchen", "light.bedroom", "sensor.temp"] {
        ctx.facade.set_object(ADMIN_USER, id, json!({"type": "state"}), SetOptions::default()).await.unwrap();
    }

    let mut keys = ctx.facade.get_keys(ADMIN_USER, "light.*").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["light.bedroom".to_string(), "light.kitchen".to_string()]);
}

#[tokio::test]
async fn extend_object_deep_merges_and_creates_if_missing() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "obj.a", json!({"common": {"name": "A", "role": "sensor"}}), SetOptions::default())
        .await
        .unwrap();

    let merged = ctx
        .facade
        .extend_object(ADMIN_USER, "obj.a", json!({"common": {"role": "actuator"}}), None)
        .await
        .unwrap();
    assert_eq!(merged.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("A"));
    assert_eq!(merged.0.get("common").and_then(|c| c.get("role")).and_then(|v| v.as_str()), Some("actuator"));

    let created = ctx.facade.extend_object(ADMIN_USER, "obj.b", json!({"common": {"name": "B"}}), None).await.unwrap();
    assert_eq!(created.id(), Some("obj.b"));
}

#[tokio::test]
async fn del_object_rejects_dont_delete() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "obj.locked", json!({"common": {"dontDelete": true}}), SetOptions::default())
        .await
        .unwrap();

    let err = ctx.facade.del_object(ADMIN_USER, "obj.locked").await.unwrap_err();
    assert!(matches!(err, CoreError::NonDeletable));

    let err = ctx.facade.del_object(ADMIN_USER, "obj.nonexistent").await.unwrap_err();
    assert!(matches!(err, CoreError::NotExists));
}

#[tokio::test]
async fn chown_and_chmod_object_update_acl() {
    let ctx = TestContext::new().await;
    ctx.facade.set_object(ADMIN_USER, "obj.a", json!({"common": {}}), SetOptions::default()).await.unwrap();
    ctx.facade.set_object(ADMIN_USER, "obj.b", json!({"common": {}}), SetOptions::default()).await.unwrap();

    let chowned = ctx.facade.chown_object(ADMIN_USER, "obj.*", "system.user.alice", "system.group.ops").await.unwrap();
    assert_eq!(chowned.len(), 2);

    let obj = ctx.facade.get_object(ADMIN_USER, "obj.a").await.unwrap().unwrap();
    let acl = obj.acl().unwrap();
    assert_eq!(acl.owner.as_deref(), Some("system.user.alice"));
    assert_eq!(acl.owner_group.as_deref(), Some("system.group.ops"));

    use objectdb::core::types::PermissionBits;
    let bits = PermissionBits::USER_READ | PermissionBits::USER_WRITE;
    let chmoded = ctx.facade.chmod_object(ADMIN_USER, "obj.*", Some(bits), None).await.unwrap();
    assert_eq!(chmoded.len(), 2);
    let obj = ctx.facade.get_object(ADMIN_USER, "obj.a").await.unwrap().unwrap();
    assert_eq!(obj.acl().unwrap().object, Some(bits));
}

#[tokio::test]
async fn find_object_by_common_name() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "device.1", json!({"type": "device", "common": {"name": "Thermostat"}}), SetOptions::default())
        .await
        .unwrap();

    let found = ctx.facade.find_object(ADMIN_USER, "Thermostat", None).await.unwrap();
    assert_eq!(found.as_deref(), Some("device.1"));

    let found_by_id = ctx.facade.find_object(ADMIN_USER, "device.1", None).await.unwrap();
    assert_eq!(found_by_id.as_deref(), Some("device.1"));

    let missing = ctx.facade.find_object(ADMIN_USER, "nope", None).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn get_object_list_excludes_underscore_ids_unless_include_docs() {
    let ctx = TestContext::new().await;
    ctx.facade.set_object(ADMIN_USER, "visible.a", json!({}), SetOptions::default()).await.unwrap();
    ctx.facade.set_object(ADMIN_USER, "_design/hidden", json!({}), SetOptions::default()).await.unwrap();

    let without_docs = ctx.facade.get_object_list(ADMIN_USER, None, None, false).await.unwrap();
    assert!(without_docs.iter().all(|row| !row.id.starts_with('_')));

    let with_docs = ctx.facade.get_object_list(ADMIN_USER, None, None, true).await.unwrap();
    assert!(with_docs.iter().any(|row| row.id == "_design/hidden"));
}

#[tokio::test]
async fn preserve_settings_keeps_old_value_when_new_key_absent() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "obj.x", json!({"common": {"name": "first"}}), SetOptions::default())
        .await
        .unwrap();

    let options = SetOptions {
        preserve_settings: vec!["common.name".to_string()],
        ..Default::default()
    };
    ctx.facade.set_object(ADMIN_USER, "obj.x", json!({"common": {}}), options).await.unwrap();

    let obj = ctx.facade.get_object(ADMIN_USER, "obj.x").await.unwrap().unwrap();
    assert_eq!(obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("first"));
}
