// tests/integration/view_test.rs

//! Covers the view executor: `applyView`'s restricted map/reduce grammar
//! (emit, if-guards, `===`, `_stats` reduce) and `getObjectView`'s
//! design-document lookup, including the unknown design/search 404 case.

use objectdb::core::errors::CoreError;
use objectdb::core::object_store::SetOptions;
use objectdb::core::types::ADMIN_USER;
use objectdb::core::view::ViewSpec;
use serde_json::json;

use crate::integration::test_helpers::TestContext;

#[tokio::test]
async fn apply_view_emits_matching_documents_only() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"type": "state", "common": {"name": "Kitchen"}}), SetOptions::default())
        .await
        .unwrap();
    ctx.facade
        .set_object(ADMIN_USER, "light.channel", json!({"type": "channel", "common": {"name": "Lights"}}), SetOptions::default())
        .await
        .unwrap();

    let func = ViewSpec {
        map: "if (obj.type === 'state') emit(obj._id, obj.common.name);".to_string(),
        reduce: None,
    };
    let mut rows = ctx.facade.apply_view(ADMIN_USER, &func, None, None).await.unwrap();
    rows.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "light.kitchen");
    assert_eq!(rows[0].value, json!("Kitchen"));
}

#[tokio::test]
async fn apply_view_stats_reduce_returns_the_max() {
    let ctx = TestContext::new().await;
    for (id, val) in [("sensor.a", 12.0), ("sensor.b", 30.0), ("sensor.c", 7.0)] {
        ctx.facade
            .set_object(ADMIN_USER, id, json!({"type": "state", "common": {"value": val}}), SetOptions::default())
            .await
            .unwrap();
    }

    let func = ViewSpec {
        map: "emit(obj._id, obj.common.value);".to_string(),
        reduce: Some("_stats".to_string()),
    };
    let rows = ctx.facade.apply_view(ADMIN_USER, &func, None, None).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "_stats");
    assert_eq!(rows[0].value, json!({"max": 30.0}));
}

#[tokio::test]
async fn get_object_view_resolves_design_document() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"type": "state", "common": {"name": "Kitchen"}}), SetOptions::default())
        .await
        .unwrap();
    ctx.facade
        .set_object(
            ADMIN_USER,
            "_design/lights",
            json!({
                "views": {
                    "byName": {
                        "map": "emit(obj._id, obj.common.name);"
                    }
                }
            }),
            SetOptions::default(),
        )
        .await
        .unwrap();

    // Narrow the scan to `light.kitchen` itself so the `_design/lights`
    // document the map runs over too (views scan the whole range) doesn't
    // also emit a stray `(id, null)` row.
    let rows = ctx
        .facade
        .get_object_view(ADMIN_USER, "lights", "byName", Some("light.kitchen"), Some("light.kitchen"))
        .await
        .unwrap();
    assert_eq!(rows, vec![objectdb::core::view::ViewRow { id: "light.kitchen".to_string(), value: json!("Kitchen") }]);
}

#[tokio::test]
async fn get_object_view_reports_unknown_design() {
    let ctx = TestContext::new().await;
    let err = ctx.facade.get_object_view(ADMIN_USER, "missing", "byName", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownView(_)));
}

#[tokio::test]
async fn get_object_view_reports_unknown_search_within_existing_design() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(
            ADMIN_USER,
            "_design/lights",
            json!({"views": {"byName": {"map": "emit(obj._id, obj);"}}}),
            SetOptions::default(),
        )
        .await
        .unwrap();

    let err = ctx.facade.get_object_view(ADMIN_USER, "lights", "nope", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownView(_)));
}

#[tokio::test]
async fn apply_view_honors_startkey_endkey_range() {
    let ctx = TestContext::new().await;
    for id in ["a.1", "b.1", "c.1"] {
        ctx.facade
            .set_object(ADMIN_USER, id, json!({"common": {}}), SetOptions::default())
            .await
            .unwrap();
    }

    let func = ViewSpec { map: "emit(obj._id, obj._id);".to_string(), reduce: None };
    let rows = ctx.facade.apply_view(ADMIN_USER, &func, Some("a.1"), Some("b.1")).await.unwrap();
    let mut ids: Vec<String> = rows.into_iter().map(|r| r.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["a.1".to_string(), "b.1".to_string()]);
}
