// tests/integration/pubsub_test.rs

//! Covers the pub/sub dispatcher: subscribing then writing an object
//! delivers exactly one matching notification, non-matching patterns and
//! unsubscribed connections receive nothing, and deletions fan out as a
//! `None` value.

use objectdb::core::types::{ObjectId, Realm, ADMIN_USER};
use serde_json::json;
use std::time::Duration;

use crate::integration::test_helpers::TestContext;

#[tokio::test]
async fn subscribe_then_set_object_delivers_matching_notification() {
    let ctx = TestContext::new().await;
    let (conn_id, mut notify_rx) = ctx.facade.pubsub.register_connection();
    ctx.facade.subscribe(ADMIN_USER, conn_id, Realm::Objects, "light.*").await.unwrap();

    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"common": {"name": "Kitchen"}}), Default::default())
        .await
        .unwrap();

    let notification = tokio::time::timeout(Duration::from_secs(1), notify_rx.recv())
        .await
        .expect("notification should arrive")
        .expect("channel should stay open");

    assert_eq!(notification.pattern, "light.*");
    assert_eq!(notification.id, "light.kitchen");
    let value = notification.value.expect("set_object publishes Some(value)");
    assert_eq!(value.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("Kitchen"));
}

#[tokio::test]
async fn non_matching_pattern_delivers_nothing() {
    let ctx = TestContext::new().await;
    let (conn_id, mut notify_rx) = ctx.facade.pubsub.register_connection();
    ctx.facade.subscribe(ADMIN_USER, conn_id, Realm::Objects, "sensor.*").await.unwrap();

    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"common": {}}), Default::default())
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), notify_rx.recv()).await;
    assert!(result.is_err(), "no notification should arrive for a non-matching pattern");
}

#[tokio::test]
async fn unsubscribe_stops_further_delivery() {
    let ctx = TestContext::new().await;
    let (conn_id, mut notify_rx) = ctx.facade.pubsub.register_connection();
    ctx.facade.subscribe(ADMIN_USER, conn_id, Realm::Objects, "light.*").await.unwrap();

    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"common": {}}), Default::default())
        .await
        .unwrap();
    notify_rx.recv().await.expect("first notification delivered");

    ctx.facade.unsubscribe(ADMIN_USER, conn_id, Realm::Objects, "light.*").await.unwrap();
    ctx.facade
        .set_object(ADMIN_USER, "light.bedroom", json!({"common": {}}), Default::default())
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(200), notify_rx.recv()).await;
    assert!(result.is_err(), "no notification should arrive after unsubscribing");
}

#[tokio::test]
async fn delete_publishes_a_none_value() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "light.kitchen", json!({"common": {}}), Default::default())
        .await
        .unwrap();

    let (conn_id, mut notify_rx) = ctx.facade.pubsub.register_connection();
    ctx.facade.subscribe(ADMIN_USER, conn_id, Realm::Objects, "light.*").await.unwrap();

    ctx.facade.del_object(ADMIN_USER, "light.kitchen").await.unwrap();

    let notification = tokio::time::timeout(Duration::from_secs(1), notify_rx.recv())
        .await
        .expect("notification should arrive")
        .expect("channel should stay open");
    assert_eq!(notification.id, "light.kitchen");
    assert!(notification.value.is_none());
}

#[tokio::test]
async fn dropped_connection_is_removed_from_dispatcher() {
    let ctx = TestContext::new().await;
    let (conn_id, _notify_rx) = ctx.facade.pubsub.register_connection();
    ctx.facade.subscribe(ADMIN_USER, conn_id, Realm::Objects, "*").await.unwrap();
    assert_eq!(ctx.facade.pubsub.connection_count(), 1);

    ctx.facade.pubsub.drop_connection(conn_id);
    assert_eq!(ctx.facade.pubsub.connection_count(), 0);

    // Publishing after the connection dropped must not panic or block.
    let id = ObjectId::parse("light.kitchen").unwrap();
    ctx.facade.pubsub.publish_all(Realm::Objects, &id, None);
}
