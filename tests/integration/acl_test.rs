// tests/integration/acl_test.rs

//! Covers ACL resolution and enforcement: group membership OR-merges
//! into a user's effective ACL, and a user lacking the relevant bit
//! cannot mutate anything a subsequent admin read would observe.

use crate::integration::test_helpers::TestContext;
use objectdb::core::errors::CoreError;
use objectdb::core::object_store::SetOptions;
use objectdb::core::types::ADMIN_USER;
use serde_json::json;

#[tokio::test]
async fn unprivileged_user_is_denied_by_default() {
    let ctx = TestContext::new().await;
    let err = ctx
        .facade
        .set_object("system.user.bob", "obj.a", json!({"common": {}}), SetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionError));
}

#[tokio::test]
async fn group_membership_grants_effective_permission() {
    let ctx = TestContext::new().await;

    ctx.facade
        .set_object(
            ADMIN_USER,
            "system.group.testers",
            json!({
                "common": {
                    "members": ["system.user.bob"],
                    "acl": {
                        "object": {"list": true, "read": true, "write": true, "create": true, "delete": true},
                        "file": {"list": true, "read": true, "write": true, "create": true, "delete": true},
                        "users": {"list": false, "read": false, "write": false, "create": false, "delete": false}
                    }
                }
            }),
            SetOptions::default(),
        )
        .await
        .unwrap();

    ctx.facade
        .set_object("system.user.bob", "obj.a", json!({"common": {"name": "A"}}), SetOptions::default())
        .await
        .unwrap();

    let obj = ctx.facade.get_object(ADMIN_USER, "obj.a").await.unwrap().unwrap();
    assert_eq!(obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("A"));
}

#[tokio::test]
async fn non_member_is_still_denied_after_group_is_created() {
    let ctx = TestContext::new().await;

    ctx.facade
        .set_object(
            ADMIN_USER,
            "system.group.testers",
            json!({
                "common": {
                    "members": ["system.user.bob"],
                    "acl": {
                        "object": {"list": true, "read": true, "write": true, "create": true, "delete": true}
                    }
                }
            }),
            SetOptions::default(),
        )
        .await
        .unwrap();

    let err = ctx
        .facade
        .set_object("system.user.carol", "obj.a", json!({"common": {}}), SetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionError));
}

#[tokio::test]
async fn denied_write_never_mutates_state_visible_to_admin() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(ADMIN_USER, "obj.locked", json!({"common": {"name": "original"}}), SetOptions::default())
        .await
        .unwrap();

    let err = ctx
        .facade
        .extend_object("system.user.mallory", "obj.locked", json!({"common": {"name": "tampered"}}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionError));

    let err = ctx.facade.del_object("system.user.mallory", "obj.locked").await.unwrap_err();
    assert!(matches!(err, CoreError::PermissionError));

    let obj = ctx.facade.get_object(ADMIN_USER, "obj.locked").await.unwrap().unwrap();
    assert_eq!(obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str()), Some("original"));
}

#[tokio::test]
async fn administrator_group_membership_grants_unconditional_access() {
    let ctx = TestContext::new().await;
    ctx.facade
        .set_object(
            ADMIN_USER,
            "system.group.administrator",
            json!({"common": {"members": ["system.user.deputy"]}}),
            SetOptions::default(),
        )
        .await
        .unwrap();

    // A deputy admin gets the unconditional admin shortcut purely from
    // membership, with no explicit acl bits of its own.
    ctx.facade
        .set_object("system.user.deputy", "obj.a", json!({"common": {}}), SetOptions::default())
        .await
        .unwrap();
    assert!(ctx.facade.get_object("system.user.deputy", "obj.a").await.unwrap().is_some());
}
