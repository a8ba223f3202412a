// tests/integration/file_store_test.rs

//! Covers the file store: write/read/readDir/unlink round-trips, plus
//! rename, touch, rm, mkdir, chown/chmod, and the cache toggle.

use crate::integration::test_helpers::TestContext;
use objectdb::core::errors::CoreError;
use objectdb::core::types::{PermissionBits, ADMIN_USER};

#[tokio::test]
async fn write_read_dir_unlink_round_trip() {
    let ctx = TestContext::new().await;
    ctx.facade.write_file(ADMIN_USER, "o", "a/b.txt", b"hi".to_vec(), None).await.unwrap();

    let entries = ctx.facade.read_dir(ADMIN_USER, "o", "a", false).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "b.txt");
    assert!(!entries[0].is_dir);

    let (data, mime) = ctx.facade.read_file(ADMIN_USER, "o", "a/b.txt").await.unwrap();
    assert_eq!(data, b"hi");
    assert_eq!(mime, "text/plain");

    ctx.facade.unlink(ADMIN_USER, "o", "a/b.txt").await.unwrap();
    let entries = ctx.facade.read_dir(ADMIN_USER, "o", "a", false).await.unwrap();
    assert!(entries.is_empty());

    let err = ctx.facade.read_file(ADMIN_USER, "o", "a/b.txt").await.unwrap_err();
    assert!(matches!(err, CoreError::NotExists));
}

#[tokio::test]
async fn read_file_reports_not_exists_for_missing_path() {
    let ctx = TestContext::new().await;
    let err = ctx.facade.read_file(ADMIN_USER, "o", "nope.txt").await.unwrap_err();
    assert!(matches!(err, CoreError::NotExists));
}

#[tokio::test]
async fn rename_moves_sidecar_and_bytes() {
    let ctx = TestContext::new().await;
    ctx.facade.write_file(ADMIN_USER, "o", "old.txt", b"data".to_vec(), None).await.unwrap();
    ctx.facade.rename(ADMIN_USER, "o", "old.txt", "new.txt").await.unwrap();

    let (data, _) = ctx.facade.read_file(ADMIN_USER, "o", "new.txt").await.unwrap();
    assert_eq!(data, b"data");
    let err = ctx.facade.read_file(ADMIN_USER, "o", "old.txt").await.unwrap_err();
    assert!(matches!(err, CoreError::NotExists));
}

#[tokio::test]
async fn touch_updates_modified_at_for_matching_entries() {
    let ctx = TestContext::new().await;
    ctx.facade.write_file(ADMIN_USER, "o", "a.txt", b"1".to_vec(), None).await.unwrap();
    ctx.facade.write_file(ADMIN_USER, "o", "b.log", b"2".to_vec(), None).await.unwrap();

    let touched = ctx.facade.touch(ADMIN_USER, "o", "*.txt").await.unwrap();
    assert_eq!(touched, vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn rm_removes_matching_entries_and_bytes() {
    let ctx = TestContext::new().await;
    ctx.facade.write_file(ADMIN_USER, "o", "a.tmp", b"1".to_vec(), None).await.unwrap();
    ctx.facade.write_file(ADMIN_USER, "o", "b.tmp", b"2".to_vec(), None).await.unwrap();
    ctx.facade.write_file(ADMIN_USER, "o", "c.keep", b"3".to_vec(), None).await.unwrap();

    let mut removed = ctx.facade.rm(ADMIN_USER, "o", "*.tmp").await.unwrap();
    removed.sort();
    assert_eq!(removed, vec!["a.tmp".to_string(), "b.tmp".to_string()]);

    assert!(ctx.facade.read_file(ADMIN_USER, "o", "c.keep").await.is_ok());
    assert!(ctx.facade.read_file(ADMIN_USER, "o", "a.tmp").await.is_err());
}

#[tokio::test]
async fn mkdir_rejects_existing_directory() {
    let ctx = TestContext::new().await;
    ctx.facade.mkdir(ADMIN_USER, "o", "sub").await.unwrap();
    let err = ctx.facade.mkdir(ADMIN_USER, "o", "sub").await.unwrap_err();
    assert!(matches!(err, CoreError::YetExists));
}

#[tokio::test]
async fn chown_and_chmod_file_update_sidecar_acl() {
    let ctx = TestContext::new().await;
    ctx.facade.write_file(ADMIN_USER, "o", "a.txt", b"1".to_vec(), None).await.unwrap();

    let chowned = ctx.facade.chown_file(ADMIN_USER, "o", "a.txt", "system.user.alice", "system.group.ops").await.unwrap();
    assert_eq!(chowned, vec!["a.txt".to_string()]);

    let bits = PermissionBits::USER_READ | PermissionBits::USER_WRITE;
    let chmoded = ctx.facade.chmod_file(ADMIN_USER, "o", "a.txt", bits).await.unwrap();
    assert_eq!(chmoded, vec!["a.txt".to_string()]);

    let entries = ctx.facade.read_dir(ADMIN_USER, "o", "", false).await.unwrap();
    let entry = entries.iter().find(|e| e.name == "a.txt").unwrap();
    let acl = entry.acl.as_ref().unwrap();
    assert_eq!(acl.owner, "system.user.alice");
    assert_eq!(acl.permissions, bits);
}

#[tokio::test]
async fn enable_file_cache_false_clears_cached_text() {
    let ctx = TestContext::new().await;
    ctx.facade.write_file(ADMIN_USER, "o", "a.txt", b"cached".to_vec(), None).await.unwrap();
    ctx.facade.read_file(ADMIN_USER, "o", "a.txt").await.unwrap();

    ctx.facade.enable_file_cache(ADMIN_USER, false).await.unwrap();
    // Bytes are still readable from disk even with the cache disabled.
    let (data, _) = ctx.facade.read_file(ADMIN_USER, "o", "a.txt").await.unwrap();
    assert_eq!(data, b"cached");
}

#[tokio::test]
async fn unprivileged_user_cannot_write_files() {
    let ctx = TestContext::new().await;
    let err = ctx
        .facade
        .write_file("system.user.bob", "o", "a.txt", b"x".to_vec(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionError));
}
