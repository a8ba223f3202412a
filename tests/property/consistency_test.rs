// tests/property/consistency_test.rs

//! Property-based tests for data consistency: `getKeys` under a glob must
//! report exactly the ids that were created beneath it, however many
//! distinct suffixes proptest throws at a single run, and `chmodObject`
//! must leave the requested bits readable back from `getObject`.

use crate::test_helpers::TestContext;
use objectdb::core::object_store::SetOptions;
use objectdb::core::types::{PermissionBits, ADMIN_USER};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 50,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn get_keys_count_matches_objects_created_under_prefix(
        suffixes in prop::collection::hash_set("[a-z0-9]{1,20}", 1..=30)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            let expected: HashSet<String> = suffixes.iter().map(|s| format!("device.{s}")).collect();

            for id in &expected {
                ctx.facade.set_object(ADMIN_USER, id, json!({"common": {}}), SetOptions::default()).await.unwrap();
            }

            let keys: HashSet<String> = ctx.facade.get_keys(ADMIN_USER, "device.*").await.unwrap().into_iter().collect();
            prop_assert_eq!(keys, expected);
        });
    }

    #[test]
    fn chmod_object_bits_are_observable_afterwards(
        bits in 0u16..=0xFFF
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            ctx.facade.set_object(ADMIN_USER, "obj.a", json!({"common": {}}), SetOptions::default()).await.unwrap();

            let requested = PermissionBits::from_bits_truncate(bits);
            ctx.facade.chmod_object(ADMIN_USER, "obj.a", Some(requested), None).await.unwrap();

            let obj = ctx.facade.get_object(ADMIN_USER, "obj.a").await.unwrap().unwrap();
            let acl = obj.acl().unwrap();
            prop_assert_eq!(acl.object, Some(requested));
        });
    }
}
