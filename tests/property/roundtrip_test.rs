// tests/property/roundtrip_test.rs

//! Property-based tests for roundtrip operations: `setObject`/`getObject`
//! and `writeFile`/`readFile` must hand back exactly what was written,
//! for any key/value shape proptest can generate.

use crate::test_helpers::TestContext;
use objectdb::core::object_store::SetOptions;
use objectdb::core::types::ADMIN_USER;
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn set_get_object_roundtrip(
        key in "[a-zA-Z0-9_]{1,50}",
        name in ".{0,500}"
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            let id = format!("obj.{key}");

            ctx.facade
                .set_object(ADMIN_USER, &id, json!({"common": {"name": name.clone()}}), SetOptions::default())
                .await
                .unwrap();

            let obj = ctx.facade.get_object(ADMIN_USER, &id).await.unwrap().unwrap();
            let got = obj.0.get("common").and_then(|c| c.get("name")).and_then(|v| v.as_str());
            prop_assert_eq!(got, Some(name.as_str()));
        });
    }

    #[test]
    fn write_read_file_roundtrip(
        name in "[a-zA-Z0-9_]{1,50}",
        data in prop::collection::vec(any::<u8>(), 0..2000)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::new().await;
            let filename = format!("{name}.bin");

            ctx.facade
                .write_file(ADMIN_USER, "obj", &filename, data.clone(), None)
                .await
                .unwrap();

            let (got, _mime) = ctx.facade.read_file(ADMIN_USER, "obj", &filename).await.unwrap();
            prop_assert_eq!(got, data);
        });
    }
}
