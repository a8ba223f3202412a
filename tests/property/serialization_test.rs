// tests/property/serialization_test.rs

//! Property-based tests for the two parsers every wire request runs
//! through before anything else: `ObjectId::parse`, which must accept any
//! non-empty string free of the forbidden characters and hand it back
//! unchanged, and `glob_to_regex`, whose compiled pattern must match a
//! literal (wildcard-free) string against exactly itself.

use objectdb::core::glob::glob_to_regex;
use objectdb::core::types::ObjectId;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn object_id_parse_roundtrips_on_allowed_characters(
        id in "[a-zA-Z0-9_.]{1,80}"
    ) {
        let parsed = ObjectId::parse(id.clone()).unwrap();
        prop_assert_eq!(parsed.as_str(), id.as_str());
    }

    #[test]
    fn object_id_parse_rejects_forbidden_characters(
        prefix in "[a-zA-Z0-9_]{0,20}",
        forbidden in prop::sample::select(vec!['[', ']', '*', ',', ';', '\'', '"', '`', '<', '>', '?']),
        suffix in "[a-zA-Z0-9_]{0,20}"
    ) {
        let id = format!("{prefix}{forbidden}{suffix}");
        prop_assert!(ObjectId::parse(id).is_err());
    }

    #[test]
    fn glob_to_regex_literal_pattern_matches_only_itself(
        literal in "[a-zA-Z0-9_.]{1,40}",
        other in "[a-zA-Z0-9_.]{1,40}"
    ) {
        let re = glob_to_regex(&literal);
        prop_assert!(re.is_match(&literal));
        if other != literal {
            prop_assert!(!re.is_match(&other));
        }
    }
}
