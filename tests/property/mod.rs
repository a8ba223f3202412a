// tests/property/mod.rs

//! Property-based tests verifying invariants that must hold for any input,
//! not just the handful of cases the integration suite exercises directly.

pub mod roundtrip_test;
pub mod consistency_test;
pub mod serialization_test;
