// src/core/acl/mod.rs

//! The Access Control List engine: subject resolution and per-request
//! permission evaluation, enforced uniformly across both the object and
//! file realms.

mod engine;
pub mod subject;

pub use engine::AclEngine;
pub use subject::{ObjectOp, SubjectAcl, SubjectFileAcl, SubjectObjectAcl, SubjectUsersAcl};
