// src/core/acl/subject.rs

//! The typed permission struct resolved per user: a compact, fixed-shape
//! value rather than a dynamically-keyed ACL bag.

use serde::{Deserialize, Serialize};

/// The five operations evaluated against the object and `users` realms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "camelCase")]
pub enum ObjectOp {
    List,
    Read,
    Write,
    Create,
    Delete,
}

/// Boolean permission set for the file realm: {list, read, write, create, delete}.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectFileAcl {
    pub list: bool,
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub delete: bool,
}

/// Boolean permission set for the object realm.
pub type SubjectObjectAcl = SubjectFileAcl;
/// Boolean permission set gating access to `system.user.*`/`system.group.*`.
pub type SubjectUsersAcl = SubjectFileAcl;

impl SubjectFileAcl {
    pub fn all() -> Self {
        Self {
            list: true,
            read: true,
            write: true,
            create: true,
            delete: true,
        }
    }

    pub fn get(&self, op: ObjectOp) -> bool {
        match op {
            ObjectOp::List => self.list,
            ObjectOp::Read => self.read,
            ObjectOp::Write => self.write,
            ObjectOp::Create => self.create,
            ObjectOp::Delete => self.delete,
        }
    }

    pub fn or_merge(&mut self, other: &Self) {
        self.list |= other.list;
        self.read |= other.read;
        self.write |= other.write;
        self.create |= other.create;
        self.delete |= other.delete;
    }
}

/// The resolved, per-user effective ACL: the union (boolean OR) of the
/// caller's own bits and every group they belong to.
#[derive(Debug, Clone, Default)]
pub struct SubjectAcl {
    pub user: String,
    pub groups: Vec<String>,
    pub file: SubjectFileAcl,
    pub object: SubjectObjectAcl,
    pub users: SubjectUsersAcl,
}

impl SubjectAcl {
    pub fn admin(user: &str) -> Self {
        Self {
            user: user.to_string(),
            groups: vec![crate::core::types::ADMIN_GROUP.to_string()],
            file: SubjectFileAcl::all(),
            object: SubjectObjectAcl::all(),
            users: SubjectUsersAcl::all(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user == crate::core::types::ADMIN_USER
            || self.groups.iter().any(|g| g == crate::core::types::ADMIN_GROUP)
    }
}
