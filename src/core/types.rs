// src/core/types.rs

//! Shared data-model types: object identifiers, the object envelope, and
//! the permission-bit representation used by both realms (objects/files).

use crate::core::errors::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Characters forbidden in an object id, per the charset rule.
const FORBIDDEN_ID_CHARS: &[char] = &[']', '[', '*', ',', ';', '\'', '"', '`', '<', '>', '?'];

/// A validated, dot-separated hierarchical object identifier.
///
/// Ordering is derived from the wrapped `String`, so a `BTreeMap<ObjectId, _>`
/// gives lexicographic range queries for free.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Validates and wraps a raw id string.
    pub fn parse(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() || id.chars().any(|c| FORBIDDEN_ID_CHARS.contains(&c)) {
            return Err(CoreError::InvalidId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// True if this id lives under the reserved `system.user.`/`system.group.`
    /// namespace, which gates an extra ACL step.
    pub fn is_user_or_group(&self) -> bool {
        self.0.starts_with("system.user.") || self.0.starts_with("system.group.")
    }

    pub fn is_user(&self) -> bool {
        self.0.starts_with("system.user.")
    }

    pub fn is_group(&self) -> bool {
        self.0.starts_with("system.group.")
    }

    /// True if this id starts with `_`, which `getObjectList` excludes
    /// when `include_docs` is false.
    pub fn is_underscore_prefixed(&self) -> bool {
        self.0.starts_with('_')
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The built-in admin subject, which has every bit set unconditionally.
pub const ADMIN_USER: &str = "system.user.admin";
/// The built-in admin group, whose members also get every bit set.
pub const ADMIN_GROUP: &str = "system.group.administrator";

/// One of the two permission triples evaluated against a subject: object
/// realm (covers `setObject`/`getObject`/...) or file realm (covers blobs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    Objects,
    Files,
}

bitflags::bitflags! {
    /// A 12-bit permission word: three 4-bit triples (user, group, everyone),
    /// each covering {read=0x4, write=0x2, execute=0x1}.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PermissionBits: u16 {
        const EVERYONE_EXEC  = 0x001;
        const EVERYONE_WRITE = 0x002;
        const EVERYONE_READ  = 0x004;
        const GROUP_EXEC     = 0x010;
        const GROUP_WRITE    = 0x020;
        const GROUP_READ     = 0x040;
        const USER_EXEC      = 0x100;
        const USER_WRITE     = 0x200;
        const USER_READ      = 0x400;
    }
}

/// The bit required for a given operation, within a single triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredBit {
    Read,
    Write,
}

impl RequiredBit {
    fn mask(self) -> u16 {
        match self {
            RequiredBit::Read => 0x4,
            RequiredBit::Write => 0x2,
        }
    }
}

/// Which triple shift applies, determined by comparing the acl's
/// owner/ownerGroup against the requesting subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    User = 8,
    Group = 4,
    Everyone = 0,
}

impl PermissionBits {
    /// Evaluates `(perms >> shift) & requiredBit`.
    pub fn check(self, shift: Shift, bit: RequiredBit) -> bool {
        let word = self.bits();
        ((word >> (shift as u16)) & bit.mask()) != 0
    }
}

impl Default for PermissionBits {
    fn default() -> Self {
        PermissionBits::empty()
    }
}

/// The `acl` sub-document carried on an object.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectAcl {
    pub owner: Option<String>,
    #[serde(rename = "ownerGroup")]
    pub owner_group: Option<String>,
    pub object: Option<PermissionBits>,
    /// Only present on `type = "state"` objects.
    pub state: Option<PermissionBits>,
}

/// The `acl` sub-document carried on a file descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAcl {
    pub owner: String,
    #[serde(rename = "ownerGroup")]
    pub owner_group: String,
    pub permissions: PermissionBits,
}

/// A structured record keyed by an `ObjectId`. Stored as a `serde_json::Value`
/// object so arbitrary payload shapes pass through untouched, with typed
/// helpers layered over the reserved fields (`_id`, `type`, `common`,
/// `native`, `acl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Object(pub Value);

impl Object {
    pub fn new(value: Value) -> Self {
        Object(value)
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }
        self.0.as_object_mut().unwrap()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: &ObjectId) {
        self.as_map_mut()
            .insert("_id".into(), Value::String(id.as_str().to_string()));
    }

    pub fn type_field(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn is_state(&self) -> bool {
        self.type_field() == Some("state")
    }

    pub fn common(&self) -> Option<&Map<String, Value>> {
        self.0.get("common").and_then(Value::as_object)
    }

    pub fn common_bool(&self, key: &str) -> bool {
        self.common()
            .and_then(|c| c.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common().and_then(|c| c.get("name")).and_then(Value::as_str)
    }

    pub fn common_type(&self) -> Option<&str> {
        self.common().and_then(|c| c.get("type")).and_then(Value::as_str)
    }

    pub fn dont_delete(&self) -> bool {
        self.common_bool("dontDelete")
    }

    pub fn non_edit(&self) -> bool {
        self.common_bool("nonEdit")
    }

    pub fn acl(&self) -> Option<ObjectAcl> {
        self.0
            .get("acl")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_acl(&mut self, acl: &ObjectAcl) {
        let value = serde_json::to_value(acl).expect("ObjectAcl always serializes");
        self.as_map_mut().insert("acl".into(), value);
    }

    pub fn remove_acl_state_field(&mut self) {
        if let Some(Value::Object(acl)) = self.as_map_mut().get_mut("acl") {
            acl.remove("state");
        }
    }
}
