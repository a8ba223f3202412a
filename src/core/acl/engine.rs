// src/core/acl/engine.rs

//! `AclEngine` resolves subjects (user -> groups + effective ACL) and
//! evaluates per-request `checkObject`/`checkFile` predicates. A struct
//! holding resolved rule state plus pure evaluation methods, with an
//! internal cache invalidated on write.

use crate::core::acl::subject::{ObjectOp, SubjectAcl};
use crate::core::errors::{CoreError, CoreResult};
use crate::core::object_store::ObjectStore;
use crate::core::types::{ADMIN_GROUP, ADMIN_USER, FileAcl, ObjectId, RequiredBit, Shift};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// Caches resolved subjects until a `system.user.*`/`system.group.*`
/// mutation invalidates the cache (see `ObjectStore::set_object`).
#[derive(Debug, Default)]
pub struct AclEngine {
    cache: DashMap<String, Arc<SubjectAcl>>,
}

impl AclEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached subject. Called after any mutation to a
    /// `system.user.*`/`system.group.*` object.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Resolves `user -> {groups, acl}`, scanning `system.group.*` and
    /// `system.user.*` via a key-range scan on the object store.
    pub async fn resolve_subject(&self, store: &ObjectStore, user: &str) -> Arc<SubjectAcl> {
        if let Some(cached) = self.cache.get(user) {
            return cached.clone();
        }

        if user == ADMIN_USER {
            let resolved = Arc::new(SubjectAcl::admin(user));
            self.cache.insert(user.to_string(), resolved.clone());
            return resolved;
        }

        if !user.starts_with("system.user.") {
            warn!("resolve_subject: unknown or malformed user '{}'", user);
            let empty = Arc::new(SubjectAcl {
                user: user.to_string(),
                ..Default::default()
            });
            self.cache.insert(user.to_string(), empty.clone());
            return empty;
        }

        let mut subject = SubjectAcl {
            user: user.to_string(),
            ..Default::default()
        };

        // Seed the subject's own bits from its object, if present.
        if let Some(own) = store.get_object_raw(user).await {
            if let Some(common) = own.common() {
                if let Some(acl) = common.get("acl") {
                    merge_acl_json(&mut subject, acl);
                }
            }
        }

        // OR-merge every group the user is a member of.
        let groups = store.get_keys_raw("system.group.*").await;
        for group_id in groups {
            let Some(group_obj) = store.get_object_raw(group_id.as_str()).await else {
                continue;
            };
            let is_member = group_obj
                .common()
                .and_then(|c| c.get("members"))
                .and_then(|m| m.as_array())
                .map(|members| members.iter().any(|m| m.as_str() == Some(user)))
                .unwrap_or(false);
            if !is_member {
                continue;
            }
            subject.groups.push(group_id.as_str().to_string());
            if let Some(acl) = group_obj.common().and_then(|c| c.get("acl")) {
                merge_acl_json(&mut subject, acl);
            }
        }

        let resolved = Arc::new(subject);
        self.cache.insert(user.to_string(), resolved.clone());
        resolved
    }

    /// `checkObject(id, subject, op)`.
    pub fn check_object(
        &self,
        subject: &SubjectAcl,
        id: &ObjectId,
        op: ObjectOp,
        existing: Option<&crate::core::types::Object>,
    ) -> CoreResult<()> {
        if subject.is_admin() {
            return Ok(());
        }

        if id.is_user_or_group() && !subject.users.get(op) {
            return Err(CoreError::PermissionError);
        }

        if !subject.object.get(op) {
            return Err(CoreError::PermissionError);
        }

        if let Some(obj) = existing {
            if let Some(acl) = obj.acl() {
                let bit = if op == ObjectOp::Delete {
                    RequiredBit::Write
                } else if matches!(op, ObjectOp::Read | ObjectOp::List) {
                    RequiredBit::Read
                } else {
                    RequiredBit::Write
                };
                let perms = acl.object.unwrap_or_default();
                let shift = shift_for(subject, acl.owner.as_deref(), acl.owner_group.as_deref());
                if !perms.check(shift, bit) {
                    return Err(CoreError::PermissionError);
                }
            }
        }
        // Non-existent id + list bypasses the per-object acl check entirely.

        Ok(())
    }

    /// `checkFile(id, name, subject, flag)`. The sidecar lookup itself is
    /// the file store's responsibility; callers pass the already-loaded
    /// descriptor ACL, if any.
    pub fn check_file(
        &self,
        subject: &SubjectAcl,
        bit: RequiredBit,
        existing_acl: Option<&FileAcl>,
    ) -> CoreResult<()> {
        if subject.is_admin() {
            return Ok(());
        }

        let realm_ok = match bit {
            RequiredBit::Read => subject.file.read,
            RequiredBit::Write => subject.file.write,
        };
        if !realm_ok {
            return Err(CoreError::PermissionError);
        }

        let Some(acl) = existing_acl else {
            // The file doesn't yet exist; creation is governed separately.
            return Ok(());
        };

        let shift = shift_for(subject, Some(&acl.owner), Some(&acl.owner_group));
        if !acl.permissions.check(shift, bit) {
            return Err(CoreError::PermissionError);
        }
        Ok(())
    }
}

fn shift_for(subject: &SubjectAcl, owner: Option<&str>, owner_group: Option<&str>) -> Shift {
    if owner == Some(subject.user.as_str()) {
        Shift::User
    } else if owner_group.is_some_and(|g| subject.groups.iter().any(|sg| sg == g)) {
        Shift::Group
    } else {
        Shift::Everyone
    }
}

/// OR-merges a `common.acl.{file,object,users}` JSON fragment into a subject.
fn merge_acl_json(subject: &mut SubjectAcl, acl: &serde_json::Value) {
    for (realm, target) in [
        ("file", &mut subject.file),
        ("object", &mut subject.object),
        ("users", &mut subject.users),
    ] {
        if let Some(fragment) = acl.get(realm) {
            if let Ok(parsed) = serde_json::from_value::<crate::core::acl::subject::SubjectFileAcl>(
                fragment.clone(),
            ) {
                target.or_merge(&parsed);
            }
        }
    }
}

/// True if `group` is the built-in administrator group.
pub fn is_admin_group(group: &str) -> bool {
    group == ADMIN_GROUP
}
