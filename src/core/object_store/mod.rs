// src/core/object_store/mod.rs

//! The object store: an in-memory keyed map from `ObjectId` to `Object`,
//! mutated through the compound operations (`setObject`, `extendObject`,
//! `delObject`, `chownObject`, `chmodObject`, `findObject`, `destroyDB`,
//! ...), with every mutation publishing through the pub/sub dispatcher
//! and scheduling a debounced snapshot.
//!
//! A single `RwLock<BTreeMap<..>>` rather than a sharded map: this
//! system's single-event-loop concurrency model and modest scale don't
//! need sharded lock contention relief, and a `BTreeMap` gives the
//! lexicographic range queries `getObjectList` needs for free.

mod merge;

use crate::core::acl::subject::{ObjectOp, SubjectAcl};
use crate::core::acl::AclEngine;
use crate::core::errors::{CoreError, CoreResult};
use crate::core::persistence::PersistenceHandle;
use crate::core::pubsub::PubSubDispatcher;
use crate::core::types::{Object, ObjectAcl, ObjectId, Realm};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use merge::deep_merge;

/// One row of a `getObjectList` range query.
#[derive(Debug, Clone)]
pub struct ObjectRow {
    pub id: String,
    pub value: Object,
    pub doc: Option<Object>,
}

/// Options accepted by `setObject`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub preserve_settings: Vec<String>,
    pub owner: Option<String>,
    pub owner_group: Option<String>,
}

/// A pluggable predicate gating overwrites of `nonEdit`-marked objects;
/// the password-policy itself is an external collaborator, not part of
/// the core.
pub type NonEditValidator = dyn Fn(&Object, &Object, Option<&str>) -> bool + Send + Sync;

fn default_non_edit_validator(old: &Object, _new: &Object, password: Option<&str>) -> bool {
    let expected = old
        .0
        .get("native")
        .and_then(|n| n.get("password"))
        .and_then(Value::as_str);
    match (expected, password) {
        (Some(expected), Some(given)) => expected == given,
        (None, _) => true,
        _ => false,
    }
}

pub struct ObjectStore {
    map: RwLock<BTreeMap<ObjectId, Object>>,
    default_new_acl: RwLock<Option<ObjectAcl>>,
    acl: Arc<AclEngine>,
    pubsub: Arc<PubSubDispatcher>,
    persistence: Arc<PersistenceHandle>,
    non_edit_validator: Arc<NonEditValidator>,
}

impl ObjectStore {
    pub fn new(
        acl: Arc<AclEngine>,
        pubsub: Arc<PubSubDispatcher>,
        persistence: Arc<PersistenceHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            map: RwLock::new(BTreeMap::new()),
            default_new_acl: RwLock::new(None),
            acl,
            pubsub,
            persistence,
            non_edit_validator: Arc::new(default_non_edit_validator),
        })
    }

    /// Loads the canonical snapshot into memory and seeds `defaultNewAcl`
    /// from `system.config.common.defaultNewAcl` if present.
    pub async fn load_from_disk(self: &Arc<Self>) {
        let loaded = crate::core::persistence::snapshot::load_snapshot(&self.persistence.data_dir).await;
        *self.map.write().await = loaded;

        let seeded = self
            .map
            .read()
            .await
            .get(&ObjectId::parse("system.config").unwrap())
            .and_then(|o| o.common())
            .and_then(|c| c.get("defaultNewAcl"))
            .and_then(|v| serde_json::from_value::<ObjectAcl>(v.clone()).ok());
        if let Some(acl) = seeded {
            *self.default_new_acl.write().await = Some(acl);
        }
    }

    /// A full, unsynchronized snapshot of the current contents, used by
    /// the persistence layer when writing to disk.
    pub async fn snapshot_map(&self) -> BTreeMap<ObjectId, Object> {
        self.map.read().await.clone()
    }

    /// The current `defaultNewAcl` template, handed down to the file store
    /// so new file descriptors without an explicit ACL inherit it too.
    pub async fn default_new_acl(&self) -> Option<ObjectAcl> {
        self.default_new_acl.read().await.clone()
    }

    /// Seeds `defaultNewAcl` from the constructor's `{defaultNewAcl}` config
    /// field when the loaded snapshot's `system.config` didn't already
    /// provide one. Called once at startup, after `load_from_disk`.
    pub async fn seed_default_new_acl(&self, config_acl: Option<ObjectAcl>) {
        let mut current = self.default_new_acl.write().await;
        if current.is_none() {
            *current = config_acl;
        }
    }

    // --- ACL-bypassing helpers, used by `AclEngine::resolve_subject` ---

    pub async fn get_object_raw(&self, id: &str) -> Option<Object> {
        let id = ObjectId::parse(id).ok()?;
        self.map.read().await.get(&id).cloned()
    }

    pub async fn get_keys_raw(&self, pattern: &str) -> Vec<ObjectId> {
        let re = crate::core::glob::glob_to_regex(pattern);
        self.map
            .read()
            .await
            .keys()
            .filter(|id| re.is_match(id.as_str()))
            .cloned()
            .collect()
    }

    // --- Public, ACL-checked operations ---

    /// `getObject(id)` — read-only, deep clone or `None`.
    pub async fn get_object(&self, subject: &SubjectAcl, id: &ObjectId) -> CoreResult<Option<Object>> {
        let map = self.map.read().await;
        let existing = map.get(id);
        self.acl.check_object(subject, id, ObjectOp::Read, existing)?;
        Ok(existing.cloned())
    }

    /// `getKeys(pattern)` — sorted ids matching `pattern` and passing `list`.
    pub async fn get_keys(&self, subject: &SubjectAcl, pattern: &str) -> Vec<String> {
        let re = crate::core::glob::glob_to_regex(pattern);
        let map = self.map.read().await;
        let mut keys: Vec<String> = map
            .keys()
            .filter(|id| re.is_match(id.as_str()))
            .filter(|id| self.acl.check_object(subject, id, ObjectOp::List, map.get(id)).is_ok())
            .map(|id| id.as_str().to_string())
            .collect();
        keys.sort();
        keys
    }

    /// `getObjects(keys)` — parallel array of clones or per-element errors.
    pub async fn get_objects(
        &self,
        subject: &SubjectAcl,
        keys: &[ObjectId],
    ) -> CoreResult<Vec<Result<Option<Object>, CoreError>>> {
        if keys.is_empty() {
            return Err(CoreError::NoKeys);
        }
        let map = self.map.read().await;
        Ok(keys
            .iter()
            .map(|id| {
                let existing = map.get(id);
                self.acl
                    .check_object(subject, id, ObjectOp::Read, existing)
                    .map(|_| existing.cloned())
            })
            .collect())
    }

    /// `getObjectsByPattern(pattern)` — clones of every matching id passing `read`.
    pub async fn get_objects_by_pattern(&self, subject: &SubjectAcl, pattern: &str) -> Vec<Object> {
        let re = crate::core::glob::glob_to_regex(pattern);
        let map = self.map.read().await;
        map.iter()
            .filter(|(id, _)| re.is_match(id.as_str()))
            .filter(|(id, obj)| self.acl.check_object(subject, id, ObjectOp::Read, Some(obj)).is_ok())
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// `getObjectList({startkey, endkey, include_docs, sorted})`.
    pub async fn get_object_list(
        &self,
        subject: &SubjectAcl,
        startkey: Option<&str>,
        endkey: Option<&str>,
        include_docs: bool,
    ) -> Vec<ObjectRow> {
        let map = self.map.read().await;
        let range: Box<dyn Iterator<Item = (&ObjectId, &Object)>> = match (startkey, endkey) {
            (Some(s), Some(e)) => {
                let s = s.to_string();
                let e = e.to_string();
                Box::new(
                    map.iter()
                        .filter(move |(id, _)| id.as_str() >= s.as_str() && id.as_str() <= e.as_str()),
                )
            }
            _ => Box::new(map.iter()),
        };

        range
            .filter(|(id, _)| !include_docs && !id.is_underscore_prefixed() || include_docs)
            .filter(|(id, obj)| self.acl.check_object(subject, id, ObjectOp::Read, Some(obj)).is_ok())
            .map(|(id, obj)| ObjectRow {
                id: id.as_str().to_string(),
                value: obj.clone(),
                doc: if include_docs { Some(obj.clone()) } else { None },
            })
            .collect()
    }

    /// `setObject(id, obj, options)`.
    pub async fn set_object(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        id: &ObjectId,
        new_obj: Value,
        options: &SetOptions,
    ) -> CoreResult<()> {
        if new_obj.is_null() {
            return Err(CoreError::ObjNull);
        }

        // Resolved ahead of the write lock: `resolve_subject` itself takes
        // a read lock on `self.map`, which would deadlock against the
        // write lock held below (tokio's `RwLock` isn't reentrant).
        let resolved_owner_group = if let Some(owner) = &options.owner {
            if options.owner_group.is_none() {
                self.acl.resolve_subject(self, owner).await.groups.first().cloned()
            } else {
                None
            }
        } else {
            None
        };

        let mut map = self.map.write().await;
        let existing = map.get(id).cloned();
        let op = if existing.is_some() { ObjectOp::Write } else { ObjectOp::Create };
        self.acl.check_object(subject, id, op, existing.as_ref())?;

        // system.config.common.defaultNewAcl back-propagation.
        if id.as_str() == "system.config" {
            let new_default = new_obj
                .get("common")
                .and_then(|c| c.get("defaultNewAcl"))
                .and_then(|v| serde_json::from_value::<ObjectAcl>(v.clone()).ok());
            if let Some(new_default) = new_default {
                let differs = {
                    let current = self.default_new_acl.read().await;
                    !current
                        .as_ref()
                        .map(|c| acl_templates_equal(c, &new_default))
                        .unwrap_or(false)
                };
                if differs {
                    *self.default_new_acl.write().await = Some(new_default.clone());
                    back_propagate_default_acl(&mut map, &new_default);
                }
            }
        }

        let mut final_obj = Object::new(new_obj);
        apply_preserve_settings(&mut final_obj, existing.as_ref(), &options.preserve_settings);
        apply_acl_inheritance(&mut final_obj, existing.as_ref(), self.default_new_acl.read().await.as_ref());

        if let Some(owner) = &options.owner {
            let group = options.owner_group.clone().or(resolved_owner_group);
            if let Some(group) = group {
                let mut acl = final_obj.acl().unwrap_or_default();
                acl.owner = Some(owner.clone());
                acl.owner_group = Some(group);
                final_obj.set_acl(&acl);
            }
        }

        final_obj.set_id(id);
        let is_user_or_group = id.is_user_or_group();
        map.insert(id.clone(), final_obj.clone());
        drop(map);

        if is_user_or_group {
            self.acl.invalidate_all();
        }

        self.pubsub.publish_all(Realm::Objects, id, Some(&final_obj));
        self.persistence.schedule_snapshot(self.clone());
        Ok(())
    }

    /// `extendObject(id, partial)`.
    pub async fn extend_object(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        id: &ObjectId,
        patch: Value,
        password: Option<&str>,
    ) -> CoreResult<Object> {
        let mut map = self.map.write().await;
        let existing = map.get(id).cloned();
        let op = if existing.is_some() { ObjectOp::Write } else { ObjectOp::Create };
        self.acl.check_object(subject, id, op, existing.as_ref())?;

        let mut merged = existing.clone().unwrap_or_else(|| Object::new(Value::Object(Default::default())));
        deep_merge(&mut merged.0, &patch, &[]);

        if let Some(old) = &existing {
            if old.non_edit() && !(self.non_edit_validator)(old, &merged, password) {
                return Err(CoreError::InvalidPassword);
            }
        }

        apply_acl_inheritance(&mut merged, existing.as_ref(), self.default_new_acl.read().await.as_ref());
        merged.set_id(id);

        let is_user_or_group = id.is_user_or_group();
        map.insert(id.clone(), merged.clone());
        drop(map);

        if is_user_or_group {
            self.acl.invalidate_all();
        }

        self.pubsub.publish_all(Realm::Objects, id, Some(&merged));
        self.persistence.schedule_snapshot(self.clone());
        Ok(merged)
    }

    /// `delObject(id)`.
    pub async fn del_object(self: &Arc<Self>, subject: &SubjectAcl, id: &ObjectId) -> CoreResult<()> {
        let mut map = self.map.write().await;
        let existing = map.get(id);
        self.acl.check_object(subject, id, ObjectOp::Delete, existing)?;

        match existing {
            None => return Err(CoreError::NotExists),
            Some(obj) if obj.dont_delete() => return Err(CoreError::NonDeletable),
            _ => {}
        }

        map.remove(id);
        drop(map);

        if id.is_user_or_group() {
            self.acl.invalidate_all();
        }

        self.pubsub.publish_all(Realm::Objects, id, None);
        self.persistence.schedule_snapshot(self.clone());
        Ok(())
    }

    /// `chownObject(pattern, {owner, ownerGroup})`.
    pub async fn chown_object(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        pattern: &str,
        owner: &str,
        owner_group: &str,
    ) -> Vec<String> {
        let re = crate::core::glob::glob_to_regex(pattern);
        let mut map = self.map.write().await;
        let candidate_ids: Vec<ObjectId> = map
            .keys()
            .filter(|id| re.is_match(id.as_str()) && self.acl.check_object(subject, id, ObjectOp::List, map.get(id)).is_ok())
            .cloned()
            .collect();

        let mut modified = Vec::new();
        let default_acl = self.default_new_acl.read().await.clone();
        for id in candidate_ids {
            let Some(obj) = map.get(&id) else { continue };
            if self.acl.check_object(subject, &id, ObjectOp::Write, Some(obj)).is_err() {
                continue;
            }
            let mut obj = obj.clone();
            let mut acl = obj.acl().unwrap_or_else(|| default_acl.clone().unwrap_or_default());
            acl.owner = Some(owner.to_string());
            acl.owner_group = Some(owner_group.to_string());
            obj.set_acl(&acl);
            map.insert(id.clone(), obj);
            modified.push(id.into_string());
        }
        drop(map);

        for id_str in &modified {
            if let Ok(id) = ObjectId::parse(id_str.clone()) {
                if let Some(obj) = self.map.read().await.get(&id).cloned() {
                    self.pubsub.publish_all(Realm::Objects, &id, Some(&obj));
                }
            }
        }
        if !modified.is_empty() {
            self.persistence.schedule_snapshot(self.clone());
        }
        modified
    }

    /// `chmodObject(pattern, {object, state})`.
    pub async fn chmod_object(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        pattern: &str,
        object_bits: Option<crate::core::types::PermissionBits>,
        state_bits: Option<crate::core::types::PermissionBits>,
    ) -> Vec<String> {
        let re = crate::core::glob::glob_to_regex(pattern);
        let mut map = self.map.write().await;
        let candidate_ids: Vec<ObjectId> = map
            .keys()
            .filter(|id| re.is_match(id.as_str()) && self.acl.check_object(subject, id, ObjectOp::List, map.get(id)).is_ok())
            .cloned()
            .collect();

        let mut modified = Vec::new();
        let default_acl = self.default_new_acl.read().await.clone();
        for id in candidate_ids {
            let Some(obj) = map.get(&id) else { continue };
            if self.acl.check_object(subject, &id, ObjectOp::Write, Some(obj)).is_err() {
                continue;
            }
            let mut obj = obj.clone();
            let mut acl = obj.acl().unwrap_or_else(|| default_acl.clone().unwrap_or_default());
            if let Some(bits) = object_bits {
                acl.object = Some(bits);
            }
            if obj.is_state() {
                if let Some(bits) = state_bits {
                    acl.state = Some(bits);
                }
            }
            obj.set_acl(&acl);
            map.insert(id.clone(), obj);
            modified.push(id.into_string());
        }
        drop(map);

        for id_str in &modified {
            if let Ok(id) = ObjectId::parse(id_str.clone()) {
                if let Some(obj) = self.map.read().await.get(&id).cloned() {
                    self.pubsub.publish_all(Realm::Objects, &id, Some(&obj));
                }
            }
        }
        if !modified.is_empty() {
            self.persistence.schedule_snapshot(self.clone());
        }
        modified
    }

    /// `findObject(idOrName, type?)`.
    pub async fn find_object(
        &self,
        subject: &SubjectAcl,
        id_or_name: &str,
        type_filter: Option<&str>,
    ) -> Option<String> {
        let map = self.map.read().await;
        if let Ok(id) = ObjectId::parse(id_or_name) {
            if let Some(obj) = map.get(&id) {
                if self.acl.check_object(subject, &id, ObjectOp::Read, Some(obj)).is_ok() {
                    return Some(id.into_string());
                }
            }
        }
        map.iter()
            .find(|(id, obj)| {
                obj.common_name() == Some(id_or_name)
                    && type_filter.map(|t| obj.common_type() == Some(t)).unwrap_or(true)
                    && self.acl.check_object(subject, id, ObjectOp::Read, Some(obj)).is_ok()
            })
            .map(|(id, _)| id.as_str().to_string())
    }

    /// `destroyDB()` — deletes only the snapshot; in-memory state survives
    /// until process exit.
    pub async fn destroy_db(&self, subject: &SubjectAcl) -> CoreResult<()> {
        if !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }
        self.persistence.destroy().await
    }
}

fn acl_templates_equal(a: &ObjectAcl, b: &ObjectAcl) -> bool {
    serde_json::to_value(a).ok() == serde_json::to_value(b).ok()
}

/// Assigns the new default ACL (stripped of `file`, and `state` for
/// non-state objects) to every object currently lacking an explicit `acl`.
fn back_propagate_default_acl(map: &mut BTreeMap<ObjectId, Object>, new_default: &ObjectAcl) {
    for obj in map.values_mut() {
        if obj.acl().is_some() {
            continue;
        }
        let mut acl = new_default.clone();
        if !obj.is_state() {
            acl.state = None;
        }
        obj.set_acl(&acl);
    }
}

/// For each key in `preserveSettings`: an explicit `null` in the new object
/// deletes the key; an absent key is copied from the old object; an
/// explicit value passes through unchanged.
fn apply_preserve_settings(new_obj: &mut Object, old: Option<&Object>, preserve: &[String]) {
    let Some(old) = old else { return };
    for key in preserve {
        let new_value = new_obj.0.pointer(&format!("/{}", key.replace('.', "/")));
        match new_value {
            Some(Value::Null) => {
                remove_pointer(&mut new_obj.0, key);
            }
            None => {
                if let Some(old_value) = old.0.pointer(&format!("/{}", key.replace('.', "/"))) {
                    set_pointer(&mut new_obj.0, key, old_value.clone());
                }
            }
            Some(_) => {}
        }
    }
}

fn remove_pointer(value: &mut Value, dotted: &str) {
    let mut parts: Vec<&str> = dotted.split('.').collect();
    let Some(last) = parts.pop() else { return };
    let mut cur = value;
    for part in parts {
        match cur.get_mut(part) {
            Some(next) => cur = next,
            None => return,
        }
    }
    if let Some(map) = cur.as_object_mut() {
        map.remove(last);
    }
}

fn set_pointer(value: &mut Value, dotted: &str, new_value: Value) {
    let mut parts: Vec<&str> = dotted.split('.').collect();
    let Some(last) = parts.pop() else { return };
    let mut cur = value;
    for part in parts {
        if !cur.is_object() {
            *cur = Value::Object(Default::default());
        }
        cur = cur.as_object_mut().unwrap().entry(part).or_insert(Value::Object(Default::default()));
    }
    if !cur.is_object() {
        *cur = Value::Object(Default::default());
    }
    cur.as_object_mut().unwrap().insert(last.to_string(), new_value);
}

/// Inherits `acl` from the old object when the new object has none;
/// otherwise assigns `defaultNewAcl`, stripping `file` always and `state`
/// for non-state objects.
fn apply_acl_inheritance(new_obj: &mut Object, old: Option<&Object>, default_acl: Option<&ObjectAcl>) {
    if new_obj.acl().is_some() {
        if !new_obj.is_state() {
            new_obj.remove_acl_state_field();
        }
        return;
    }
    if let Some(old) = old {
        if let Some(acl) = old.acl() {
            new_obj.set_acl(&acl);
            if !new_obj.is_state() {
                new_obj.remove_acl_state_field();
            }
            return;
        }
    }
    if let Some(default_acl) = default_acl {
        let mut acl = default_acl.clone();
        if !new_obj.is_state() {
            acl.state = None;
        }
        new_obj.set_acl(&acl);
        if !new_obj.is_state() {
            new_obj.remove_acl_state_field();
        }
    }
}
