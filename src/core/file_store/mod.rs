// src/core/file_store/mod.rs

//! The file store: a blob tree under `<root>/files/<id>/...` with a
//! per-id sidecar descriptor map, MIME classification, and an optional
//! in-memory text cache.
//!
//! Uses the same debounce-and-flush shape as [`crate::core::persistence`],
//! generalized from one global snapshot to a
//! per-id dirty set so an active id's sidecar doesn't force a rewrite of
//! every other id's descriptors.

pub mod mime;
pub mod sidecar;

use crate::core::acl::subject::SubjectAcl;
use crate::core::acl::AclEngine;
use crate::core::errors::{CoreError, CoreResult};
use crate::core::glob::glob_to_regex;
use crate::core::pubsub::PubSubDispatcher;
use crate::core::types::{FileAcl, ObjectAcl, PermissionBits, RequiredBit};
use dashmap::DashMap;
use serde::Serialize;
use sidecar::{FileDescriptor, SidecarMap};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

const SIDECAR_DEBOUNCE: Duration = Duration::from_secs(1);

/// One `readDir` row.
#[derive(Debug, Clone, Serialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    pub acl: Option<FileAcl>,
    #[serde(rename = "modifiedAt")]
    pub modified_at: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<i64>,
}

/// Strips a leading `/` and collapses `..` segments out of a relative path.
fn sanitize_name(name: &str) -> String {
    let stripped = name.strip_prefix('/').unwrap_or(name);
    stripped
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != "..")
        .collect::<Vec<_>>()
        .join("/")
}

fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::EmptyId);
    }
    if id.contains("..") {
        return Err(CoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub struct FileStore {
    data_dir: PathBuf,
    acl: Arc<AclEngine>,
    pubsub: Arc<PubSubDispatcher>,
    default_acl: Mutex<Option<ObjectAcl>>,
    sidecars: DashMap<String, Arc<Mutex<SidecarMap>>>,
    dirty: std::sync::Mutex<HashSet<String>>,
    flush_timer: Mutex<Option<JoinHandle<()>>>,
    text_cache: DashMap<(String, String), Arc<str>>,
    no_file_cache: AtomicBool,
}

impl FileStore {
    pub fn new(
        data_dir: PathBuf,
        acl: Arc<AclEngine>,
        pubsub: Arc<PubSubDispatcher>,
        no_file_cache: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            data_dir,
            acl,
            pubsub,
            default_acl: Mutex::new(None),
            sidecars: DashMap::new(),
            dirty: std::sync::Mutex::new(HashSet::new()),
            flush_timer: Mutex::new(None),
            text_cache: DashMap::new(),
            no_file_cache: AtomicBool::new(no_file_cache),
        })
    }

    /// Feeds the resolved `defaultNewAcl` template down from the object
    /// store so new file descriptors without an explicit ACL get one.
    pub async fn set_default_acl(&self, acl: Option<ObjectAcl>) {
        *self.default_acl.lock().await = acl;
    }

    async fn sidecar_handle(&self, id: &str) -> Arc<Mutex<SidecarMap>> {
        if let Some(existing) = self.sidecars.get(id) {
            return existing.clone();
        }
        let loaded = sidecar::load_sidecar(&self.data_dir, id).await;
        let handle = Arc::new(Mutex::new(loaded));
        self.sidecars.insert(id.to_string(), handle.clone());
        handle
    }

    fn mark_dirty(self: &Arc<Self>, id: &str) {
        self.dirty.lock().unwrap().insert(id.to_string());
        let this = self.clone();
        tokio::spawn(async move {
            let mut guard = this.flush_timer.lock().await;
            if let Some(old) = guard.take() {
                old.abort();
            }
            let this_for_timer = this.clone();
            *guard = Some(tokio::spawn(async move {
                tokio::time::sleep(SIDECAR_DEBOUNCE).await;
                this_for_timer.flush_dirty().await;
            }));
        });
    }

    async fn flush_dirty(&self) {
        let ids: Vec<String> = std::mem::take(&mut *self.dirty.lock().unwrap()).into_iter().collect();
        for id in ids {
            if let Some(handle) = self.sidecars.get(&id) {
                let map = handle.lock().await;
                if let Err(e) = sidecar::save_sidecar(&self.data_dir, &id, &map).await {
                    error!("Failed to flush sidecar for {}: {}", id, e);
                }
            }
        }
    }

    /// Forces a synchronous flush of every dirty sidecar (`destroy()`).
    pub async fn flush_force(&self) {
        self.flush_dirty().await;
    }

    fn default_file_acl(default_acl: &Option<ObjectAcl>) -> FileAcl {
        match default_acl {
            Some(acl) => FileAcl {
                owner: acl.owner.clone().unwrap_or_else(|| crate::core::types::ADMIN_USER.to_string()),
                owner_group: acl
                    .owner_group
                    .clone()
                    .unwrap_or_else(|| crate::core::types::ADMIN_GROUP.to_string()),
                permissions: PermissionBits::empty(),
            },
            None => FileAcl {
                owner: crate::core::types::ADMIN_USER.to_string(),
                owner_group: crate::core::types::ADMIN_GROUP.to_string(),
                permissions: PermissionBits::empty(),
            },
        }
    }

    /// `writeFile(id, name, data, {mimeType?})`.
    pub async fn write_file(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        id: &str,
        name: &str,
        data: Vec<u8>,
        mime_type: Option<String>,
    ) -> CoreResult<()> {
        validate_id(id)?;
        let name = sanitize_name(name);
        let default_acl = self.default_acl.lock().await.clone();

        let handle = self.sidecar_handle(id).await;
        {
            let map = handle.lock().await;
            self.acl.check_file(subject, RequiredBit::Write, map.get(&name).and_then(|d| d.acl.as_ref()))?;
        }
        if !subject.file.write && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }

        let path = self.blob_path(id, &name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let (classified_mime, binary) = mime::classify(&name);
        let mime_type = mime_type.unwrap_or_else(|| classified_mime.to_string());
        tokio::fs::write(&path, &data).await?;

        let now = now_millis();
        let mut map = handle.lock().await;
        let created_at = map.get(&name).map(|d| d.created_at).unwrap_or(now);
        let acl = map
            .get(&name)
            .and_then(|d| d.acl.clone())
            .unwrap_or_else(|| Self::default_file_acl(&default_acl));
        let descriptor = FileDescriptor {
            mime_type,
            binary,
            created_at,
            modified_at: now,
            acl: Some(acl),
        };
        map.insert(name.clone(), descriptor.clone());
        drop(map);

        self.text_cache.remove(&(id.to_string(), name.clone()));
        self.mark_dirty(id);
        self.pubsub.publish_file(id, &name, serde_json::to_value(descriptor).ok());
        Ok(())
    }

    fn blob_path(&self, id: &str, name: &str) -> PathBuf {
        sidecar::id_dir(&self.data_dir, id).join(name)
    }

    /// `readFile(id, name)` -> `(bytes, mimeType)`.
    pub async fn read_file(&self, subject: &SubjectAcl, id: &str, name: &str) -> CoreResult<(Vec<u8>, String)> {
        validate_id(id)?;
        let name = sanitize_name(name);
        let handle = self.sidecar_handle(id).await;
        let map = handle.lock().await;
        let descriptor = map.get(&name).ok_or(CoreError::NotExists)?;
        self.acl.check_file(subject, RequiredBit::Read, descriptor.acl.as_ref())?;
        if !subject.file.read && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }
        let mime_type = descriptor.mime_type.clone();
        let binary = descriptor.binary;
        drop(map);

        let no_cache = self.no_file_cache.load(Ordering::Relaxed);
        if !binary && !no_cache {
            if let Some(cached) = self.text_cache.get(&(id.to_string(), name.clone())) {
                return Ok((cached.as_bytes().to_vec(), mime_type));
            }
        }

        let path = self.blob_path(id, &name);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotExists
            } else {
                e.into()
            }
        })?;

        if !binary && !no_cache {
            if let Ok(text) = std::str::from_utf8(&bytes) {
                self.text_cache.insert((id.to_string(), name.clone()), Arc::from(text));
            }
        }
        Ok((bytes, mime_type))
    }

    /// `unlink(id, name)`.
    pub async fn unlink(self: &Arc<Self>, subject: &SubjectAcl, id: &str, name: &str) -> CoreResult<()> {
        validate_id(id)?;
        let name = sanitize_name(name);
        let handle = self.sidecar_handle(id).await;

        {
            let map = handle.lock().await;
            self.acl.check_file(subject, RequiredBit::Write, map.get(&name).and_then(|d| d.acl.as_ref()))?;
        }
        if !subject.file.delete && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }

        let path = self.blob_path(id, &name);
        if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            let prefix = format!("{name}/");
            let children: Vec<String> = handle
                .lock()
                .await
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for child in children {
                Box::pin(self.unlink(subject, id, &child)).await?;
            }
            tokio::fs::remove_dir_all(&path).await.ok();
        } else {
            let _ = tokio::fs::remove_file(&path).await;
        }

        handle.lock().await.remove(&name);
        self.text_cache.remove(&(id.to_string(), name.clone()));
        self.mark_dirty(id);
        self.pubsub.publish_file(id, &name, None);
        Ok(())
    }

    /// `readDir(id, name)`.
    pub async fn read_dir(
        &self,
        subject: &SubjectAcl,
        id: &str,
        name: &str,
        filter: bool,
    ) -> CoreResult<Vec<DirEntry>> {
        validate_id(id)?;
        let name = sanitize_name(name);
        if !subject.file.list && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }
        self.acl.check_file(subject, RequiredBit::Read, None)?;

        let handle = self.sidecar_handle(id).await;
        let map = handle.lock().await;
        let prefix = if name.is_empty() { String::new() } else { format!("{name}/") };

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (path, descriptor) in map.iter() {
            let Some(rest) = path.strip_prefix(prefix.as_str()) else { continue };
            if rest.is_empty() {
                continue;
            }
            let first_segment = rest.split('/').next().unwrap();
            if !seen.insert(first_segment.to_string()) {
                continue;
            }
            let is_dir = rest.contains('/');
            if filter && self.acl.check_file(subject, RequiredBit::Read, descriptor.acl.as_ref()).is_err() {
                continue;
            }
            entries.push(DirEntry {
                name: first_segment.to_string(),
                is_dir,
                acl: descriptor.acl.clone(),
                modified_at: Some(descriptor.modified_at),
                created_at: Some(descriptor.created_at),
            });
        }
        drop(map);

        let dir_path = self.blob_path(id, &name);
        if let Ok(mut read_dir) = tokio::fs::read_dir(&dir_path).await {
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if file_name == "_data.json" || file_name == "." || file_name == ".." {
                    continue;
                }
                if !seen.insert(file_name.clone()) {
                    continue;
                }
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                entries.push(DirEntry {
                    name: file_name,
                    is_dir,
                    acl: None,
                    modified_at: None,
                    created_at: None,
                });
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// `rename(id, oldName, newName)`.
    pub async fn rename(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        id: &str,
        old_name: &str,
        new_name: &str,
    ) -> CoreResult<()> {
        validate_id(id)?;
        let old_name = sanitize_name(old_name);
        let new_name = sanitize_name(new_name);
        let handle = self.sidecar_handle(id).await;

        let descriptor = {
            let map = handle.lock().await;
            self.acl.check_file(subject, RequiredBit::Write, map.get(&old_name).and_then(|d| d.acl.as_ref()))?;
            map.get(&old_name).cloned().ok_or(CoreError::NotExists)?
        };

        let old_path = self.blob_path(id, &old_name);
        let new_path = self.blob_path(id, &new_name);
        if let Some(parent) = new_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&old_path, &new_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::NotExists
            } else {
                e.into()
            }
        })?;

        let mut map = handle.lock().await;
        map.remove(&old_name);
        map.insert(new_name.clone(), descriptor.clone());
        drop(map);

        self.text_cache.remove(&(id.to_string(), old_name.clone()));
        self.mark_dirty(id);
        self.pubsub.publish_file(id, &old_name, None);
        self.pubsub.publish_file(id, &new_name, serde_json::to_value(descriptor).ok());
        Ok(())
    }

    /// `touch(id, pattern)`.
    pub async fn touch(self: &Arc<Self>, subject: &SubjectAcl, id: &str, pattern: &str) -> CoreResult<Vec<String>> {
        validate_id(id)?;
        let re = glob_to_regex(pattern);
        let handle = self.sidecar_handle(id).await;
        let default_acl = self.default_acl.lock().await.clone();
        let now = now_millis();

        let mut touched = Vec::new();
        let mut map = handle.lock().await;
        let keys: Vec<String> = map.keys().filter(|k| re.is_match(k)).cloned().collect();
        for key in keys {
            let entry = map.get_mut(&key).unwrap();
            if self.acl.check_file(subject, RequiredBit::Write, entry.acl.as_ref()).is_err() {
                continue;
            }
            entry.modified_at = now;
            if entry.acl.is_none() {
                entry.acl = Some(Self::default_file_acl(&default_acl));
            }
            if entry.mime_type.is_empty() {
                entry.mime_type = mime::classify(&key).0.to_string();
            }
            touched.push(key);
        }
        let snapshot: Vec<(String, FileDescriptor)> =
            touched.iter().filter_map(|k| map.get(k).map(|d| (k.clone(), d.clone()))).collect();
        drop(map);

        if !touched.is_empty() {
            self.mark_dirty(id);
        }
        for (key, descriptor) in snapshot {
            self.pubsub.publish_file(id, &key, serde_json::to_value(descriptor).ok());
        }
        Ok(touched)
    }

    /// `rm(id, pattern)`.
    pub async fn rm(self: &Arc<Self>, subject: &SubjectAcl, id: &str, pattern: &str) -> CoreResult<Vec<String>> {
        validate_id(id)?;
        if !subject.file.delete && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }
        let re = glob_to_regex(pattern);
        let handle = self.sidecar_handle(id).await;

        let matching: Vec<String> = {
            let map = handle.lock().await;
            map.keys().filter(|k| re.is_match(k)).cloned().collect()
        };

        let mut removed = Vec::new();
        for key in matching {
            let acl = handle.lock().await.get(&key).and_then(|d| d.acl.clone());
            if self.acl.check_file(subject, RequiredBit::Write, acl.as_ref()).is_err() {
                continue;
            }
            let path = self.blob_path(id, &key);
            tokio::fs::remove_file(&path).await.ok();
            handle.lock().await.remove(&key);
            self.text_cache.remove(&(id.to_string(), key.clone()));
            removed.push(key);
        }

        // Best-effort: prune now-empty parent directories.
        let mut dirs: Vec<PathBuf> = removed
            .iter()
            .filter_map(|k| self.blob_path(id, k).parent().map(|p| p.to_path_buf()))
            .collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs {
            let _ = tokio::fs::remove_dir(&dir).await;
        }

        if !removed.is_empty() {
            self.mark_dirty(id);
        }
        for key in &removed {
            self.pubsub.publish_file(id, key, None);
        }
        Ok(removed)
    }

    /// `mkdir(id, dirname)`.
    pub async fn mkdir(&self, subject: &SubjectAcl, id: &str, dirname: &str) -> CoreResult<()> {
        validate_id(id)?;
        if !subject.file.write && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }
        let dirname = sanitize_name(dirname);
        let path = self.blob_path(id, &dirname);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Err(CoreError::YetExists);
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    /// `chownFile(id, pattern, {owner, ownerGroup})`.
    pub async fn chown_file(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        id: &str,
        pattern: &str,
        owner: &str,
        owner_group: &str,
    ) -> CoreResult<Vec<String>> {
        validate_id(id)?;
        let re = glob_to_regex(pattern);
        let handle = self.sidecar_handle(id).await;
        let default_acl = self.default_acl.lock().await.clone();

        let mut modified = Vec::new();
        let mut map = handle.lock().await;
        let keys: Vec<String> = map.keys().filter(|k| re.is_match(k)).cloned().collect();
        for key in keys {
            let entry = map.get_mut(&key).unwrap();
            if self.acl.check_file(subject, RequiredBit::Write, entry.acl.as_ref()).is_err() {
                continue;
            }
            let mut acl = entry.acl.clone().unwrap_or_else(|| Self::default_file_acl(&default_acl));
            acl.owner = owner.to_string();
            acl.owner_group = owner_group.to_string();
            entry.acl = Some(acl);
            modified.push(key);
        }
        let snapshot: Vec<(String, FileDescriptor)> =
            modified.iter().filter_map(|k| map.get(k).map(|d| (k.clone(), d.clone()))).collect();
        drop(map);

        if !modified.is_empty() {
            self.mark_dirty(id);
        }
        for (key, descriptor) in snapshot {
            self.pubsub.publish_file(id, &key, serde_json::to_value(descriptor).ok());
        }
        Ok(modified)
    }

    /// `chmodFile(id, pattern, {mode})`.
    pub async fn chmod_file(
        self: &Arc<Self>,
        subject: &SubjectAcl,
        id: &str,
        pattern: &str,
        mode: PermissionBits,
    ) -> CoreResult<Vec<String>> {
        validate_id(id)?;
        let re = glob_to_regex(pattern);
        let handle = self.sidecar_handle(id).await;
        let default_acl = self.default_acl.lock().await.clone();

        let mut modified = Vec::new();
        let mut map = handle.lock().await;
        let keys: Vec<String> = map.keys().filter(|k| re.is_match(k)).cloned().collect();
        for key in keys {
            let entry = map.get_mut(&key).unwrap();
            if self.acl.check_file(subject, RequiredBit::Write, entry.acl.as_ref()).is_err() {
                continue;
            }
            let mut acl = entry.acl.clone().unwrap_or_else(|| Self::default_file_acl(&default_acl));
            acl.permissions = mode;
            entry.acl = Some(acl);
            modified.push(key);
        }
        let snapshot: Vec<(String, FileDescriptor)> =
            modified.iter().filter_map(|k| map.get(k).map(|d| (k.clone(), d.clone()))).collect();
        drop(map);

        if !modified.is_empty() {
            self.mark_dirty(id);
        }
        for (key, descriptor) in snapshot {
            self.pubsub.publish_file(id, &key, serde_json::to_value(descriptor).ok());
        }
        Ok(modified)
    }

    /// `enableFileCache(enabled)`. Gated by object-realm `write`; disabling
    /// drops every cached decoded string.
    pub fn enable_file_cache(&self, subject: &SubjectAcl, enabled: bool) -> CoreResult<()> {
        if !subject.object.write && !subject.is_admin() {
            return Err(CoreError::PermissionError);
        }
        self.no_file_cache.store(!enabled, Ordering::Relaxed);
        if !enabled {
            self.text_cache.clear();
        }
        Ok(())
    }
}
