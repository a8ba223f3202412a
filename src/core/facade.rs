// src/core/facade.rs

//! The request façade: the single entry point every transport-level
//! operation funnels through, sequencing subject resolution, ACL
//! enforcement, and dispatch to the object/file stores — normalize,
//! sanitize, authorize, delegate, acknowledge — without exposing the
//! stores' internals directly to the connection layer.
//!
//! One struct rather than a command-dispatch table: the wire surface
//! names a fixed, small operation set.

use crate::core::acl::subject::SubjectAcl;
use crate::core::acl::AclEngine;
use crate::core::errors::CoreResult;
use crate::core::file_store::{DirEntry, FileStore};
use crate::core::object_store::{ObjectRow, ObjectStore, SetOptions};
use crate::core::persistence::PersistenceHandle;
use crate::core::pubsub::PubSubDispatcher;
use crate::core::types::{Object, ObjectId, PermissionBits, Realm};
use crate::core::view::{self, ViewRow, ViewSpec};
use serde_json::Value;
use std::sync::Arc;

pub struct RequestFacade {
    pub acl: Arc<AclEngine>,
    pub objects: Arc<ObjectStore>,
    pub files: Arc<FileStore>,
    pub pubsub: Arc<PubSubDispatcher>,
    pub persistence: Arc<PersistenceHandle>,
}

impl RequestFacade {
    pub fn new(
        acl: Arc<AclEngine>,
        objects: Arc<ObjectStore>,
        files: Arc<FileStore>,
        pubsub: Arc<PubSubDispatcher>,
        persistence: Arc<PersistenceHandle>,
    ) -> Arc<Self> {
        Arc::new(Self {
            acl,
            objects,
            files,
            pubsub,
            persistence,
        })
    }

    async fn subject_for(&self, user: &str) -> Arc<SubjectAcl> {
        self.acl.resolve_subject(&self.objects, user).await
    }

    // --- Object realm ---

    pub async fn get_object(&self, user: &str, id: &str) -> CoreResult<Option<Object>> {
        let subject = self.subject_for(user).await;
        let id = ObjectId::parse(id)?;
        self.objects.get_object(&subject, &id).await
    }

    pub async fn get_keys(&self, user: &str, pattern: &str) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        Ok(self.objects.get_keys(&subject, pattern).await)
    }

    pub async fn get_object_list(
        &self,
        user: &str,
        startkey: Option<&str>,
        endkey: Option<&str>,
        include_docs: bool,
    ) -> CoreResult<Vec<ObjectRow>> {
        let subject = self.subject_for(user).await;
        Ok(self.objects.get_object_list(&subject, startkey, endkey, include_docs).await)
    }

    /// `setObject`, strips any caller-supplied `acl` field before dispatch —
    /// callers may not assign their own ACL directly.
    pub async fn set_object(
        self: &Arc<Self>,
        user: &str,
        id: &str,
        mut obj: Value,
        options: SetOptions,
    ) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        let id = ObjectId::parse(id)?;
        if let Some(map) = obj.as_object_mut() {
            map.remove("acl");
        }
        self.objects.set_object(&subject, &id, obj, &options).await
    }

    pub async fn extend_object(
        self: &Arc<Self>,
        user: &str,
        id: &str,
        patch: Value,
        password: Option<&str>,
    ) -> CoreResult<Object> {
        let subject = self.subject_for(user).await;
        let id = ObjectId::parse(id)?;
        self.objects.extend_object(&subject, &id, patch, password).await
    }

    pub async fn del_object(self: &Arc<Self>, user: &str, id: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        let id = ObjectId::parse(id)?;
        self.objects.del_object(&subject, &id).await
    }

    pub async fn chown_object(
        self: &Arc<Self>,
        user: &str,
        pattern: &str,
        owner: &str,
        owner_group: &str,
    ) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        Ok(self.objects.chown_object(&subject, pattern, owner, owner_group).await)
    }

    pub async fn chmod_object(
        self: &Arc<Self>,
        user: &str,
        pattern: &str,
        object_bits: Option<PermissionBits>,
        state_bits: Option<PermissionBits>,
    ) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        Ok(self.objects.chmod_object(&subject, pattern, object_bits, state_bits).await)
    }

    pub async fn find_object(&self, user: &str, id_or_name: &str, type_filter: Option<&str>) -> CoreResult<Option<String>> {
        let subject = self.subject_for(user).await;
        Ok(self.objects.find_object(&subject, id_or_name, type_filter).await)
    }

    pub async fn destroy_db(&self, user: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        self.objects.destroy_db(&subject).await
    }

    pub async fn get_object_view(
        &self,
        user: &str,
        design: &str,
        search: &str,
        startkey: Option<&str>,
        endkey: Option<&str>,
    ) -> CoreResult<Vec<ViewRow>> {
        let subject = self.subject_for(user).await;
        view::get_object_view(&self.objects, &subject, design, search, startkey, endkey).await
    }

    pub async fn apply_view(
        &self,
        user: &str,
        func: &ViewSpec,
        startkey: Option<&str>,
        endkey: Option<&str>,
    ) -> CoreResult<Vec<ViewRow>> {
        let subject = self.subject_for(user).await;
        view::apply_view(&self.objects, &subject, func, startkey, endkey).await
    }

    // --- File realm ---

    pub async fn write_file(
        self: &Arc<Self>,
        user: &str,
        id: &str,
        name: &str,
        data: Vec<u8>,
        mime_type: Option<String>,
    ) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        self.files.write_file(&subject, id, name, data, mime_type).await
    }

    pub async fn read_file(&self, user: &str, id: &str, name: &str) -> CoreResult<(Vec<u8>, String)> {
        let subject = self.subject_for(user).await;
        self.files.read_file(&subject, id, name).await
    }

    pub async fn unlink(self: &Arc<Self>, user: &str, id: &str, name: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        self.files.unlink(&subject, id, name).await
    }

    pub async fn read_dir(&self, user: &str, id: &str, name: &str, filter: bool) -> CoreResult<Vec<DirEntry>> {
        let subject = self.subject_for(user).await;
        self.files.read_dir(&subject, id, name, filter).await
    }

    pub async fn rename(self: &Arc<Self>, user: &str, id: &str, old_name: &str, new_name: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        self.files.rename(&subject, id, old_name, new_name).await
    }

    pub async fn touch(self: &Arc<Self>, user: &str, id: &str, pattern: &str) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        self.files.touch(&subject, id, pattern).await
    }

    pub async fn rm(self: &Arc<Self>, user: &str, id: &str, pattern: &str) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        self.files.rm(&subject, id, pattern).await
    }

    pub async fn mkdir(&self, user: &str, id: &str, dirname: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        self.files.mkdir(&subject, id, dirname).await
    }

    pub async fn chown_file(
        self: &Arc<Self>,
        user: &str,
        id: &str,
        pattern: &str,
        owner: &str,
        owner_group: &str,
    ) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        self.files.chown_file(&subject, id, pattern, owner, owner_group).await
    }

    pub async fn chmod_file(
        self: &Arc<Self>,
        user: &str,
        id: &str,
        pattern: &str,
        mode: PermissionBits,
    ) -> CoreResult<Vec<String>> {
        let subject = self.subject_for(user).await;
        self.files.chmod_file(&subject, id, pattern, mode).await
    }

    pub async fn enable_file_cache(&self, user: &str, enabled: bool) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        self.files.enable_file_cache(&subject, enabled)
    }

    // --- Pub/sub ---

    pub async fn subscribe(&self, user: &str, conn_id: u64, realm: Realm, pattern: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        let allowed = match realm {
            Realm::Objects => subject.object.list || subject.is_admin(),
            Realm::Files => subject.file.list || subject.is_admin(),
        };
        if !allowed {
            return Err(crate::core::errors::CoreError::PermissionError);
        }
        self.pubsub.subscribe(conn_id, realm, pattern);
        Ok(())
    }

    pub async fn unsubscribe(&self, user: &str, conn_id: u64, realm: Realm, pattern: &str) -> CoreResult<()> {
        let subject = self.subject_for(user).await;
        let allowed = match realm {
            Realm::Objects => subject.object.list || subject.is_admin(),
            Realm::Files => subject.file.list || subject.is_admin(),
        };
        if !allowed {
            return Err(crate::core::errors::CoreError::PermissionError);
        }
        self.pubsub.unsubscribe(conn_id, realm, pattern);
        Ok(())
    }

    // --- Lifecycle ---

    /// `destroy()`: forces a synchronous flush of both the object snapshot
    /// and every dirty file sidecar, for use on graceful shutdown.
    pub async fn destroy(&self) {
        self.persistence.flush(&self.objects).await;
        self.files.flush_force().await;
    }
}
