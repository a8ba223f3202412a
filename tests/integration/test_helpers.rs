// tests/integration/test_helpers.rs

//! Test helpers: a `TestContext` wiring together a full, tempdir-backed
//! `RequestFacade` the way `server::initialization::setup` does, minus the
//! network listener.

use objectdb::core::acl::AclEngine;
use objectdb::core::facade::RequestFacade;
use objectdb::core::file_store::FileStore;
use objectdb::core::object_store::ObjectStore;
use objectdb::core::persistence::{BackupConfig, PersistenceHandle};
use objectdb::core::pubsub::PubSubDispatcher;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestContext {
    pub facade: Arc<RequestFacade>,
    _tempdir: TempDir,
}

impl TestContext {
    /// Builds a fresh, empty store rooted at a new temporary directory.
    pub async fn new() -> Self {
        let tempdir = TempDir::new().expect("tempdir");
        let data_dir = tempdir.path().to_path_buf();

        let acl = Arc::new(AclEngine::new());
        let pubsub = Arc::new(PubSubDispatcher::new());
        let persistence = Arc::new(PersistenceHandle::new(
            data_dir.clone(),
            BackupConfig {
                disabled: true,
                ..BackupConfig::default()
            },
        ));

        let objects = ObjectStore::new(acl.clone(), pubsub.clone(), persistence.clone());
        objects.load_from_disk().await;

        let files = FileStore::new(data_dir.join("files"), acl.clone(), pubsub.clone(), false);

        let facade = RequestFacade::new(acl, objects, files, pubsub, persistence);

        Self {
            facade,
            _tempdir: tempdir,
        }
    }
}
