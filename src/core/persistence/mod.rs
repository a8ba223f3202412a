// src/core/persistence/mod.rs

//! Persistence: a debounced snapshot timer plus rotating gzip backups,
//! built on a debounce-and-atomic-save pattern.

pub mod backup;
pub mod snapshot;

pub use backup::BackupConfig;

use crate::core::object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::error;

const SNAPSHOT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Owns the debounce timer for snapshot writes and the bookkeeping needed
/// to gate periodic gzip backups.
pub struct PersistenceHandle {
    pub data_dir: PathBuf,
    pub backup_config: BackupConfig,
    timer: Mutex<Option<JoinHandle<()>>>,
    last_backup: Mutex<Option<Instant>>,
    saving: AtomicBool,
}

impl PersistenceHandle {
    pub fn new(data_dir: PathBuf, backup_config: BackupConfig) -> Self {
        Self {
            data_dir,
            backup_config,
            timer: Mutex::new(None),
            last_backup: Mutex::new(None),
            saving: AtomicBool::new(false),
        }
    }

    /// Arms (or re-arms) the debounced snapshot timer. Every mutation calls
    /// this; only the most recent call within the debounce window actually
    /// fires a write, per the 5s delay rule.
    pub fn schedule_snapshot(self: &Arc<Self>, store: Arc<ObjectStore>) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut guard = this.timer.lock().await;
            if let Some(old) = guard.take() {
                old.abort();
            }
            let this_for_timer = this.clone();
            *guard = Some(tokio::spawn(async move {
                tokio::time::sleep(SNAPSHOT_DEBOUNCE).await;
                this_for_timer.flush(&store).await;
            }));
        });
    }

    /// Writes the snapshot immediately, then checks whether a gzip backup
    /// is due given `period`/`disabled`.
    pub async fn flush(&self, store: &Arc<ObjectStore>) {
        if self.saving.swap(true, Ordering::SeqCst) {
            return;
        }
        let objects = store.snapshot_map().await;
        if let Err(e) = snapshot::write_snapshot(&self.data_dir, &objects).await {
            error!("Failed to write object snapshot: {}", e);
        }

        if !self.backup_config.disabled {
            let due = {
                let last = self.last_backup.lock().await;
                match *last {
                    Some(t) => t.elapsed() >= self.backup_config.period,
                    None => true,
                }
            };
            if due {
                match backup::write_backup(&self.data_dir, &self.backup_config, &objects).await {
                    Ok(_) => {
                        *self.last_backup.lock().await = Some(Instant::now());
                    }
                    Err(e) => error!("Failed to write rotating backup: {}", e),
                }
            }
        }
        self.saving.store(false, Ordering::SeqCst);
    }

    /// Deletes the snapshot file (`destroyDB`). Backups and `files/` are
    /// left untouched.
    pub async fn destroy(&self) -> crate::core::errors::CoreResult<()> {
        snapshot::destroy_snapshot(&self.data_dir).await
    }
}
