// src/core/persistence/snapshot.rs

//! Loading and saving the canonical `objects.json` snapshot plus its
//! `.bak` predecessor, with an atomic write-then-rename, grounded on the
//! teacher's `persistence::spldb_saver::SpldbSaverTask::perform_save_logic`
//! (temp file, then atomic rename into place).

use crate::core::errors::CoreResult;
use crate::core::types::{Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join("objects.json")
}

pub fn backup_snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join("objects.json.bak")
}

/// Serializes the full object map to `objects.json`, rotating the previous
/// snapshot into `objects.json.bak` first, then atomically renaming a
/// temporary file into place.
pub async fn write_snapshot(
    data_dir: &Path,
    objects: &BTreeMap<ObjectId, Object>,
) -> CoreResult<()> {
    tokio::fs::create_dir_all(data_dir).await?;

    let snapshot = snapshot_path(data_dir);
    let backup = backup_snapshot_path(data_dir);

    if tokio::fs::metadata(&snapshot).await.is_ok() {
        tokio::fs::copy(&snapshot, &backup).await?;
    }

    let serializable: BTreeMap<&str, &Object> =
        objects.iter().map(|(id, obj)| (id.as_str(), obj)).collect();
    let bytes = serde_json::to_vec_pretty(&serializable)?;

    let tmp_path = data_dir.join(format!("objects.json.tmp.{}", rand::random::<u32>()));
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, &snapshot).await?;

    info!("Wrote object snapshot ({} objects) to {:?}", objects.len(), snapshot);
    Ok(())
}

/// Loads `objects.json` on startup; on parse failure falls back to `.bak`;
/// on second failure, starts empty and logs.
pub async fn load_snapshot(data_dir: &Path) -> BTreeMap<ObjectId, Object> {
    let snapshot = snapshot_path(data_dir);
    match try_load(&snapshot).await {
        Ok(map) => return map,
        Err(e) => {
            warn!("Failed to load snapshot {:?}: {}. Trying backup.", snapshot, e);
        }
    }

    let backup = backup_snapshot_path(data_dir);
    match try_load(&backup).await {
        Ok(map) => map,
        Err(e) => {
            error!(
                "Failed to load backup snapshot {:?}: {}. Starting with an empty store.",
                backup, e
            );
            BTreeMap::new()
        }
    }
}

async fn try_load(path: &Path) -> CoreResult<BTreeMap<ObjectId, Object>> {
    let bytes = tokio::fs::read(path).await?;
    let raw: BTreeMap<String, Object> = serde_json::from_slice(&bytes)?;
    let mut map = BTreeMap::new();
    for (id, obj) in raw {
        match ObjectId::parse(id) {
            Ok(id) => {
                map.insert(id, obj);
            }
            Err(e) => warn!("Skipping object with invalid id while loading snapshot: {}", e),
        }
    }
    Ok(map)
}

/// Deletes only the canonical snapshot. `objects.json.bak` is left in
/// place, so a restart after `destroyDB` still falls back to it; `destroyDB`
/// also intentionally leaves `backup-objects/` and `files/` untouched.
pub async fn destroy_snapshot(data_dir: &Path) -> CoreResult<()> {
    match tokio::fs::remove_file(snapshot_path(data_dir)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
