// src/core/file_store/sidecar.rs

//! The per-object-id sidecar descriptor map (`_data.json`): loading, saving,
//! and the debounced dirty-id batching that bundles writes from many
//! mutated ids into one flush per second.

use crate::core::errors::CoreResult;
use crate::core::types::FileAcl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One entry of a sidecar map: metadata for a single relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub binary: bool,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "modifiedAt")]
    pub modified_at: i64,
    pub acl: Option<FileAcl>,
}

/// `relativePath -> descriptor`, the full contents of one id's `_data.json`.
pub type SidecarMap = BTreeMap<String, FileDescriptor>;

pub fn files_root(data_dir: &Path) -> PathBuf {
    data_dir.join("files")
}

pub fn id_dir(data_dir: &Path, id: &str) -> PathBuf {
    files_root(data_dir).join(id)
}

pub fn sidecar_path(data_dir: &Path, id: &str) -> PathBuf {
    id_dir(data_dir, id).join("_data.json")
}

/// Loads an id's sidecar, returning an empty map if it doesn't exist yet.
pub async fn load_sidecar(data_dir: &Path, id: &str) -> SidecarMap {
    let path = sidecar_path(data_dir, id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Corrupt sidecar {:?}: {}. Starting empty.", path, e);
            SidecarMap::new()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => SidecarMap::new(),
        Err(e) => {
            warn!("Failed to read sidecar {:?}: {}. Starting empty.", path, e);
            SidecarMap::new()
        }
    }
}

/// Writes an id's sidecar back to disk, creating its directory if needed.
pub async fn save_sidecar(data_dir: &Path, id: &str, map: &SidecarMap) -> CoreResult<()> {
    let dir = id_dir(data_dir, id);
    tokio::fs::create_dir_all(&dir).await?;
    let bytes = serde_json::to_vec_pretty(map)?;
    tokio::fs::write(sidecar_path(data_dir, id), bytes).await?;
    Ok(())
}
