// src/core/persistence/backup.rs

//! Rotating gzip backups of the object snapshot: `<root>/backup-objects/
//! YYYY-MM-DD_HH-MM_objects.json.gz`, with retention by count (`files`) and
//! age (`hours`).

use crate::core::errors::CoreResult;
use crate::core::types::{Object, ObjectId};
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// The `backup:{disabled, files, hours, period, path}` config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub disabled: bool,
    /// Minimum number of most-recent backups to always retain.
    pub files: usize,
    /// Age, in hours, beyond which a backup is eligible for deletion once
    /// the `files` floor is satisfied.
    pub hours: u64,
    /// Minimum interval between backups.
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Directory backups are written under (relative to the data dir unless absolute).
    pub path: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            files: 24,
            hours: 48,
            period: Duration::from_secs(3600),
            path: "backup-objects".to_string(),
        }
    }
}

fn backup_dir(data_dir: &Path, config: &BackupConfig) -> PathBuf {
    let p = Path::new(&config.path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        data_dir.join(p)
    }
}

/// Writes a new gzip backup if `disabled` is false. Callers are expected to
/// have already checked the `period` elapsed-time gate.
pub async fn write_backup(
    data_dir: &Path,
    config: &BackupConfig,
    objects: &BTreeMap<ObjectId, Object>,
) -> CoreResult<PathBuf> {
    let dir = backup_dir(data_dir, config);
    tokio::fs::create_dir_all(&dir).await?;

    let serializable: BTreeMap<&str, &Object> =
        objects.iter().map(|(id, obj)| (id.as_str(), obj)).collect();
    let json_bytes = serde_json::to_vec(&serializable)?;

    let stamp = Local::now().format("%Y-%m-%d_%H-%M").to_string();
    let filename = format!("{stamp}_objects.json.gz");
    let path = dir.join(&filename);

    let path_clone = path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = std::fs::File::create(&path_clone)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&json_bytes)?;
        encoder.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))??;

    info!("Wrote rotating backup {:?}", path);
    prune_backups(&dir, config).await?;
    Ok(path)
}

/// Enforces retention: keep at least `files` most recent backups; beyond
/// that, delete anything older than `hours` hours by filename timestamp.
async fn prune_backups(dir: &Path, config: &BackupConfig) -> CoreResult<()> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(stamp) = parse_backup_timestamp(&name) {
            entries.push((stamp, entry.path()));
        }
    }
    entries.sort_by_key(|(stamp, _)| *stamp);
    entries.reverse(); // newest first

    if entries.len() <= config.files {
        return Ok(());
    }

    let cutoff = Local::now() - chrono::Duration::hours(config.hours as i64);
    for (stamp, path) in entries.into_iter().skip(config.files) {
        if stamp < cutoff.naive_local() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to prune old backup {:?}: {}", path, e);
            } else {
                info!("Pruned old backup {:?}", path);
            }
        }
    }
    Ok(())
}

fn parse_backup_timestamp(filename: &str) -> Option<chrono::NaiveDateTime> {
    let stamp = filename.strip_suffix("_objects.json.gz")?;
    chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d_%H-%M").ok()
}
