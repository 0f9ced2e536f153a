/// Snapshot Store - Durable copy of the directory snapshot
use crate::{
    directory::DirectorySnapshot,
    error::{TailnetError, TailnetResult},
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};

/// JSON file holding the last known snapshot
///
/// Layout: `{"ip_to_device": {addr: device}, "last_update": "<Date header>"}`
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path the next snapshot is staged in before the rename
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the snapshot; a missing file is an empty snapshot
    pub async fn load(&self) -> TailnetResult<DirectorySnapshot> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DirectorySnapshot::empty())
            }
            Err(e) => {
                return Err(TailnetError::Persistence(format!(
                    "Failed to read cache file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut snapshot: DirectorySnapshot = serde_json::from_slice(&data)
            .map_err(|e| TailnetError::Persistence(format!("Failed to unmarshal cache: {}", e)))?;

        let dropped = snapshot.prune_inconsistent();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped inconsistent address mappings from cache file");
        }

        Ok(snapshot)
    }

    /// Write the snapshot with write-to-temp + fsync + rename
    pub async fn save(&self, snapshot: &DirectorySnapshot) -> TailnetResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                TailnetError::Persistence(format!("Failed to create cache directory: {}", e))
            })?;
        }

        let data = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| TailnetError::Persistence(format!("Failed to marshal cache: {}", e)))?;

        let tmp_path = self.tmp_path();
        let mut file = fs::File::create(&tmp_path).await.map_err(|e| {
            TailnetError::Persistence(format!("Failed to create {}: {}", tmp_path.display(), e))
        })?;
        file.write_all(&data)
            .await
            .map_err(|e| TailnetError::Persistence(format!("Failed to write cache file: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| TailnetError::Persistence(format!("Failed to sync cache file: {}", e)))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            TailnetError::Persistence(format!("Failed to replace cache file: {}", e))
        })?;

        Ok(())
    }
}
