//! File-backed node state store.
//!
//! Metadata lives in a single JSON document inside the client's state
//! directory:
//!
//! ```json
//! { "version": 1, "meta": { "zone": "us-east" } }
//! ```
//!
//! Every merge rewrites the document through a temp file in the same
//! directory which is fsynced and then renamed over the old one, so a
//! crash leaves either the old or the new document, never a mix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_core::{Meta, MetaDelta};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StorageError;
use crate::store::NodeStateStore;

/// File name of the metadata document.
pub const META_FILE_NAME: &str = "node_meta.json";

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct MetaDocument {
    version: u32,
    #[serde(default)]
    meta: Meta,
}

/// [`NodeStateStore`] persisting metadata to a JSON file.
///
/// Merges are serialized by an internal lock that also guards the last
/// committed copy, so a merge never has to re-read the file.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    path: PathBuf,
    committed: Mutex<Meta>,
}

impl FileStateStore {
    /// Open (or initialise) the store in `dir`.
    ///
    /// Creates the directory if needed, removes temp files left behind by
    /// an interrupted write and loads the current document. A missing
    /// document is an empty store.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io("create directory", &dir, e))?;

        remove_stale_temp_files(&dir).await?;

        let path = dir.join(META_FILE_NAME);
        let meta = load(&path).await?;
        tracing::debug!(path = %path.display(), keys = meta.len(), "opened node state store");

        Ok(Self {
            dir,
            path,
            committed: Mutex::new(meta),
        })
    }

    /// Path of the metadata document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, meta: &Meta) -> Result<(), StorageError> {
        let doc = MetaDocument {
            version: CURRENT_VERSION,
            meta: meta.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;
        atomic_write(&self.path, &bytes).await
    }
}

#[async_trait]
impl NodeStateStore for FileStateStore {
    async fn get_node_meta(&self) -> Result<Meta, StorageError> {
        Ok(self.committed.lock().await.clone())
    }

    /// Commits by renaming a synced temp file over the document.
    ///
    /// Once the rename succeeds the merge returns `Ok` even if syncing the
    /// state directory fails afterwards; that failure is logged. The new
    /// document is already visible, so an error here would leave callers
    /// believing the merge did not happen. A power loss before the
    /// directory reaches disk may then roll the document back to the
    /// previous version.
    async fn merge_node_meta(&self, delta: &MetaDelta) -> Result<(), StorageError> {
        let mut committed = self.committed.lock().await;
        let next = delta.applied(&committed);
        if next == *committed {
            return Ok(());
        }

        self.persist(&next).await?;
        *committed = next;
        drop(committed);

        // The rename is the commit point. Syncing the directory only makes
        // the rename itself survive power loss.
        if let Err(e) = sync_dir(&self.dir).await {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to sync state directory");
        }
        Ok(())
    }
}

async fn load(path: &Path) -> Result<Meta, StorageError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Meta::new()),
        Err(e) => return Err(StorageError::io("read", path, e)),
    };

    let doc: MetaDocument =
        serde_json::from_slice(&bytes).map_err(|e| StorageError::corrupt(path, e.to_string()))?;
    if doc.version != CURRENT_VERSION {
        return Err(StorageError::corrupt(
            path,
            format!("unsupported version {}", doc.version),
        ));
    }
    Ok(doc.meta)
}

fn temp_prefix() -> String {
    format!("{META_FILE_NAME}.tmp.")
}

/// Write `data` to a temp file next to `path`, fsync it, then rename it
/// over `path`. On failure the temp file is removed and `path` is left
/// untouched.
async fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let temp_path = path.with_file_name(format!("{}{}", temp_prefix(), Uuid::new_v4()));

    if let Err(e) = write_synced(&temp_path, data).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StorageError::io("rename", path, e));
    }
    Ok(())
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StorageError::io("create", path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| StorageError::io("set permissions", path, e))?;
    }

    file.write_all(data)
        .await
        .map_err(|e| StorageError::io("write", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::io("sync", path, e))?;
    Ok(())
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn remove_stale_temp_files(dir: &Path) -> Result<(), StorageError> {
    let prefix = temp_prefix();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StorageError::io("read directory", dir, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io("read directory", dir, e))?
    {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            let stale = entry.path();
            tracing::info!(path = %stale.display(), "removing temp file from interrupted write");
            tokio::fs::remove_file(&stale)
                .await
                .map_err(|e| StorageError::io("remove", &stale, e))?;
        }
    }
    Ok(())
}
