//! Local JSON cache of the Redmine project.
//!
//! `init` copies everything the later commands need into the cache so they
//! can run offline against Redmine and be re-run after a partial failure:
//!
//! ```text
//! <cache_dir>/
//!   project.json
//!   issues/<id>.json
//!   versions/<id>.json
//!   users/<id>.json
//!   attachments/<id>.json
//!   attachments/<id>.data      (downloaded file content)
//!   <resource>/.complete        (every record of the resource is stored)
//! ```
//!
//! Every write goes to `<file name>.tmp` first and is then renamed over the
//! target, so an interrupted run never leaves a truncated record behind. A
//! resource directory without its `.complete` marker was interrupted between
//! two records and must not be trusted as a full copy.

use crate::converters::{AttachmentIndex, RedmineUserIndex};
use crate::error::MigrateError;
use crate::model::{ProjectInfo, RedmineAttachment, RedmineIssue, RedmineUser, RedmineVersion};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A record stored as `<cache_dir>/<RESOURCE>/<id>.json`.
pub trait CacheRecord: Serialize + DeserializeOwned {
    /// Directory name under the cache root.
    const RESOURCE: &'static str;

    fn record_id(&self) -> u64;
}

impl CacheRecord for RedmineIssue {
    const RESOURCE: &'static str = "issues";

    fn record_id(&self) -> u64 {
        self.id
    }
}

impl CacheRecord for RedmineVersion {
    const RESOURCE: &'static str = "versions";

    fn record_id(&self) -> u64 {
        self.id
    }
}

impl CacheRecord for RedmineUser {
    const RESOURCE: &'static str = "users";

    fn record_id(&self) -> u64 {
        self.id
    }
}

impl CacheRecord for RedmineAttachment {
    const RESOURCE: &'static str = "attachments";

    fn record_id(&self) -> u64 {
        self.id
    }
}

/// Filesystem-backed record store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resource_dir<T: CacheRecord>(&self) -> PathBuf {
        self.root.join(T::RESOURCE)
    }

    fn record_path<T: CacheRecord>(&self, id: u64) -> PathBuf {
        self.resource_dir::<T>().join(format!("{id}.json"))
    }

    /// Path of the downloaded content of attachment `id`.
    pub fn blob_path(&self, id: u64) -> PathBuf {
        self.root
            .join(RedmineAttachment::RESOURCE)
            .join(format!("{id}.data"))
    }

    fn marker_path<T: CacheRecord>(&self) -> PathBuf {
        self.resource_dir::<T>().join(".complete")
    }

    /// Whether every record of the resource was stored by `init`.
    pub async fn has_resource<T: CacheRecord>(&self) -> bool {
        tokio::fs::try_exists(self.marker_path::<T>())
            .await
            .unwrap_or(false)
    }

    pub async fn has<T: CacheRecord>(&self, id: u64) -> bool {
        tokio::fs::try_exists(self.record_path::<T>(id))
            .await
            .unwrap_or(false)
    }

    pub async fn load<T: CacheRecord>(&self, id: u64) -> Result<T, MigrateError> {
        read_json(&self.record_path::<T>(id)).await
    }

    pub async fn save<T: CacheRecord>(&self, record: &T) -> Result<(), MigrateError> {
        let path = self.record_path::<T>(record.record_id());
        write_json(&path, record).await?;
        debug!("Stored {} {} to {}", T::RESOURCE, record.record_id(), path.display());
        Ok(())
    }

    /// Create the resource directory, keeping any record already in it.
    pub async fn create_resource<T: CacheRecord>(&self) -> Result<(), MigrateError> {
        let dir = self.resource_dir::<T>();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MigrateError::from_io(&dir, e))
    }

    /// Drop whatever a previous run left of the resource and start empty.
    pub async fn reset_resource<T: CacheRecord>(&self) -> Result<(), MigrateError> {
        let dir = self.resource_dir::<T>();
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed partial {} cache", T::RESOURCE),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MigrateError::from_io(&dir, e)),
        }
        self.create_resource::<T>().await
    }

    /// Mark the resource as fully cached, even when it holds no record.
    pub async fn complete_resource<T: CacheRecord>(&self) -> Result<(), MigrateError> {
        write_atomic(&self.marker_path::<T>(), b"").await
    }

    /// Every record of a resource, sorted by id.
    pub async fn enumerate<T: CacheRecord>(&self) -> Result<Vec<T>, MigrateError> {
        let dir = self.resource_dir::<T>();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MigrateError::CacheMissing { path: dir.clone() },
            _ => MigrateError::from_io(&dir, e),
        })?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrateError::from_io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                records.push(read_json::<T>(&path).await?);
            }
        }
        records.sort_by_key(T::record_id);
        Ok(records)
    }

    pub async fn save_project(&self, project: &ProjectInfo) -> Result<(), MigrateError> {
        write_json(&self.root.join("project.json"), project).await
    }

    pub async fn load_project(&self) -> Result<ProjectInfo, MigrateError> {
        read_json(&self.root.join("project.json")).await
    }

    /// Store attachment content; returns the blob path.
    pub async fn save_blob(&self, id: u64, bytes: &[u8]) -> Result<PathBuf, MigrateError> {
        let path = self.blob_path(id);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, MigrateError> {
    let raw = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MigrateError::CacheMissing {
            path: path.to_path_buf(),
        },
        _ => MigrateError::from_io(path, e),
    })?;
    serde_json::from_slice(&raw).map_err(|source| MigrateError::CacheCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), MigrateError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| MigrateError::Internal(format!("Failed to serialise {}: {e}", path.display())))?;
    write_atomic(path, &bytes).await
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MigrateError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MigrateError::from_io(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| MigrateError::from_io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| MigrateError::from_io(path, e))
}

// ── Offline project view ─────────────────────────────────────────────────

/// The Redmine project as stored in the cache.
///
/// Used by every command after `init`; nothing here touches the network.
#[derive(Debug, Clone)]
pub struct CachedProject {
    store: CacheStore,
    info: ProjectInfo,
}

impl CachedProject {
    /// Open the cache; fails with [`MigrateError::CacheMissing`] before `init`.
    pub async fn open(store: CacheStore) -> Result<Self, MigrateError> {
        let info = store.load_project().await?;
        info!("Got redmine project {} from cache", info.id);
        Ok(Self { store, info })
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub async fn issues(&self) -> Result<Vec<RedmineIssue>, MigrateError> {
        self.store.enumerate().await
    }

    pub async fn versions(&self) -> Result<Vec<RedmineVersion>, MigrateError> {
        self.store.enumerate().await
    }

    pub async fn participants(&self) -> Result<Vec<RedmineUser>, MigrateError> {
        self.store.enumerate().await
    }

    pub async fn users_index(&self) -> Result<RedmineUserIndex, MigrateError> {
        Ok(self
            .participants()
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect())
    }

    pub async fn attachments(&self) -> Result<Vec<RedmineAttachment>, MigrateError> {
        self.store.enumerate().await
    }

    pub async fn attachments_index(&self) -> Result<AttachmentIndex, MigrateError> {
        Ok(self
            .attachments()
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect())
    }
}
