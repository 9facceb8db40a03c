//! Persistence for the registry document.
//!
//! The whole set of managed servers lives in a single JSON file,
//! `{"servers": [...]}`. Every mutation is a read-modify-write of the whole
//! document, so all of them run under one async mutex and land on disk via a
//! temp-file rename.

use std::path::PathBuf;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::server_record::ServerRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("server registry file is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("failed to access server registry file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub servers: Vec<ServerRecord>,
}

pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Loads the manifest; a missing file is an empty manifest, an
    /// unparseable one is `Corrupt`.
    pub async fn load(&self) -> Result<Manifest, StoreError> {
        if !self.path.exists() {
            return Ok(Manifest::default());
        }
        let text = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&text).map_err(StoreError::Corrupt)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<ServerRecord>, StoreError> {
        Ok(self.load().await?.servers.into_iter().find(|s| s.id == id))
    }

    pub async fn add(&self, record: ServerRecord) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut manifest = self.load().await?;
        manifest.servers.push(record);
        self.persist(&manifest).await
    }

    /// Removes and returns the record for `id`, if present.
    pub async fn remove(&self, id: Uuid) -> Result<Option<ServerRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut manifest = self.load().await?;
        let index = manifest.servers.iter().position(|s| s.id == id);
        let removed = index.map(|i| manifest.servers.remove(i));
        if removed.is_some() {
            self.persist(&manifest).await?;
        }
        Ok(removed)
    }

    /// Best-effort bump of `last_accessed_at`; failures are logged, never
    /// surfaced.
    pub async fn touch(&self, id: Uuid) {
        let _guard = self.write_lock.lock().await;
        let Ok(mut manifest) = self.load().await else {
            return;
        };
        if let Some(record) = manifest.servers.iter_mut().find(|s| s.id == id) {
            record.last_accessed_at = chrono::Utc::now().timestamp_millis();
            if let Err(e) = self.persist(&manifest).await {
                debug!("failed to update last-accessed for {id}: {e}");
            }
        }
    }

    /// Atomic write: serialize to a sibling temp file, then rename over the
    /// live document so readers never observe a torn write.
    async fn persist(&self, manifest: &Manifest) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(manifest).map_err(StoreError::Corrupt)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
