//! Session stores: one JSON file per session on disk, or an in-memory map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::error::RegistryError;
use crate::store::traits::SessionStore;
use crate::worker::state::SessionRecord;

/// File-backed store: `<dir>/<session_id>.json`.
///
/// Writes go to a temp file and are renamed into place, so a reader never
/// sees a half-written record.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    async fn write_atomic(&self, record: &SessionRecord) -> Result<(), RegistryError> {
        let path = self.record_path(&record.session_id);
        let tmp = self.dir.join(format!(".{}.json.tmp", record.session_id));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn insert(&mut self, record: &SessionRecord) -> Result<(), RegistryError> {
        if fs::try_exists(self.record_path(&record.session_id)).await? {
            return Err(RegistryError::AlreadyExists {
                session_id: record.session_id.clone(),
            });
        }
        self.write_atomic(record).await
    }

    async fn update(&mut self, record: &SessionRecord) -> Result<(), RegistryError> {
        if !fs::try_exists(self.record_path(&record.session_id)).await? {
            return Err(RegistryError::NotFound {
                session_id: record.session_id.clone(),
            });
        }
        self.write_atomic(record).await
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
        let path = self.record_path(session_id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RegistryError> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_record {
                continue;
            }
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable session record: {e}"),
            }
        }
        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(records)
    }
}

/// In-memory store (tests and dry runs).
#[derive(Default)]
pub struct MemorySessionStore {
    records: HashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&mut self, record: &SessionRecord) -> Result<(), RegistryError> {
        if self.records.contains_key(&record.session_id) {
            return Err(RegistryError::AlreadyExists {
                session_id: record.session_id.clone(),
            });
        }
        self.records
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn update(&mut self, record: &SessionRecord) -> Result<(), RegistryError> {
        match self.records.get_mut(&record.session_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(RegistryError::NotFound {
                session_id: record.session_id.clone(),
            }),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
        Ok(self.records.get(session_id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RegistryError> {
        let mut records: Vec<SessionRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(records)
    }
}
