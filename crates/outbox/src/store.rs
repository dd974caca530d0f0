//! Durable storage for outbox entries.
//!
//! A [`PersistentStore`] never fails towards its caller: missing or corrupted
//! state reads as an empty outbox, and write failures are logged and
//! swallowed. The save flow carries on regardless, so durability is
//! best-effort by contract.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use motodesk_core::{OutboxId, file_safe};
use serde_json::Value;

use crate::types::OutboxEntry;

/// Key/list storage for outboxes.
pub trait PersistentStore: Send + Sync {
    /// All entries stored under `key`, oldest first. Never fails.
    fn read_list(&self, key: &str) -> Vec<OutboxEntry>;

    /// Replace the list stored under `key`.
    fn write_list(&self, key: &str, list: &[OutboxEntry]);

    /// Add one entry to the latest persisted state of `key`.
    fn append(&self, key: &str, entry: &OutboxEntry);

    /// Drop the entry with `id` from the latest persisted state of `key`.
    /// Unknown ids are a no-op.
    fn delete(&self, key: &str, id: &OutboxId);
}

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage unavailable")]
    Unavailable,
}

/// In-memory store holding each outbox as one serialized JSON array, the way
/// browser `localStorage` does. Used by tests and demo mode.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store raw text under `key`, bypassing serialization.
    pub fn put_raw(&self, key: &str, raw: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), raw.into());
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Make every subsequent write fail (quota exceeded, storage disabled).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn parse_array(key: &str, raw: Option<&String>) -> Vec<Value> {
        let Some(raw) = raw else {
            return Vec::new();
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                tracing::warn!(key, "stored outbox is not a list; treating as empty");
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "stored outbox is not valid JSON; treating as empty");
                Vec::new()
            }
        }
    }

    /// Serialized form of `entry`, or `None` (logged) if it cannot be encoded.
    fn to_item(key: &str, entry: &OutboxEntry) -> Option<Value> {
        match serde_json::to_value(entry) {
            Ok(item) => Some(item),
            Err(err) => {
                tracing::warn!(key, id = %entry.id, error = %err, "failed to serialize outbox entry; dropped");
                None
            }
        }
    }

    /// Read-modify-write of the raw array under one write lock.
    fn modify(&self, key: &str, f: impl FnOnce(&mut Vec<Value>)) {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut items = Self::parse_array(key, map.get(key));
        f(&mut items);

        if self.fail_writes.load(Ordering::SeqCst) {
            tracing::warn!(key, error = %StoreError::Unavailable, "outbox write dropped");
            return;
        }
        map.insert(key.to_string(), Value::Array(items).to_string());
    }
}

impl PersistentStore for InMemoryStore {
    fn read_list(&self, key: &str) -> Vec<OutboxEntry> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Self::parse_array(key, map.get(key))
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<OutboxEntry>(item) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(key, error = %err, "skipping unreadable outbox entry");
                    None
                }
            })
            .collect()
    }

    fn write_list(&self, key: &str, list: &[OutboxEntry]) {
        let items: Vec<Value> = list.iter().filter_map(|entry| Self::to_item(key, entry)).collect();
        self.modify(key, |stored| *stored = items);
    }

    fn append(&self, key: &str, entry: &OutboxEntry) {
        if let Some(item) = Self::to_item(key, entry) {
            self.modify(key, |stored| stored.push(item));
        }
    }

    fn delete(&self, key: &str, id: &OutboxId) {
        // Filter on the raw id so entries this build cannot decode survive.
        self.modify(key, |stored| {
            stored.retain(|item| item.get("id").and_then(Value::as_str) != Some(id.as_str()))
        });
    }
}

/// Directory-backed store with one file per job.
///
/// Layout: `{root}/{key}/{id}.json`. Appends write a temp file and rename it
/// into place, deletes remove a single file, so several processes sharing the
/// directory cannot resurrect each other's deleted jobs.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create outbox directory at {:?}", root))?;
        Ok(Self { root })
    }

    /// Open the store under the OS data directory: `{data_dir}/motodesk/outbox`.
    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(default_root()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(file_safe(key))
    }

    fn entry_path(&self, key: &str, id: &OutboxId) -> PathBuf {
        self.key_dir(key).join(format!("{}.json", id.to_file_stem()))
    }

    fn try_read_list(&self, key: &str) -> Result<Vec<OutboxEntry>, StoreError> {
        let dir = self.key_dir(key);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for dirent in read_dir {
            let path = dirent?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_entry(&path) {
                Ok(entry) => entries.push(entry),
                // Deleted by another process between listing and reading.
                Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(key, path = ?path, error = %err, "skipping unreadable outbox entry");
                }
            }
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    fn try_append(&self, key: &str, entry: &OutboxEntry) -> Result<(), StoreError> {
        fs::create_dir_all(self.key_dir(key))?;
        let path = self.entry_path(key, &entry.id);
        let tmp = path.with_extension("json.tmp");
        let written = fs::write(&tmp, serde_json::to_vec(entry)?).and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = ?tmp, error = %cleanup, "failed to remove temp outbox file");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn try_delete(&self, key: &str, id: &OutboxId) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key, id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn try_write_list(&self, key: &str, list: &[OutboxEntry]) -> Result<(), StoreError> {
        for entry in list {
            self.try_append(key, entry)?;
        }
        let keep: HashSet<PathBuf> = list.iter().map(|e| self.entry_path(key, &e.id)).collect();
        for dirent in fs::read_dir(self.key_dir(key))? {
            let path = dirent?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") && !keep.contains(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}

fn read_entry(path: &Path) -> Result<OutboxEntry, StoreError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl PersistentStore for FileStore {
    fn read_list(&self, key: &str) -> Vec<OutboxEntry> {
        self.try_read_list(key).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "failed to read outbox; treating as empty");
            Vec::new()
        })
    }

    fn write_list(&self, key: &str, list: &[OutboxEntry]) {
        if let Err(err) = self.try_write_list(key, list) {
            tracing::warn!(key, error = %err, "failed to write outbox");
        }
    }

    fn append(&self, key: &str, entry: &OutboxEntry) {
        if let Err(err) = self.try_append(key, entry) {
            tracing::warn!(key, id = %entry.id, error = %err, "failed to persist outbox entry");
        }
    }

    fn delete(&self, key: &str, id: &OutboxId) {
        if let Err(err) = self.try_delete(key, id) {
            tracing::warn!(key, %id, error = %err, "failed to delete outbox entry");
        }
    }
}

/// Resolve the default outbox directory.
fn default_root() -> anyhow::Result<PathBuf> {
    let mut dir = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    dir.push("motodesk");
    dir.push("outbox");
    Ok(dir)
}
