//! JSON-file storage backend.
//!
//! The whole namespace lives in one JSON object on disk. Writes go to a
//! temporary file in the same directory which then replaces the original, so
//! readers observe either the old or the new namespace, never a torn one.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::{broadcast, Mutex};

use super::{ChangeFeed, KeyValueStore, StorageChange, StorageError, StorageResult};

type Namespace = HashMap<String, Value>;

/// A [`KeyValueStore`] persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
    feed: ChangeFeed,
}

impl FileStore {
    /// Open (or prepare to create) the namespace file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            feed: ChangeFeed::new(),
        })
    }

    async fn load(&self) -> StorageResult<Namespace> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_namespace(&path))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn store(&self, namespace: Namespace) -> StorageResult<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_namespace(&path, &namespace))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>> {
        let mut namespace = self.load().await?;
        Ok(keys
            .iter()
            .filter_map(|k| namespace.remove(*k).map(|v| (k.to_string(), v)))
            .collect())
    }

    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut namespace = self.load().await?;
        let changes: Vec<_> = entries
            .into_iter()
            .map(|(key, value)| {
                let old = namespace.insert(key.clone(), value.clone());
                (key, old, Some(value))
            })
            .collect();
        self.store(namespace).await?;

        for (key, old, new) in changes {
            self.feed.emit(&key, old, new);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut namespace = self.load().await?;
        let changes: Vec<_> = keys
            .iter()
            .map(|key| (key.to_string(), namespace.remove(*key)))
            .collect();
        if changes.iter().all(|(_, old)| old.is_none()) {
            return Ok(());
        }
        self.store(namespace).await?;

        for (key, old) in changes {
            self.feed.emit(&key, old, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}

fn read_namespace(path: &Path) -> StorageResult<Namespace> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Namespace::new()),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Namespace::new());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_namespace(path: &Path, namespace: &Namespace) -> StorageResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, namespace)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
