use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Key the whole snapshot lives under.
pub const STORAGE_KEY: &str = "@todo_items";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to read {key}: {source}")]
    Read { key: String, source: io::Error },
    #[error("failed to write {key}: {source}")]
    Write { key: String, source: io::Error },
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("storage unavailable for {key}: {reason}")]
    Unavailable { key: String, reason: String },
    #[error("failed to create data directory {}: {source}", path.display())]
    DataDir { path: PathBuf, source: io::Error },
}

/// A string blob store addressed by key. Every `set` replaces the whole
/// value in one step.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

#[derive(Debug)]
pub struct FileKvStore {
    pub data_dir: PathBuf,
}

impl FileKvStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, PersistenceError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| PersistenceError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        info!(data_dir = %data_dir.display(), "opened key-value store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(file_name_for(key))
    }
}

impl KeyValueStore for FileKvStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(file = %path.display(), bytes = raw.len(), "read value");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "no stored value");
                Ok(None)
            }
            Err(source) => Err(PersistenceError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        write_atomic(&path, value).map_err(|source| PersistenceError::Write {
            key: key.to_string(),
            source,
        })
    }
}

fn write_atomic(path: &Path, value: &str) -> io::Result<()> {
    debug!(file = %path.display(), "writing value atomically");
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(value.as_bytes())?;
    temp.flush()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn file_name_for(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.json")
}

/// In-process store. The fault switches make reads or writes fail with
/// [`PersistenceError::Unavailable`].
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    values: HashMap<String, String>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    writes: usize,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: impl Into<String>) -> Self {
        let mut store = Self::default();
        store.values.insert(key.to_string(), value.into());
        store
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        if self.fail_reads {
            return Err(PersistenceError::Unavailable {
                key: key.to_string(),
                reason: "read fault injected".to_string(),
            });
        }
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Unavailable {
                key: key.to_string(),
                reason: "write fault injected".to_string(),
            });
        }
        self.values.insert(key.to_string(), value.to_string());
        self.writes += 1;
        Ok(())
    }
}
