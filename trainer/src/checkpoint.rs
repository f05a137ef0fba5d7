//! Versioned parameter checkpoints
//!
//! Every accepted model gets an immutable `model_{version:06}.ckpt` file, and
//! an alias file (default `latest`) always holds a copy of the newest one.
//! The alias is replaced with write-to-temp plus rename, so the model watcher
//! never sees a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint not found: {0}")]
    NotFound(String),
}

pub trait CheckpointStore: Send + Sync {
    /// Store `params` as `version` and point the alias at it.
    fn save(&self, version: u64, params: &[u8]) -> Result<(), CheckpointError>;

    /// Load by alias name or by version number.
    fn load(&self, name: &str) -> Result<Vec<u8>, CheckpointError>;

    /// Highest saved version, if any.
    fn latest_version(&self) -> Result<Option<u64>, CheckpointError>;

    /// Name that resolves to the newest checkpoint.
    fn alias(&self) -> &str;
}

pub fn checkpoint_file_name(version: u64) -> String {
    format!("model_{:06}.ckpt", version)
}

fn parse_checkpoint_name(name: &str) -> Option<u64> {
    name.strip_prefix("model_")?
        .strip_suffix(".ckpt")?
        .parse()
        .ok()
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    alias: String,
}

impl FileCheckpointStore {
    /// Create the store, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, alias: impl Into<String>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            alias: alias.into(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the alias file, which the model watcher follows.
    pub fn alias_path(&self) -> PathBuf {
        self.dir.join(&self.alias)
    }

    fn resolve(&self, name: &str) -> PathBuf {
        match name.parse::<u64>() {
            Ok(version) => self.dir.join(checkpoint_file_name(version)),
            Err(_) => self.dir.join(name),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    let io_err = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);
    fs::rename(&tmp, path).map_err(io_err)
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, version: u64, params: &[u8]) -> Result<(), CheckpointError> {
        let versioned = self.dir.join(checkpoint_file_name(version));
        write_atomic(&versioned, params)?;
        write_atomic(&self.alias_path(), params)?;
        debug!(version, path = %versioned.display(), "Checkpoint saved");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>, CheckpointError> {
        let path = self.resolve(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CheckpointError::NotFound(path.display().to_string()))
            }
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    fn latest_version(&self) -> Result<Option<u64>, CheckpointError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CheckpointError::Io {
            path: self.dir.clone(),
            source,
        })?;
        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| parse_checkpoint_name(&entry.file_name().to_string_lossy()))
            .max())
    }

    fn alias(&self) -> &str {
        &self.alias
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    versions: Mutex<BTreeMap<u64, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.versions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, version: u64, params: &[u8]) -> Result<(), CheckpointError> {
        self.versions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(version, params.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>, CheckpointError> {
        let versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        let found = if name == self.alias() {
            versions.values().next_back()
        } else {
            name.parse::<u64>().ok().and_then(|v| versions.get(&v))
        };
        found
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(name.to_string()))
    }

    fn latest_version(&self) -> Result<Option<u64>, CheckpointError> {
        Ok(self
            .versions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .next_back()
            .copied())
    }

    fn alias(&self) -> &str {
        "latest"
    }
}
