//! Local mirror cache
//!
//! A small string key-value store holding the last known snapshot of a
//! domain. Read as a fallback tier when the remote store fails at runtime and
//! written after every successful remote load. Files are replaced atomically
//! so a crash never leaves a half-written mirror behind.

use crate::core::{Result, SyncError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;

#[async_trait]
pub trait MirrorCache: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> Result<()>;
}

fn check_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(SyncError::validation(format!("invalid mirror key '{key}'")));
    }
    Ok(())
}

/// Process-local mirror; lost on exit.
#[derive(Debug, Default)]
pub struct MemoryMirror {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorCache for MemoryMirror {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        check_key(key)?;
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per entry under a directory.
#[derive(Debug, Clone)]
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|err| {
            SyncError::Transport(format!(
                "Failed to create mirror directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await.map_err(|err| {
        SyncError::Transport(format!(
            "Failed to write temp file '{}': {}",
            tmp.display(),
            err
        ))
    })?;

    fs::rename(&tmp, path).await.map_err(|err| {
        SyncError::Transport(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        ))
    })?;
    Ok(())
}

#[async_trait]
impl MirrorCache for FileMirror {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        check_key(key)?;
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        check_key(key)?;
        atomic_write(&self.path_for(key), value.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mirror_round_trip() {
        let mirror = MemoryMirror::new();
        assert_eq!(mirror.read("testimoni_data").await.unwrap(), None);

        mirror.write("testimoni_data", "[]").await.unwrap();
        assert_eq!(mirror.read("testimoni_data").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let mirror = MemoryMirror::new();
        assert!(matches!(
            mirror.write("../etc/passwd", "x").await,
            Err(SyncError::Validation(_))
        ));
    }
}
