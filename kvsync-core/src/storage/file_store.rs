//! Directory-backed store
//!
//! One file per key. File names are the hex encoding of the key, so any key
//! of up to `MAX_KEY_BYTES` bytes is representable. Writes go to a temporary
//! file first and are renamed into place, so a crash never leaves a
//! half-written value behind.

use super::errors::{StorageError, StorageResult};
use super::traits::{BackendKind, BackingStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

const VALUE_EXT: &str = "kv";
const TEMP_EXT: &str = "kv.tmp";

/// Longest file name most filesystems accept
const MAX_FILE_NAME: usize = 255;

/// Longest key whose hex name still fits next to the temp extension
pub const MAX_KEY_BYTES: usize = (MAX_FILE_NAME - TEMP_EXT.len() - 1) / 2;

/// File-per-key backing store
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub async fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str, ext: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.len() > MAX_KEY_BYTES {
            return Err(StorageError::InvalidKey(format!(
                "key is {} bytes, file store allows at most {}",
                key.len(),
                MAX_KEY_BYTES
            )));
        }
        Ok(self.dir.join(format!("{}.{}", hex::encode(key), ext)))
    }

    /// Keys currently stored, decoded from file names
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(&format!(".{}", VALUE_EXT)))
            else {
                continue;
            };
            if let Some(key) = hex::decode(stem).ok().and_then(|b| String::from_utf8(b).ok()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl BackingStore for FileStore {
    async fn save(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let target = self.path_for(key, VALUE_EXT)?;
        let temp = self.path_for(key, TEMP_EXT)?;
        fs::write(&temp, value).await?;
        fs::rename(&temp, &target).await?;
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key, VALUE_EXT)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key, VALUE_EXT)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self) -> StorageResult<()> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }
}
