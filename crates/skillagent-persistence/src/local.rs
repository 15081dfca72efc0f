use crate::error::{Result, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Filesystem backend rooted at a base directory
#[derive(Debug, Clone)]
pub struct LocalBackend {
    base_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(key)
    }

    pub async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        debug!("Wrote {} bytes to {:?}", body.len(), path);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove one object; false when it did not exist
    pub async fn remove(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a directory tree; false when it did not exist
    pub async fn remove_dir(&self, dir: &str) -> Result<bool> {
        match fs::remove_dir_all(self.path_for(dir)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the immediate subdirectories of the base directory
    pub async fn list_dirs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Count files in `dir` whose names start with `prefix`
    pub async fn count_files(&self, dir: &str, prefix: &str) -> Result<usize> {
        let mut count = 0;
        let mut entries = fs::read_dir(self.path_for(dir)).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                count += 1;
            }
        }
        Ok(count)
    }
}
