//! Key/value string stores backing the authorization cache.
//!
//! The store is constructed by the caller and passed to every operation that
//! needs it, there is no process wide handle.

use error_utils::anyhow_error_and_log;
use std::collections::HashMap;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

#[trait_variant::make(Send)]
pub trait GenericStringStorage {
    /// Read the value under `key`, `None` when absent.
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous value.
    async fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove_item(&mut self, key: &str) -> anyhow::Result<()>;

    /// Output some information on the storage instance.
    fn info(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RamStringStorage {
    internal_storage: HashMap<String, String>,
}

impl RamStringStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.internal_storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal_storage.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.internal_storage.keys().map(String::as_str)
    }
}

impl GenericStringStorage for RamStringStorage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.internal_storage.get(key).cloned())
    }

    async fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.internal_storage
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&mut self, key: &str) -> anyhow::Result<()> {
        self.internal_storage.remove(key);
        Ok(())
    }

    fn info(&self) -> String {
        "memory storage".to_string()
    }
}

/// One file per key below a root directory.
#[derive(Debug, Clone)]
pub struct FileStringStorage {
    path: PathBuf,
}

impl FileStringStorage {
    /// Open a store rooted at `path`, creating missing directories.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)?;
        Ok(Self {
            path: path.canonicalize()?,
        })
    }

    pub fn root_dir(&self) -> &Path {
        self.path.as_path()
    }

    fn item_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        if matches!(key, "" | "." | "..") {
            return Err(anyhow_error_and_log(format!(
                "Could not use key {key:?}, it does not name a file"
            )));
        }
        if key.contains(MAIN_SEPARATOR) || key.contains('/') {
            return Err(anyhow_error_and_log(format!(
                "Could not use key {key:?}, it contains a path separator"
            )));
        }
        Ok(self.path.join(key))
    }
}

impl GenericStringStorage for FileStringStorage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.item_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.item_path(key)?;
        // write then rename so readers never see a partial value
        let tmp = self.path.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove_item(&mut self, key: &str) -> anyhow::Result<()> {
        let path = self.item_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn info(&self) -> String {
        format!("file storage at {}", self.path.display())
    }
}

/// This is a storage that fails after a predetermined number of writes.
///
/// It uses a [RamStringStorage] internally
/// and make it fail after a configurable number of operations.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone, Default)]
pub struct FailingRamStorage {
    available_writes: usize,
    failed_writes: usize,
    inner: RamStringStorage,
}

#[cfg(any(test, feature = "testing"))]
impl FailingRamStorage {
    pub fn new(writes_before_failure: usize) -> Self {
        Self {
            available_writes: writes_before_failure,
            failed_writes: 0,
            inner: RamStringStorage::new(),
        }
    }

    pub fn set_available_writes(&mut self, available_writes: usize) {
        self.available_writes = available_writes
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes
    }

    pub fn inner(&self) -> &RamStringStorage {
        &self.inner
    }
}

#[cfg(any(test, feature = "testing"))]
impl GenericStringStorage for FailingRamStorage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.available_writes < 1 {
            self.failed_writes += 1;
            anyhow::bail!("storage failed!")
        } else {
            self.available_writes -= 1;
            self.inner.set_item(key, value).await
        }
    }

    async fn remove_item(&mut self, key: &str) -> anyhow::Result<()> {
        self.inner.remove_item(key).await
    }

    fn info(&self) -> String {
        "FailingRamStorage".to_string()
    }
}
