//! Whole-file JSON documents with atomic replace-on-write.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Errors from the file-backed stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this key already exists.
    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The document exists but is not valid JSON for its type.
    #[error("corrupt document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A JSON document guarded by one lock.
///
/// Every access loads the file, every successful mutation rewrites it. The
/// lock is held from load to rename, so read-modify-write cycles never
/// interleave within a process. File IO runs on the blocking pool, and the
/// write task owns the guard: dropping the caller's future mid-write does not
/// release the lock before the rename lands.
pub struct JsonDocument<T> {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current contents.
    pub async fn read(&self) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Load, apply `mutate`, and write the result back.
    ///
    /// Nothing is written when `mutate` returns an error, so a rejected
    /// mutation leaves the file byte-for-byte unchanged.
    pub async fn update<R, E, F>(&self, mutate: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E> + Send,
        R: Send,
        E: From<StoreError> + Send,
    {
        let guard = self.lock.clone().lock_owned().await;
        let mut doc = self.load().await?;
        let result = mutate(&mut doc)?;
        self.store(doc, guard).await?;
        Ok(result)
    }

    async fn load(&self) -> Result<T, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || load_blocking(&path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    async fn store(&self, doc: T, guard: OwnedMutexGuard<()>) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let bytes = serde_json::to_vec_pretty(&doc).map_err(StoreError::Encode)?;
            write_atomic(&path, &bytes)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

/// A missing or blank file is an empty document.
fn load_blocking<T>(path: &Path) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to a temporary file in the target directory, fsync, then rename
/// over the target. Readers see either the old or the new document.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
