//! Directory-backed buckets, for development and tests.
//!
//! Every object is first written to a staging file beside its final location
//! and then renamed over it, so [`exists`](StorageBackend::exists) never sees
//! a half-written object.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A bucket that lives in a directory on the local filesystem.
///
/// ```no_run
/// use earmark_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bucket = LocalBackend::new("audible-raw", "/var/lib/earmark/buckets/audible-raw")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// Open the bucket at `root`, creating the directory if it is missing.
    ///
    /// `root` must be absolute and must not be an existing file.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::InvalidPath(root.to_path_buf()));
        }
        // Blocking, but only once per bucket.
        std::fs::create_dir_all(root).map_err(|err| io_error(err, root))?;
        Ok(Self {
            name: name.into(),
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, key: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(key)?))
    }

    /// Resolve `key` to its final location plus a unique staging file next to
    /// it, creating intermediate directories on the way.
    async fn stage(&self, key: &Path) -> Result<(PathBuf, PathBuf)> {
        let target = self.locate(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|err| io_error(err, key))?;
        }
        let mut staging = target.clone().into_os_string();
        staging.push(format!(
            ".{}-{}.staging",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Ok((target, PathBuf::from(staging)))
    }

    async fn commit(staging: &Path, target: &Path, key: &Path) -> Result<()> {
        if let Err(err) = fs::rename(staging, target).await {
            if let Err(cleanup) = fs::remove_file(staging).await {
                tracing::warn!(staging = %staging.display(), error = %cleanup, "Could not remove staging file");
            }
            exn::bail!(io_error(err, key));
        }
        tracing::trace!(key = %key.display(), "Committed object");
        Ok(())
    }
}

fn io_error(err: std::io::Error, path: &Path) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(err),
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &Path) -> Result<bool> {
        let target = self.locate(key)?;
        Ok(fs::try_exists(&target).await.map_err(|err| io_error(err, key))?)
    }

    async fn read(&self, key: &Path) -> Result<Vec<u8>> {
        let target = self.locate(key)?;
        Ok(fs::read(&target).await.map_err(|err| io_error(err, key))?)
    }

    async fn write(&self, key: &Path, data: &[u8]) -> Result<()> {
        let (target, staging) = self.stage(key).await?;
        fs::write(&staging, data).await.map_err(|err| io_error(err, key))?;
        Self::commit(&staging, &target, key).await
    }

    async fn put_file(&self, local: &Path, key: &Path) -> Result<()> {
        let (target, staging) = self.stage(key).await?;
        fs::copy(local, &staging).await.map_err(|err| io_error(err, local))?;
        Self::commit(&staging, &target, key).await
    }
}
