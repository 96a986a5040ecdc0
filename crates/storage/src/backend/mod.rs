//! Where published artifacts end up.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{Fault, MockBackend};
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::path::Path;

/// A single bucket of objects addressed by relative keys.
///
/// Every key goes through [`validate_path`](crate::validate_path) inside the
/// implementation, so callers may pass keys built from request input.
///
/// ```
/// use std::path::Path;
/// use earmark_storage::{backend::StorageBackend, error::Result};
///
/// async fn publish_and_check(bucket: &dyn StorageBackend) -> Result<bool> {
///     let key = Path::new("UserData/uid/Uploads/AudibleRaw/BK123.json");
///     bucket.write(key, b"{}").await?;
///     bucket.exists(key).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// For logs.
    fn name(&self) -> &str;

    async fn exists(&self, key: &Path) -> Result<bool>;

    /// Whole object contents, or [`NotFound`](ErrorKind::NotFound).
    async fn read(&self, key: &Path) -> Result<Vec<u8>>;

    /// Create or replace the object at `key`, creating any intermediate
    /// "directories" the backend needs.
    async fn write(&self, key: &Path, data: &[u8]) -> Result<()>;

    /// Upload the file at `local` to `key`.
    ///
    /// Buffers the whole file and calls [`write`](Self::write) unless the
    /// backend knows better.
    async fn put_file(&self, local: &Path, key: &Path) -> Result<()> {
        let data = tokio::fs::read(local).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(local.to_path_buf()),
            _ => ErrorKind::Io(err),
        })?;
        self.write(key, &data).await
    }
}
