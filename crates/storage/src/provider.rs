//! Per-request bucket selection.
//!
//! Every acquisition request names the bucket its artifacts land in, so the
//! pipeline holds a [`BucketProvider`] rather than a single backend.

use crate::BackendHandle;
use crate::backend::LocalBackend;
use crate::error::{ErrorKind, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Opens a [`StorageBackend`](crate::StorageBackend) for a named bucket.
pub trait BucketProvider: Send + Sync {
    fn open(&self, bucket: &str) -> Result<BackendHandle>;
}

fn check_bucket(bucket: &str) -> Result<&str> {
    let bucket = bucket.trim();
    if bucket.is_empty() || bucket.contains(['/', '\\', '\0']) || bucket == "." || bucket == ".." {
        exn::bail!(ErrorKind::InvalidBucket(bucket.to_string()));
    }
    Ok(bucket)
}

/// Maps each bucket to a subdirectory of a local root.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
}
impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}
impl BucketProvider for LocalProvider {
    fn open(&self, bucket: &str) -> Result<BackendHandle> {
        let bucket = check_bucket(bucket)?;
        Ok(Arc::new(LocalBackend::new(bucket, self.root.join(bucket))?))
    }
}

/// Re-targets one configured S3 client at whichever bucket is requested.
#[cfg(feature = "s3")]
#[derive(Debug, Clone)]
pub struct S3Provider {
    template: crate::backend::S3Backend,
}
#[cfg(feature = "s3")]
impl S3Provider {
    pub fn new(template: crate::backend::S3Backend) -> Self {
        Self { template }
    }
}
#[cfg(feature = "s3")]
impl BucketProvider for S3Provider {
    fn open(&self, bucket: &str) -> Result<BackendHandle> {
        Ok(Arc::new(self.template.with_bucket(check_bucket(bucket)?)?))
    }
}

/// Hands out the same shared [`MockBackend`](crate::backend::MockBackend) for
/// every bucket, so tests can inspect what was published.
#[cfg(any(test, feature = "mock"))]
#[derive(Clone)]
pub struct MockProvider {
    backend: Arc<crate::backend::MockBackend>,
}
#[cfg(any(test, feature = "mock"))]
impl MockProvider {
    pub fn new(backend: Arc<crate::backend::MockBackend>) -> Self {
        Self { backend }
    }
}
#[cfg(any(test, feature = "mock"))]
impl BucketProvider for MockProvider {
    fn open(&self, bucket: &str) -> Result<BackendHandle> {
        check_bucket(bucket)?;
        Ok(self.backend.clone())
    }
}
