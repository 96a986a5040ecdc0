//! Artifact publishing.
//!
//! Each artifact is uploaded and then checked for existence; only an artifact
//! that passes both steps is `verified`. Failures are recorded on the artifact
//! rather than returned, so one bad upload does not stop the others. Nothing
//! is ever rolled back.

use derive_more::Display;
use earmark_storage::BackendHandle;
use earmark_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
use earmark_transcode::ToolLocation;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::sync::Mutex;
use tracing::instrument;

/// Durable storage key of the shared transcoder executable.
pub const SHARED_BINARY_KEY: &str = "bin/ffmpeg";

/// Serialises fetches of the shared binary across every run in the process.
static SHARED_BINARY_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactKind {
    /// The encrypted download, as received.
    Audio,
    /// The DRM-free container.
    Decrypted,
    Metadata,
    Cover,
}
impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Audio => "aaxc",
            Self::Decrypted => "m4b",
            Self::Metadata => "json",
            Self::Cover => "jpg",
        }
    }
}

/// Outcome of publishing one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub kind: ArtifactKind,
    pub key: String,
    /// Whether the run fails when this artifact is not verified.
    pub required: bool,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
impl PublishedArtifact {
    /// An artifact that never made it as far as an upload.
    pub fn unpublished(kind: ArtifactKind, key: impl Into<String>, required: bool, error: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            required,
            verified: false,
            error: Some(error.into()),
        }
    }

    /// Required but not verified.
    pub fn is_blocking(&self) -> bool {
        self.required && !self.verified
    }
}

/// A local file waiting to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtifact {
    pub local: PathBuf,
    pub key: String,
    pub kind: ArtifactKind,
    pub required: bool,
}

/// Publishes artifacts to one bucket.
#[derive(Clone)]
pub struct Publisher {
    backend: BackendHandle,
}
impl Publisher {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    /// Upload `local` to `key`, then confirm `key` exists.
    #[instrument(skip(self, local), fields(backend = self.backend.name(), %kind))]
    pub async fn publish(&self, local: &Path, key: &str, kind: ArtifactKind, required: bool) -> PublishedArtifact {
        match self.put_and_verify(local, key).await {
            Ok(()) => {
                tracing::info!("Published");
                PublishedArtifact {
                    kind,
                    key: key.to_string(),
                    required,
                    verified: true,
                    error: None,
                }
            },
            Err(err) => {
                let message = (*err).to_string();
                tracing::warn!(error = %message, "Publish failed");
                PublishedArtifact::unpublished(kind, key, required, message)
            },
        }
    }

    async fn put_and_verify(&self, local: &Path, key: &str) -> StorageResult<()> {
        let path = Path::new(key);
        self.backend.put_file(local, path).await?;
        if !self.backend.exists(path).await? {
            exn::bail!(StorageErrorKind::NotFound(path.to_path_buf()));
        }
        Ok(())
    }

    /// Publish every artifact, one after the other, regardless of earlier
    /// failures.
    pub async fn publish_all(&self, items: impl IntoIterator<Item = PendingArtifact>) -> Vec<PublishedArtifact> {
        let mut published = Vec::new();
        for item in items {
            published.push(self.publish(&item.local, &item.key, item.kind, item.required).await);
        }
        published
    }

    /// Make sure the shared transcoder is in `cache_dir`, fetching it from
    /// [`SHARED_BINARY_KEY`] if it is not.
    ///
    /// Concurrent callers in the same process fetch at most once. The file is
    /// written under a temporary name and renamed into place, so other
    /// processes never see a partial executable.
    #[instrument(skip(self), fields(backend = self.backend.name(), cache_dir = %cache_dir.display()))]
    pub async fn ensure_shared_binary(&self, cache_dir: &Path) -> StorageResult<PathBuf> {
        let target = ToolLocation::cached_path(cache_dir);
        if tokio::fs::try_exists(&target).await.map_err(StorageErrorKind::from)? {
            return Ok(target);
        }
        let _guard = SHARED_BINARY_LOCK.lock().await;
        if tokio::fs::try_exists(&target).await.map_err(StorageErrorKind::from)? {
            tracing::debug!("Fetched by a concurrent run");
            return Ok(target);
        }

        let data = self.backend.read(Path::new(SHARED_BINARY_KEY)).await?;
        tokio::fs::create_dir_all(cache_dir).await.map_err(StorageErrorKind::from)?;
        let staged = tempfile::Builder::new()
            .prefix(".ffmpeg-")
            .tempfile_in(cache_dir)
            .map_err(StorageErrorKind::from)?;
        tokio::fs::write(staged.path(), &data).await.map_err(StorageErrorKind::from)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o755))
                .await
                .map_err(StorageErrorKind::from)?;
        }
        staged.persist(&target).map_err(|e| StorageErrorKind::from(e.error))?;
        tracing::info!(bytes = data.len(), "Shared binary cached");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use earmark_storage::StorageBackend;
    use earmark_storage::backend::{Fault, MockBackend};
    use std::sync::Arc;

    fn local_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_publish_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let publisher = Publisher::new(backend.clone());
        let local = local_file(dir.path(), "BK123.json", b"{}");

        let artifact = publisher.publish(&local, "raw/BK123.json", ArtifactKind::Metadata, true).await;
        assert!(artifact.verified);
        assert_eq!(artifact.error, None);
        assert_eq!(backend.read(Path::new("raw/BK123.json")).await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_publish_same_key_twice() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(Arc::new(MockBackend::default()));
        let local = local_file(dir.path(), "BK123.aaxc", b"audio");

        let first = publisher.publish(&local, "raw/BK123.aaxc", ArtifactKind::Audio, true).await;
        let second = publisher.publish(&local, "raw/BK123.aaxc", ArtifactKind::Audio, true).await;
        assert!(first.verified);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rejected_write() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::default().with_fault("raw/BK123.jpg", Fault::RejectWrite);
        let publisher = Publisher::new(Arc::new(backend));
        let local = local_file(dir.path(), "BK123.jpg", b"jpeg");

        let artifact = publisher.publish(&local, "raw/BK123.jpg", ArtifactKind::Cover, true).await;
        assert!(!artifact.verified);
        assert!(artifact.is_blocking());
        assert!(artifact.error.unwrap().contains("injected write failure"));
    }

    #[tokio::test]
    async fn test_lost_write_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::default().with_fault("raw/BK123.jpg", Fault::LoseWrite);
        let publisher = Publisher::new(Arc::new(backend));
        let local = local_file(dir.path(), "BK123.jpg", b"jpeg");

        let artifact = publisher.publish(&local, "raw/BK123.jpg", ArtifactKind::Cover, false).await;
        assert!(!artifact.verified);
        assert!(!artifact.is_blocking());
        assert!(artifact.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(Arc::new(MockBackend::default()));
        let artifact =
            publisher.publish(&dir.path().join("absent.m4b"), "raw/BK123.m4b", ArtifactKind::Decrypted, true).await;
        assert!(!artifact.verified);
        assert!(artifact.error.is_some());
    }

    #[tokio::test]
    async fn test_publish_all_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default().with_fault("raw/BK123.m4b", Fault::RejectWrite));
        let publisher = Publisher::new(backend.clone());
        let items = [ArtifactKind::Audio, ArtifactKind::Decrypted, ArtifactKind::Metadata].map(|kind| {
            let name = format!("BK123.{}", kind.extension());
            PendingArtifact {
                local: local_file(dir.path(), &name, name.as_bytes()),
                key: format!("raw/{name}"),
                kind,
                required: true,
            }
        });

        let published = publisher.publish_all(items).await;
        let verified: Vec<bool> = published.iter().map(|a| a.verified).collect();
        assert_eq!(verified, vec![true, false, true]);
        assert!(backend.exists(Path::new("raw/BK123.json")).await.unwrap());
    }

    #[tokio::test]
    async fn test_shared_binary_fetched_once() {
        let cache = tempfile::tempdir().unwrap();
        let cache_dir = cache.path().join("bin");
        let backend = Arc::new(MockBackend::with_files([(SHARED_BINARY_KEY, b"#!/bin/sh\n".to_vec())]));
        let first = Publisher::new(backend.clone());
        let second = Publisher::new(backend.clone());

        let (a, b) = tokio::join!(first.ensure_shared_binary(&cache_dir), second.ensure_shared_binary(&cache_dir));
        let path = a.unwrap();
        assert_eq!(path, b.unwrap());
        assert_eq!(path, cache_dir.join("ffmpeg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"#!/bin/sh\n");
        assert_eq!(backend.read_count(), 1);

        // Already cached: no further reads.
        first.ensure_shared_binary(&cache_dir).await.unwrap();
        assert_eq!(backend.read_count(), 1);
        let leftovers: Vec<_> = std::fs::read_dir(&cache_dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shared_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let cache = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::with_files([(SHARED_BINARY_KEY, b"ELF".to_vec())]));
        let path = Publisher::new(backend).ensure_shared_binary(cache.path()).await.unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_shared_binary_missing_from_storage() {
        let cache = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(Arc::new(MockBackend::default()));
        let err = publisher.ensure_shared_binary(cache.path()).await.unwrap_err();
        assert!(matches!(&*err, StorageErrorKind::NotFound(_)));
        assert!(!cache.path().join("ffmpeg").exists());
    }
}
