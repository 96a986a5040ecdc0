//! A bucket held in memory, with optional misbehaviour for publish tests.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// How a key marked with [`MockBackend::with_fault`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Writes to the key return a backend error.
    RejectWrite,
    /// Writes to the key report success but nothing is stored, so a later
    /// existence check fails.
    LoseWrite,
}

/// In-memory [`StorageBackend`] that counts its traffic.
///
/// ```
/// use earmark_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bucket = MockBackend::with_files([("bin/ffmpeg", b"#!/bin/sh\n")]);
/// assert!(bucket.exists(Path::new("bin/ffmpeg")).await?);
/// assert_eq!(bucket.write_count(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    objects: RwLock<HashMap<PathBuf, Vec<u8>>>,
    faults: HashMap<PathBuf, Fault>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

/// Test setup with a bad key is a bug in the test, so this panics.
fn key_or_panic(key: PathBuf, context: &str) -> PathBuf {
    match validate_path(&key) {
        Ok(valid) => valid,
        Err(_) => panic!("MockBackend::{context}: invalid path {}", key.display()),
    }
}

impl MockBackend {
    /// A bucket that already holds `files`.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let objects = files
            .into_iter()
            .map(|(key, data)| (key_or_panic(key.into(), "with_files"), data.into()))
            .collect();
        Self {
            name: "mock".to_string(),
            objects: RwLock::new(objects),
            faults: HashMap::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make writes to `key` misbehave.
    ///
    /// ```
    /// use earmark_storage::backend::{Fault, MockBackend};
    ///
    /// let bucket = MockBackend::default().with_fault("AudibleRaw/BK123.jpg", Fault::LoseWrite);
    /// ```
    pub fn with_fault(mut self, key: impl Into<PathBuf>, fault: Fault) -> Self {
        self.faults.insert(key_or_panic(key.into(), "with_fault"), fault);
        self
    }

    /// Successful `read` calls so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Writes that actually stored something so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> HashSet<PathBuf> {
        self.objects.read().await.keys().cloned().collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(std::iter::empty::<(PathBuf, Vec<u8>)>())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &Path) -> Result<bool> {
        let key = validate_path(key)?;
        Ok(self.objects.read().await.contains_key(&key))
    }

    async fn read(&self, key: &Path) -> Result<Vec<u8>> {
        let key = validate_path(key)?;
        let data = match self.objects.read().await.get(&key) {
            Some(data) => data.clone(),
            None => exn::bail!(ErrorKind::NotFound(key)),
        };
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn write(&self, key: &Path, data: &[u8]) -> Result<()> {
        let key = validate_path(key)?;
        match self.faults.get(&key) {
            Some(Fault::RejectWrite) => {
                exn::bail!(ErrorKind::BackendError(format!("injected write failure: {}", key.display())))
            },
            Some(Fault::LoseWrite) => {
                tracing::debug!(key = %key.display(), "Dropping write");
                return Ok(());
            },
            None => {},
        }
        self.objects.write().await.insert(key, data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const COVER: &str = "AudibleRaw/BK123.jpg";

    #[tokio::test]
    async fn test_counts_reads_and_writes() {
        let bucket = MockBackend::with_files([("bin/ffmpeg", b"#!/bin/sh\n".to_vec())]);
        bucket.write(Path::new("AudibleRaw/BK123.json"), b"{}").await.unwrap();
        assert_eq!(bucket.read(Path::new("bin/ffmpeg")).await.unwrap(), b"#!/bin/sh\n");

        assert_eq!((bucket.read_count(), bucket.write_count()), (1, 1));
        assert_eq!(
            bucket.keys().await,
            HashSet::from([PathBuf::from("bin/ffmpeg"), PathBuf::from("AudibleRaw/BK123.json")])
        );
    }

    #[rstest]
    #[case::rejected(Fault::RejectWrite, true)]
    #[case::lost(Fault::LoseWrite, false)]
    #[tokio::test]
    async fn test_faults_store_nothing(#[case] fault: Fault, #[case] errors: bool) {
        let bucket = MockBackend::default().with_fault(COVER, fault);
        let result = bucket.write(Path::new(COVER), b"jpeg").await;

        assert_eq!(result.is_err(), errors);
        assert!(!bucket.exists(Path::new(COVER)).await.unwrap());
        assert_eq!(bucket.write_count(), 0);
    }

    #[tokio::test]
    async fn test_faults_only_hit_their_key() {
        let bucket = MockBackend::default().with_fault(COVER, Fault::RejectWrite);
        bucket.write(Path::new("AudibleRaw/BK123.m4b"), b"m4b").await.unwrap();
        assert!(bucket.exists(Path::new("AudibleRaw/BK123.m4b")).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_file_goes_through_write() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("BK123.jpg");
        std::fs::write(&local, b"jpeg").unwrap();
        let bucket = MockBackend::default();

        bucket.put_file(&local, Path::new(COVER)).await.unwrap();
        assert_eq!(bucket.write_count(), 1);
        assert_eq!(bucket.read(Path::new(COVER)).await.unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let bucket = MockBackend::default();
        let err = bucket.read(Path::new(COVER)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(!bucket.exists(Path::new(COVER)).await.unwrap());
        assert_eq!(bucket.read_count(), 0);
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_bad_setup_panics() {
        MockBackend::with_files([("../escape", b"bad".to_vec())]);
    }
}
