//! Per-run working directories.

use crate::error::{ErrorKind, Result};
use earmark_config::Retention;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A uniquely named directory under the configured work dir, holding every
/// local artifact of one run.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
    retention: Retention,
}
impl WorkDir {
    /// Create `<parent>/<label>-<random>`.
    pub fn create(parent: &Path, label: &str, retention: Retention) -> Result<Self> {
        std::fs::create_dir_all(parent)
            .or_raise(|| ErrorKind::Unknown(format!("cannot create work dir {}", parent.display())))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(parent)
            .or_raise(|| ErrorKind::Unknown(format!("cannot create a run directory in {}", parent.display())))?;
        tracing::debug!(path = %dir.path().display(), "Created run directory");
        Ok(Self { dir, retention })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str, extension: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.{extension}"))
    }

    /// Apply the retention policy. Returns the directory if it was kept.
    pub fn finish(self) -> Option<PathBuf> {
        match self.retention {
            Retention::Keep => {
                let path = self.dir.keep();
                tracing::info!(path = %path.display(), "Keeping run directory");
                Some(path)
            },
            Retention::Delete => {
                let path = self.dir.path().to_path_buf();
                if let Err(err) = self.dir.close() {
                    tracing::warn!(path = %path.display(), error = %err, "Could not remove run directory");
                }
                None
            },
        }
    }
}
