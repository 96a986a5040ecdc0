use crate::error::{ErrorKind, Result};
use std::path::PathBuf;

/// Executable name searched for on `PATH`, and the file name used in the
/// shared tool cache.
pub const TOOL_NAME: &str = "ffmpeg";

/// Where the transcoding executable comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLocation {
    /// A specific binary on disk.
    Fixed(PathBuf),
    /// Whatever `ffmpeg` is first on `PATH`.
    Discover,
    /// A copy fetched from durable storage into `cache_dir` on first use.
    Shared { cache_dir: PathBuf },
}
impl ToolLocation {
    /// Resolve a location that can be answered from the local machine alone.
    ///
    /// Returns `None` for [`Shared`](Self::Shared), which the caller has to
    /// fetch from storage first.
    pub fn resolve_local(&self) -> Option<Result<PathBuf>> {
        match self {
            Self::Fixed(path) if path.is_file() => Some(Ok(path.clone())),
            Self::Fixed(path) => {
                tracing::info!(path = %path.display(), "Configured tool path does not exist");
                Some(Err(ErrorKind::ToolNotFound.into()))
            },
            Self::Discover => Some(discover()),
            Self::Shared { .. } => None,
        }
    }

    /// Path the shared copy lives at once it has been fetched.
    pub fn cached_path(cache_dir: impl Into<PathBuf>) -> PathBuf {
        cache_dir.into().join(TOOL_NAME)
    }
}

fn discover() -> Result<PathBuf> {
    match which::which(TOOL_NAME) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "Discovered {TOOL_NAME} on PATH");
            Ok(path)
        },
        Err(_) => {
            tracing::info!("{TOOL_NAME} executable not found in PATH");
            exn::bail!(ErrorKind::ToolNotFound)
        },
    }
}
