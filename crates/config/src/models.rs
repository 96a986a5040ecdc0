use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::PathBuf;

fn project_dir(select: impl FnOnce(&directories::ProjectDirs) -> PathBuf, fallback: &str) -> PathBuf {
    directories::ProjectDirs::from("", "", "earmark")
        .map(|dirs| select(&dirs))
        .unwrap_or_else(|| std::env::temp_dir().join(fallback))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Use a local `ffmpeg` (configured path, or `PATH`).
    #[default]
    Development,
    /// Fetch `ffmpeg` from durable storage into the tool cache.
    Production,
}

/// What happens to a run's working directory once the run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retention {
    Keep,
    #[default]
    Delete,
}

/// A string that never shows up in logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}
impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Explicit executable; takes precedence over discovery and the shared copy.
    pub path: Option<PathBuf>,
    /// Where the shared executable is cached in production.
    pub cache_dir: PathBuf,
}
impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: None,
            cache_dir: project_dir(|dirs| dirs.cache_dir().join("bin"), "earmark-bin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Buckets are subdirectories of `root`.
    Local { root: PathBuf },
    S3 {
        region: String,
        /// Custom endpoint for S3-compatible services.
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: Secret,
    },
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: project_dir(|dirs| dirs.data_dir().join("storage"), "earmark-storage"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Overrides the marketplace API host derived from the credentials.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    /// Parent of every run's working directory.
    pub work_dir: PathBuf,
    /// Upper bound on a whole acquisition run.
    pub timeout_secs: u64,
    pub retention: Retention,
    pub tool: ToolConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    /// Also publish the decrypted container next to the raw download.
    pub publish_decrypted: bool,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            work_dir: std::env::temp_dir().join("earmark"),
            timeout_secs: 540,
            retention: Retention::default(),
            tool: ToolConfig::default(),
            storage: StorageConfig::default(),
            catalog: CatalogConfig::default(),
            publish_decrypted: true,
        }
    }
}
