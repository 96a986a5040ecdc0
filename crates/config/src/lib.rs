//! Layered configuration.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults,
//! 2. `config.{toml,yaml,json}` in the user's config directory
//!    (`$XDG_CONFIG_HOME/earmark` on Linux),
//! 3. a file passed explicitly (format chosen by extension),
//! 4. `EARMARK_*` environment variables, with `__` separating nested keys
//!    (`EARMARK_STORAGE__KIND=s3`).

pub mod error;
mod models;

use crate::error::{ErrorKind, Result};
pub use crate::models::{CatalogConfig, Config, Environment, Retention, Secret, StorageConfig, ToolConfig};
use earmark_transcode::ToolLocation;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

const ENV_PREFIX: &str = "EARMARK_";

fn user_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "earmark").map(|dirs| dirs.config_dir().to_path_buf())
}

fn with_file(figment: Figment, path: &Path) -> Result<Figment> {
    Ok(match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::Invalid(format!("unsupported config file format: {}", path.display()))),
    })
}

impl Config {
    /// Load configuration from every source, with `explicit` (if any) taking
    /// precedence over the user config directory.
    #[instrument]
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = user_config_dir() {
            // Each of these is optional; a missing file contributes nothing.
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = with_file(figment, path)?;
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        config.validate()?;
        tracing::debug!(environment = ?config.environment, timeout_secs = config.timeout_secs, "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("timeout_secs must be greater than zero".into()));
        }
        if self.work_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("work_dir must not be empty".into()));
        }
        match &self.storage {
            StorageConfig::Local { root } if root.as_os_str().is_empty() => {
                exn::bail!(ErrorKind::Invalid("storage.root must not be empty".into()))
            },
            StorageConfig::S3 { region, key_id, key_secret, .. }
                if region.is_empty() || key_id.is_empty() || key_secret.expose().is_empty() =>
            {
                exn::bail!(ErrorKind::Invalid("storage.region, key_id and key_secret are required for S3".into()))
            },
            _ => {},
        }
        if let Some(base) = &self.catalog.api_base
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            exn::bail!(ErrorKind::Invalid(format!("catalog.api_base is not an HTTP URL: {base}")));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Where the transcoding tool comes from: an explicit path always wins,
    /// otherwise production uses the shared copy and development searches
    /// `PATH`.
    pub fn tool_location(&self) -> ToolLocation {
        match (&self.tool.path, self.environment) {
            (Some(path), _) => ToolLocation::Fixed(path.clone()),
            (None, Environment::Production) => ToolLocation::Shared {
                cache_dir: self.tool.cache_dir.clone(),
            },
            (None, Environment::Development) => ToolLocation::Discover,
        }
    }
}
