use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use url::Url;

/// Requested audio quality. The service may grant something lower.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    High,
    Normal,
}

/// How the caller names a title.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    #[display("asin:{_0}")]
    Asin(String),
    #[display("sku:{_0}")]
    Sku(String),
}
impl Identifier {
    /// The raw identifier, without its kind.
    pub fn value(&self) -> &str {
        match self {
            Self::Asin(value) | Self::Sku(value) => value,
        }
    }
}

/// A granted download license.
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseGrant {
    pub asin: String,
    /// Signed, time-limited location of the encrypted content.
    pub content_url: Url,
    pub quality: Quality,
    /// Base64-encoded encrypted voucher.
    pub voucher: String,
    /// Status as reported by the service (always `Granted` here).
    pub status: String,
}
impl Debug for LicenseGrant {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LicenseGrant")
            .field("asin", &self.asin)
            .field("content_url", &self.content_url.host_str())
            .field("quality", &self.quality)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
