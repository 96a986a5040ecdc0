//! Catalog Error Types
//!
//! Everything the Audible API, the voucher and the CDN can go wrong with,
//! as `exn` error trees.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The credential bag lacks a field the service needs.
    #[display("credentials are missing '{_0}'")]
    Credentials(#[error(not(source))] &'static str),
    #[display("unsupported marketplace: {_0}")]
    Marketplace(#[error(not(source))] String),
    /// The service refused (or could not be understood to grant) a license.
    #[display("license not granted: {_0}")]
    License(#[error(not(source))] String),
    #[display("could not decrypt voucher: {_0}")]
    Decryption(#[error(not(source))] &'static str),
    /// The title is not in the caller's library.
    #[display("title not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("download failed: {_0}")]
    Download(#[error(not(source))] String),
    /// Transport-level failure talking to the service.
    #[display("catalog service unreachable")]
    Network,
    #[display("unexpected response from catalog service: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Download(_) | Self::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Download("connection reset".into()).is_retryable());
        assert!(!ErrorKind::License("Denied".into()).is_retryable());
        assert!(!ErrorKind::Decryption("bad base64").is_retryable());
    }
}
