//! Pipeline Error Types
//!
//! Every error is terminal for a run. The kind is decided by the first stage
//! that fails, and lower-level errors are kept as children in the `exn` tree.

use derive_more::{Display, Error};
use earmark_catalog::error::{Error as CatalogError, ErrorKind as CatalogErrorKind};
use earmark_transcode::error::{Error as TranscodeError, ErrorKind as TranscodeErrorKind};

/// A pipeline error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong with an acquisition, as reported to the caller.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing auth or identifier, or a field that cannot be used.
    #[display("invalid request: {_0}")]
    RequestValidation(#[error(not(source))] String),
    /// The identifier is not in the caller's library.
    #[display("{_0}")]
    NotFound(#[error(not(source))] String),
    #[display("{_0}")]
    License(#[error(not(source))] String),
    #[display("{_0}")]
    Decryption(#[error(not(source))] String),
    #[display("{_0}")]
    Download(#[error(not(source))] String),
    /// The transcoder's error stream, verbatim.
    #[display("{_0}")]
    Conversion(#[error(not(source))] String),
    /// At least one required artifact was not uploaded and confirmed.
    #[display("{_0}")]
    Publish(#[error(not(source))] String),
    #[display("acquisition did not finish within {_0} seconds")]
    Timeout(#[error(not(source))] u64),
    #[display("{_0}")]
    Unknown(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download(_) | Self::Publish(_) | Self::Timeout(_))
    }

    /// Stable name reported as `error_kind` in responses.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestValidation(_) => "RequestValidationError",
            Self::NotFound(_) => "NotFoundError",
            Self::License(_) => "LicenseError",
            Self::Decryption(_) => "DecryptionError",
            Self::Download(_) => "DownloadError",
            Self::Conversion(_) => "ConversionError",
            Self::Publish(_) => "PublishError",
            Self::Timeout(_) => "TimeoutError",
            Self::Unknown(_) => "UnknownError",
        }
    }

    /// Lift a catalog error into the stage that was running.
    ///
    /// Unknown titles and unusable credentials keep their own kinds whatever
    /// the stage; everything else becomes `stage`.
    #[track_caller]
    pub fn catalog(err: CatalogError, stage: impl FnOnce(String) -> ErrorKind) -> Error {
        let message = (*err).to_string();
        let kind = match &*err {
            CatalogErrorKind::NotFound(_) => Self::NotFound(message),
            CatalogErrorKind::Credentials(_) | CatalogErrorKind::Marketplace(_) => Self::RequestValidation(message),
            _ => stage(message),
        };
        err.raise(kind)
    }

    /// Lift a transcoder error, keeping the tool's stderr as the message.
    #[track_caller]
    pub fn transcode(err: TranscodeError) -> Error {
        let message = match &*err {
            TranscodeErrorKind::ConversionFailed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        };
        err.raise(Self::Conversion(message))
    }
}
