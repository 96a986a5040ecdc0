//! Failures of the external transcoder.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("ffmpeg not detected on your system")]
    ToolNotFound,
    /// The executable exists but could not be started.
    #[display("failed to start {}", _0.display())]
    Spawn(#[error(not(source))] PathBuf),
    /// The tool ran and exited unsuccessfully. `stderr` is kept verbatim so it
    /// can be reported to whoever asked for the conversion.
    /// A missing exit code means the tool was killed by a signal.
    #[display("conversion failed (exit code {code:?}): {stderr}")]
    ConversionFailed { code: Option<i32>, stderr: String },
    /// The tool reported success but the expected file is not there.
    #[display("tool produced no output at {}", _0.display())]
    MissingOutput(#[error(not(source))] PathBuf),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
