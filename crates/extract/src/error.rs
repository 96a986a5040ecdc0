//! Errors from reading transcoder diagnostics.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A field was found but could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        field: &'static str,
        value: String,
    },
    /// Chapter records were parsed but do not form an ordered, non-overlapping
    /// timeline.
    #[display("invalid chapter list: {_0}")]
    InvalidChapters(#[error(not(source))] String),
}

impl ErrorKind {
    /// Parsing the same text again gives the same answer.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
