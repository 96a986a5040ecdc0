//! Object key normalisation.
//!
//! Keys are assembled from request input (the caller's `path` prefix plus a
//! SKU), so they are cleaned up here before any backend touches them.

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Normalise an object key, refusing anything that would land outside the
/// bucket root.
///
/// Repeated separators, `.` segments and leading or trailing slashes are
/// dropped, and `..` cancels the segment before it. A key that climbs past the
/// root, contains a NUL byte or is empty once cleaned up is an
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// ```
/// use earmark_storage::validate_path;
/// use std::path::Path;
///
/// assert_eq!(
///     validate_path("/AudibleRaw/tmp/../BK123.json").unwrap(),
///     Path::new("AudibleRaw/BK123.json")
/// );
/// assert!(validate_path("AudibleRaw/../../BK123.json").is_err());
/// ```
pub fn validate(key: impl AsRef<Path>) -> Result<PathBuf> {
    let key = key.as_ref();
    let invalid = || ErrorKind::InvalidPath(key.to_path_buf());

    let mut segments: Vec<&OsStr> = Vec::new();
    for component in key.components() {
        match component {
            Component::Normal(segment) if segment.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(segment) => segments.push(segment),
            Component::ParentDir => {
                segments.pop().ok_or_raise(invalid)?;
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
        }
    }
    if segments.is_empty() {
        exn::bail!(invalid());
    }
    Ok(segments.into_iter().collect())
}
