//! The acquisition request body.

use crate::error::{ErrorKind, Result};
use earmark_catalog::{Credentials, Identifier, Identity, Quality};
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Body {
    auth: Option<Value>,
    sku: Option<String>,
    asin: Option<String>,
    bucket: Option<String>,
    path: Option<String>,
    #[serde(default)]
    quality: Quality,
}

/// A validated request to acquire one title.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub identifier: Identifier,
    pub credentials: Credentials,
    pub bucket: String,
    /// Key prefix for every artifact. Used verbatim, so it normally ends in
    /// `/`.
    pub prefix: String,
    pub quality: Quality,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => exn::bail!(ErrorKind::RequestValidation(format!("missing '{field}'"))),
    }
}

/// SKUs such as `BK_ADBL_012345` carry underscores and dashes; anything else
/// beyond ASCII alphanumerics is refused.
fn checked_identifier(value: String, field: &str) -> Result<String> {
    if !value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
        exn::bail!(ErrorKind::RequestValidation(format!(
            "'{field}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(value)
}

impl AcquisitionRequest {
    /// Validate a JSON request body.
    ///
    /// An `asin` is preferred over a `sku` when both are given, since it
    /// needs no library lookup.
    pub fn from_value(body: Value) -> Result<Self> {
        let body: Body = serde_json::from_value(body)
            .map_err(|e| ErrorKind::RequestValidation(format!("malformed request: {e}")))?;

        let auth = body.auth.filter(|a| !a.is_null()).ok_or_raise(|| ErrorKind::RequestValidation("missing 'auth'".into()))?;
        let credentials = Credentials::from_value(auth)
            .or_raise(|| ErrorKind::RequestValidation("'auth' is not a credential object".into()))?;

        let identifier = match (body.asin.filter(|a| !a.trim().is_empty()), body.sku) {
            (Some(asin), _) => Identifier::Asin(checked_identifier(asin.trim().to_string(), "asin")?),
            (None, Some(sku)) => Identifier::Sku(checked_identifier(required(Some(sku), "sku or asin")?, "sku")?),
            (None, None) => exn::bail!(ErrorKind::RequestValidation("missing 'sku' or 'asin'".into())),
        };
        let bucket = required(body.bucket, "bucket")?;
        let prefix = body.path.ok_or_raise(|| ErrorKind::RequestValidation("missing 'path'".into()))?;
        // The prefix has to survive key validation once a file name is added.
        earmark_storage::validate_path(format!("{prefix}{}", identifier.value()))
            .or_raise(|| ErrorKind::RequestValidation(format!("'path' is not a usable key prefix: {prefix}")))?;

        let request = Self {
            identifier,
            credentials,
            bucket,
            prefix,
            quality: body.quality,
        };
        request.identity()?;
        Ok(request)
    }

    /// The caller's identity, taken from the credential bag.
    pub fn identity(&self) -> Result<Identity> {
        self.credentials.identity().map_err(|e| ErrorKind::catalog(e, ErrorKind::RequestValidation))
    }

    /// Storage key for an artifact named `name` plus `extension`.
    pub fn key(&self, name: &str, extension: &str) -> String {
        format!("{}{name}.{extension}", self.prefix)
    }
}
