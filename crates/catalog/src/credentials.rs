//! The caller-supplied credential bag.
//!
//! Credentials are produced by an external login flow (device registration
//! and token exchange) and arrive as an opaque JSON object. Only the handful of
//! fields needed to talk to the service and unwrap vouchers are read; the rest
//! is ignored.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use url::Url;

#[derive(Clone, Default, Deserialize)]
struct CustomerInfo {
    user_id: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
struct DeviceInfo {
    device_serial_number: Option<String>,
    device_type: Option<String>,
}

/// Opaque credential bag, as produced by the login flow.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    access_token: Option<String>,
    #[serde(default)]
    customer_info: CustomerInfo,
    #[serde(default)]
    device_info: DeviceInfo,
    locale_code: Option<String>,
}
impl Credentials {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).or_raise(|| ErrorKind::Credentials("a JSON object"))
    }

    /// Pull out the fields every request needs, failing on the first one
    /// missing.
    pub fn identity(&self) -> Result<Identity> {
        fn present(field: &Option<String>, name: &'static str) -> Result<String> {
            field.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).ok_or_raise(|| ErrorKind::Credentials(name))
        }
        Ok(Identity {
            access_token: present(&self.access_token, "access_token")?,
            customer_id: present(&self.customer_info.user_id, "customer_info.user_id")?,
            device_serial: present(&self.device_info.device_serial_number, "device_info.device_serial_number")?,
            device_type: present(&self.device_info.device_type, "device_info.device_type")?,
            marketplace: Marketplace::from_locale(self.locale_code.as_deref().unwrap_or("us"))?,
        })
    }
}
impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Credentials").field("locale_code", &self.locale_code).finish_non_exhaustive()
    }
}

/// The validated subset of [`Credentials`].
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    access_token: String,
    pub customer_id: String,
    pub device_serial: String,
    pub device_type: String,
    pub marketplace: Marketplace,
}
impl Identity {
    pub fn new(
        access_token: impl Into<String>,
        customer_id: impl Into<String>,
        device_serial: impl Into<String>,
        device_type: impl Into<String>,
        marketplace: Marketplace,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            customer_id: customer_id.into(),
            device_serial: device_serial.into(),
            device_type: device_type.into(),
            marketplace,
        }
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }
}
impl Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Identity")
            .field("access_token", &"<redacted>")
            .field("customer_id", &self.customer_id)
            .field("device_serial", &self.device_serial)
            .field("device_type", &self.device_type)
            .field("marketplace", &self.marketplace)
            .finish()
    }
}

/// Regional storefront; decides which API host is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marketplace {
    Us,
    Ca,
    Uk,
    Au,
    Fr,
    De,
    It,
    Es,
    Jp,
    In,
}
impl Marketplace {
    pub fn from_locale(locale: &str) -> Result<Self> {
        Ok(match locale.trim().to_ascii_lowercase().as_str() {
            "us" => Self::Us,
            "ca" => Self::Ca,
            "uk" | "gb" => Self::Uk,
            "au" => Self::Au,
            "fr" => Self::Fr,
            "de" => Self::De,
            "it" => Self::It,
            "es" => Self::Es,
            "jp" => Self::Jp,
            "in" => Self::In,
            _ => exn::bail!(ErrorKind::Marketplace(locale.to_string())),
        })
    }

    pub fn domain(self) -> &'static str {
        match self {
            Self::Us => "com",
            Self::Ca => "ca",
            Self::Uk => "co.uk",
            Self::Au => "com.au",
            Self::Fr => "fr",
            Self::De => "de",
            Self::It => "it",
            Self::Es => "es",
            Self::Jp => "co.jp",
            Self::In => "in",
        }
    }

    /// Base URL of the marketplace's API.
    pub fn api_base(self) -> Result<Url> {
        Url::parse(&format!("https://api.audible.{}/", self.domain()))
            .or_raise(|| ErrorKind::Marketplace(self.domain().to_string()))
    }
}
