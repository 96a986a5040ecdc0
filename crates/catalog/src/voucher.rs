//! Voucher unwrapping.
//!
//! A license grant carries an encrypted voucher holding the content key and
//! IV. The pipeline only depends on [`VoucherUnwrap`]; [`AdrmVoucher`] is the
//! implementation for ADRM vouchers, which are AES-128-CBC encrypted with a
//! key and IV derived from the requesting device and the title.

use crate::credentials::Identity;
use crate::error::{ErrorKind, Result};
use crate::models::LicenseGrant;
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use base64::{Engine, prelude::BASE64_STANDARD};
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt::{Debug, Formatter, Result as FmtResult};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
const BLOCK_SIZE: usize = 16;

/// Content key and IV for exactly one license grant.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionVoucher {
    asin: String,
    key: String,
    iv: String,
    rules: serde_json::Value,
}
impl DecryptionVoucher {
    pub fn new(grant: &LicenseGrant, key: impl Into<String>, iv: impl Into<String>, rules: serde_json::Value) -> Self {
        Self {
            asin: grant.asin.clone(),
            key: key.into(),
            iv: iv.into(),
            rules,
        }
    }

    /// ASIN of the grant this voucher was unwrapped from.
    pub fn asin(&self) -> &str {
        &self.asin
    }

    /// Hex-encoded content key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hex-encoded content IV.
    pub fn iv(&self) -> &str {
        &self.iv
    }

    /// Usage rules attached to the license, passed through untouched.
    pub fn rules(&self) -> &serde_json::Value {
        &self.rules
    }

    pub fn is_for(&self, grant: &LicenseGrant) -> bool {
        self.asin == grant.asin
    }
}
impl Debug for DecryptionVoucher {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DecryptionVoucher").field("asin", &self.asin).finish_non_exhaustive()
    }
}

/// Opens the voucher inside a license grant.
pub trait VoucherUnwrap: Send + Sync {
    fn unwrap(&self, grant: &LicenseGrant, identity: &Identity) -> Result<DecryptionVoucher>;
}

#[derive(Deserialize)]
struct Plaintext {
    key: Option<String>,
    iv: Option<String>,
    rules: Option<serde_json::Value>,
}

/// ADRM voucher scheme.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdrmVoucher;
impl AdrmVoucher {
    fn derive(identity: &Identity, asin: &str) -> ([u8; BLOCK_SIZE], [u8; BLOCK_SIZE]) {
        let digest = Sha256::new()
            .chain_update(identity.device_type.as_bytes())
            .chain_update(identity.device_serial.as_bytes())
            .chain_update(identity.customer_id.as_bytes())
            .chain_update(asin.as_bytes())
            .finalize();
        let mut key = [0; BLOCK_SIZE];
        let mut iv = [0; BLOCK_SIZE];
        key.copy_from_slice(&digest[..BLOCK_SIZE]);
        iv.copy_from_slice(&digest[BLOCK_SIZE..]);
        (key, iv)
    }

    fn decrypt(identity: &Identity, asin: &str, voucher: &str) -> Result<String> {
        let mut data = BASE64_STANDARD
            .decode(voucher.trim())
            .or_raise(|| ErrorKind::Decryption("voucher is not valid base64"))?;
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            exn::bail!(ErrorKind::Decryption("voucher is not a whole number of cipher blocks"));
        }
        let (key, iv) = Self::derive(identity, asin);
        let plaintext = Aes128CbcDec::new(&key.into(), &iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut data)
            .map_err(|_| ErrorKind::Decryption("voucher is not a whole number of cipher blocks"))?;
        let end = plaintext.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let text = std::str::from_utf8(&plaintext[..end])
            .or_raise(|| ErrorKind::Decryption("voucher plaintext is not text (wrong device or title?)"))?;
        Ok(text.to_string())
    }
}

/// Find `"name":"value"` in text that is not valid JSON. Some vouchers carry
/// trailing bytes after the object.
fn quoted_field(text: &str, name: &str) -> Option<String> {
    let needle = format!("\"{name}\":\"");
    let start = text.find(&needle)? + needle.len();
    let len = text[start..].find('"')?;
    Some(text[start..start + len].to_string())
}

fn checked_hex(value: Option<String>, what: &'static str) -> Result<String> {
    let value = value.filter(|v| !v.is_empty()).ok_or_raise(|| ErrorKind::Decryption(what))?;
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        exn::bail!(ErrorKind::Decryption(what));
    }
    Ok(value)
}

impl VoucherUnwrap for AdrmVoucher {
    #[tracing::instrument(skip_all, fields(asin = %grant.asin))]
    fn unwrap(&self, grant: &LicenseGrant, identity: &Identity) -> Result<DecryptionVoucher> {
        let text = Self::decrypt(identity, &grant.asin, &grant.voucher)?;
        let plaintext = match serde_json::from_str::<Plaintext>(&text) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                tracing::debug!("Voucher plaintext is not clean JSON; scanning for key and iv");
                Plaintext {
                    key: quoted_field(&text, "key"),
                    iv: quoted_field(&text, "iv"),
                    rules: None,
                }
            },
        };
        let key = checked_hex(plaintext.key, "voucher has no hex 'key'")?;
        let iv = checked_hex(plaintext.iv, "voucher has no hex 'iv'")?;
        tracing::debug!("Voucher decrypted");
        Ok(DecryptionVoucher::new(grant, key, iv, plaintext.rules.unwrap_or(serde_json::Value::Null)))
    }
}
