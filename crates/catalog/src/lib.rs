mod client;
mod credentials;
mod download;
mod dto;
pub mod error;
mod models;
mod voucher;

pub use crate::client::CatalogClient;
pub use crate::credentials::{Credentials, Identity, Marketplace};
pub use crate::download::{DownloadedAsset, Downloader, Progress, ProgressTracker};
pub use crate::models::{Identifier, LicenseGrant, Quality};
pub use crate::voucher::{AdrmVoucher, DecryptionVoucher, VoucherUnwrap};
