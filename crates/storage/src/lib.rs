pub mod backend;
pub mod error;
mod path;
mod provider;

pub use crate::backend::StorageBackend;
pub use crate::path::validate as validate_path;
pub use crate::provider::{BucketProvider, LocalProvider};
#[cfg(any(test, feature = "mock"))]
pub use crate::provider::MockProvider;
#[cfg(feature = "s3")]
pub use crate::provider::S3Provider;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
