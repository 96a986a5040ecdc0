//! Buckets on S3 or anything that speaks its API (MinIO, R2, GCS interop).
//!
//! Access keys come from configuration rather than the ambient AWS credential
//! chain, so one process can publish into whichever bucket a request names.

use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, validate_path};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, retry::RetryConfig};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::primitives::ByteStream;
use exn::{OptionExt, ResultExt};
use std::path::Path;

/// One initial attempt plus three retries with exponential back-off.
const MAX_ATTEMPTS: u32 = 4;

/// An S3 bucket, optionally narrowed to a key prefix.
///
/// ```no_run
/// use earmark_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bucket = S3Backend::new(
///     "s3",
///     "audible-raw",
///     None,
///     "auto",
///     Some("https://minio.internal:9000"),
///     "access_key_id",
///     "secret_access_key",
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Backend {
    /// Build a client from explicit credentials. Path-style addressing is
    /// forced so that self-hosted endpoints work without wildcard DNS.
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let mut config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(Credentials::new(key_id, key_secret, None, None, "earmark-config"))
            .region(Region::new(region.into()))
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
            .force_path_style(true);
        if let Some(endpoint) = endpoint {
            config = config.endpoint_url(endpoint);
        }
        Self::from_client(name, Client::from_conf(config.build()), bucket, prefix)
    }

    pub fn from_client(
        name: impl Into<String>,
        client: Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidBucket(bucket));
        }
        let prefix = match prefix {
            Some(prefix) => Some(key_string(&prefix)?),
            None => None,
        };
        Ok(Self {
            name: name.into(),
            client,
            bucket,
            prefix,
        })
    }

    /// The same client and prefix pointed at another bucket.
    pub fn with_bucket(&self, bucket: impl Into<String>) -> Result<Self> {
        Self::from_client(self.name.clone(), self.client.clone(), bucket, self.prefix.clone())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_key(&self, key: &Path) -> Result<String> {
        let key = key_string(key)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        })
    }

    /// `HEAD` the object; `None` when the service says it does not exist.
    async fn head(&self, key: &Path) -> Result<Option<HeadObjectOutput>> {
        let object_key = self.object_key(key)?;
        match self.client.head_object().bucket(&self.bucket).key(&object_key).send().await {
            Ok(output) => Ok(Some(output)),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(err) => exn::bail!(classify(&err)),
        }
    }
}

/// Validate `key` and render it with forward slashes.
fn key_string(key: impl AsRef<Path>) -> Result<String> {
    let valid = validate_path(key)?;
    let rendered = valid.to_str().ok_or_raise(|| ErrorKind::InvalidPath(valid.clone()))?;
    Ok(rendered.to_string())
}

/// Transport failures are network errors; anything the service answered with
/// is a backend error.
fn classify<E, R>(err: &SdkError<E, R>) -> ErrorKind
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ErrorKind::Network(message),
        _ => ErrorKind::BackendError(message),
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &Path) -> Result<bool> {
        Ok(self.head(key).await?.is_some())
    }

    async fn read(&self, key: &Path) -> Result<Vec<u8>> {
        let object_key = self.object_key(key)?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&object_key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(key.to_path_buf()))
            },
            Err(err) => exn::bail!(classify(&err)),
        };
        let body = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network(format!("body of s3://{}/{object_key} was cut short", self.bucket)))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn write(&self, key: &Path, data: &[u8]) -> Result<()> {
        let object_key = self.object_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| classify(&err))?;
        tracing::debug!(bucket = %self.bucket, key = %object_key, bytes = data.len(), "Put object");
        Ok(())
    }

    /// Streams `local` from disk; audio files run to hundreds of megabytes.
    async fn put_file(&self, local: &Path, key: &Path) -> Result<()> {
        let object_key = self.object_key(key)?;
        let body = ByteStream::from_path(local).await.or_raise(|| ErrorKind::NotFound(local.to_path_buf()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(body)
            .send()
            .await
            .map_err(|err| classify(&err))?;
        tracing::debug!(bucket = %self.bucket, key = %object_key, source = %local.display(), "Uploaded file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
    use aws_sdk_s3::operation::head_object::{HeadObjectError, HeadObjectOutput};
    use aws_sdk_s3::types::error::{NoSuchKey, NotFound};
    use aws_smithy_mocks::{RuleMode, mock, mock_client};

    fn offline_client() -> Client {
        Client::from_conf(
            aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .build(),
        )
    }

    #[test]
    fn test_object_key_without_prefix() {
        let backend = S3Backend::from_client("s3", offline_client(), "bucket", None).unwrap();
        let key = backend.object_key(Path::new("UserData/uid/BK123.aaxc")).unwrap();
        assert_eq!(key, "UserData/uid/BK123.aaxc");
    }

    #[test]
    fn test_object_key_with_trailing_slash_prefix() {
        let backend = S3Backend::from_client("s3", offline_client(), "bucket", Some("library/".to_string())).unwrap();
        let key = backend.object_key(Path::new("UserData/uid/BK123.aaxc")).unwrap();
        assert_eq!(key, "library/UserData/uid/BK123.aaxc");
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let err = S3Backend::from_client("s3", offline_client(), "  ", None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidBucket(_)));
    }

    #[test]
    fn test_with_bucket_keeps_prefix() {
        let backend = S3Backend::from_client("s3", offline_client(), "one", Some("p".to_string())).unwrap();
        let other = backend.with_bucket("two").unwrap();
        assert_eq!(other.bucket(), "two");
        assert_eq!(other.object_key(Path::new("x.json")).unwrap(), "p/x.json");
    }

    #[tokio::test]
    async fn test_exists_found() {
        let rule = mock!(Client::head_object)
            .match_requests(|req| req.bucket() == Some("bucket") && req.key() == Some("raw/BK123.aaxc"))
            .then_output(|| HeadObjectOutput::builder().content_length(5).build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("s3", client, "bucket", None).unwrap();
        assert!(backend.exists(Path::new("raw/BK123.aaxc")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_not_found() {
        let rule = mock!(Client::head_object)
            .then_error(|| HeadObjectError::NotFound(NotFound::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("s3", client, "bucket", None).unwrap();
        assert!(!backend.exists(Path::new("raw/BK123.aaxc")).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_body() {
        let rule = mock!(Client::get_object)
            .match_requests(|req| req.key() == Some("bin/ffmpeg"))
            .then_output(|| GetObjectOutput::builder().body(ByteStream::from_static(b"\x7fELF")).build());
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("s3", client, "bucket", None).unwrap();
        assert_eq!(backend.read(Path::new("bin/ffmpeg")).await.unwrap(), b"\x7fELF");
    }

    #[tokio::test]
    async fn test_read_missing_key() {
        let rule =
            mock!(Client::get_object).then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::MatchAny, [&rule]);
        let backend = S3Backend::from_client("s3", client, "bucket", None).unwrap();
        let err = backend.read(Path::new("bin/ffmpeg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
