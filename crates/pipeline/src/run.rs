//! The acquisition run.
//!
//! A run walks the [`Stage`]s in order: resolve and license the title, open
//! the voucher, download, strip the DRM, read the tool's diagnostics, merge
//! them with the catalog entry, then publish everything as one batch. Every
//! local artifact exists before the first upload starts.

use crate::error::{Error, ErrorKind, Result};
use crate::publish::{ArtifactKind, PendingArtifact, PublishedArtifact, Publisher};
use crate::request::AcquisitionRequest;
use crate::response::AcquisitionResponse;
use crate::stage::Stage;
use crate::workdir::WorkDir;
use earmark_catalog::error::Error as CatalogError;
use earmark_catalog::{AdrmVoucher, CatalogClient, DecryptionVoucher, Downloader, Progress, VoucherUnwrap};
use earmark_config::{Config, StorageConfig};
use earmark_extract::models::MergedMetadata;
use earmark_storage::backend::S3Backend;
use earmark_storage::{BucketProvider, LocalProvider, S3Provider};
use earmark_transcode::{ProcessRunner, TOOL_NAME, ToolLocation, ToolRunner, Transcoder};
use exn::ResultExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

/// Everything a run produced, whether or not it succeeded.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    pub stage: Stage,
    pub asin: Option<String>,
    /// Size of the completed download.
    pub download: Option<u64>,
    pub voucher: Option<DecryptionVoucher>,
    pub metadata: Option<MergedMetadata>,
    pub artifacts: Vec<PublishedArtifact>,
    /// The run directory, when the retention policy kept it.
    pub kept_dir: Option<PathBuf>,
}
impl Acquisition {
    fn advance(&mut self, to: Stage) -> Result<()> {
        self.stage = self.stage.advance(to)?;
        Ok(())
    }
}

/// A finished run.
#[derive(Debug)]
pub struct Report {
    pub acquisition: Acquisition,
    pub error: Option<Error>,
}
impl Report {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_response(self) -> AcquisitionResponse {
        AcquisitionResponse::from_parts(self.acquisition, self.error.as_ref())
    }
}

enum Tooling {
    Located(ToolLocation),
    Runner(Arc<dyn ToolRunner>),
}

fn license_error(err: CatalogError) -> Error {
    ErrorKind::catalog(err, ErrorKind::License)
}

/// Acquires titles into object storage.
///
/// Configuration is fixed at construction; one pipeline serves any number of
/// runs, concurrently if wanted.
pub struct Pipeline {
    config: Config,
    buckets: Arc<dyn BucketProvider>,
    voucher: Arc<dyn VoucherUnwrap>,
    tooling: Tooling,
    downloader: Downloader,
    api_base: Option<Url>,
}

impl Pipeline {
    /// A pipeline publishing through `buckets`, unwrapping ADRM vouchers and
    /// running the transcoder found by [`Config::tool_location`].
    pub fn new(config: Config, buckets: Arc<dyn BucketProvider>) -> Result<Self> {
        let api_base = config
            .catalog
            .api_base
            .as_deref()
            .map(Url::parse)
            .transpose()
            .or_raise(|| ErrorKind::Unknown("catalog.api_base is not a valid URL".into()))?;
        Ok(Self {
            tooling: Tooling::Located(config.tool_location()),
            voucher: Arc::new(AdrmVoucher),
            downloader: Downloader::default(),
            api_base,
            buckets,
            config,
        })
    }

    /// Like [`new`](Self::new), with storage built from the configuration.
    pub async fn from_config(config: Config) -> Result<Self> {
        let buckets: Arc<dyn BucketProvider> = match &config.storage {
            StorageConfig::Local { root } => Arc::new(LocalProvider::new(root.clone())),
            StorageConfig::S3 {
                region,
                endpoint,
                key_id,
                key_secret,
            } => {
                // Requests pick the real bucket.
                let template =
                    S3Backend::new("s3", "unset", None, region.clone(), endpoint.clone(), key_id.clone(), key_secret.expose())
                        .await
                        .or_raise(|| ErrorKind::Unknown("cannot configure S3 storage".into()))?;
                Arc::new(S3Provider::new(template))
            },
        };
        Self::new(config, buckets)
    }

    pub fn with_voucher(mut self, voucher: Arc<dyn VoucherUnwrap>) -> Self {
        self.voucher = voucher;
        self
    }

    /// Use `runner` instead of locating the transcoder.
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.tooling = Tooling::Runner(runner);
        self
    }

    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    /// Validate a JSON request and run it. Always answers, never panics.
    pub async fn handle(&self, body: Value) -> AcquisitionResponse {
        match AcquisitionRequest::from_value(body) {
            Ok(request) => self.run(&request).await.into_response(),
            Err(err) => {
                tracing::warn!(error = ?err, "Rejected request");
                AcquisitionResponse::rejected(&err)
            },
        }
    }

    /// Acquire one title, bounded by the configured timeout.
    #[instrument(skip(self, request), fields(identifier = %request.identifier, bucket = %request.bucket))]
    pub async fn run(&self, request: &AcquisitionRequest) -> Report {
        let mut acquisition = Acquisition::default();
        let result = self.run_in_workdir(request, &mut acquisition).await;
        match &result {
            Ok(()) => tracing::info!("Acquisition complete"),
            Err(err) => {
                tracing::warn!(stage = %acquisition.stage, error = ?err, "Acquisition failed");
                acquisition.stage = acquisition.stage.fail();
            },
        }
        Report {
            acquisition,
            error: result.err(),
        }
    }

    async fn run_in_workdir(&self, request: &AcquisitionRequest, acquisition: &mut Acquisition) -> Result<()> {
        let workdir = WorkDir::create(&self.config.work_dir, request.identifier.value(), self.config.retention)?;
        let result = match tokio::time::timeout(self.config.timeout(), self.execute(request, &workdir, acquisition)).await
        {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::Timeout(self.config.timeout_secs).into()),
        };
        acquisition.kept_dir = workdir.finish();
        result
    }

    async fn execute(&self, request: &AcquisitionRequest, workdir: &WorkDir, acquisition: &mut Acquisition) -> Result<()> {
        let identity = request.identity()?;
        let backend = self
            .buckets
            .open(&request.bucket)
            .or_raise(|| ErrorKind::RequestValidation(format!("unusable bucket: {}", request.bucket)))?;
        let publisher = Publisher::new(backend);
        let client = CatalogClient::new(&identity, self.api_base.clone()).map_err(license_error)?;

        let asin = client.resolve(&request.identifier).await.map_err(license_error)?;
        let catalog = client.product(&asin).await.map_err(license_error)?;
        let grant = client.request_license(&asin, request.quality).await.map_err(license_error)?;
        acquisition.asin = Some(asin.clone());
        acquisition.advance(Stage::LicenseResolved)?;

        let voucher = self
            .voucher
            .unwrap(&grant, &identity)
            .map_err(|e| ErrorKind::catalog(e, ErrorKind::Decryption))?;
        if !voucher.is_for(&grant) {
            exn::bail!(ErrorKind::Decryption(format!(
                "voucher belongs to {}, not {}",
                voucher.asin(),
                grant.asin
            )));
        }
        acquisition.voucher = Some(voucher.clone());
        acquisition.advance(Stage::VoucherDecrypted)?;

        let raw = workdir.file(&asin, ArtifactKind::Audio.extension());
        let mut on_progress = |progress: Progress| {
            if let Progress::Percent(percent) = progress {
                tracing::info!(percent, "Downloading");
            }
        };
        let asset = self
            .downloader
            .download(&grant.content_url, &raw, &mut on_progress)
            .await
            .map_err(|e| ErrorKind::catalog(e, ErrorKind::Download))?;
        acquisition.download = Some(asset.size);
        acquisition.advance(Stage::Downloaded)?;

        let transcoder = Transcoder::new(self.runner(&publisher).await?);
        let decrypted = workdir.file(&asin, ArtifactKind::Decrypted.extension());
        let stripped = transcoder
            .strip_drm(&asset.path, voucher.key(), voucher.iv(), &decrypted)
            .await
            .map_err(ErrorKind::transcode)?;
        acquisition.advance(Stage::AudioStripped)?;

        let extracted = earmark_extract::parse_tool_metadata(&stripped.diagnostics).map_err(|e| {
            let message = format!("unreadable tool diagnostics: {}", *e);
            e.raise(ErrorKind::Unknown(message))
        })?;
        acquisition.advance(Stage::MetadataExtracted)?;

        let merged = earmark_extract::merge_metadata(extracted, catalog);
        let name = merged.sku.clone().unwrap_or_else(|| asin.clone());
        let metadata_file = workdir.file(&name, ArtifactKind::Metadata.extension());
        let document =
            serde_json::to_vec_pretty(&merged).or_raise(|| ErrorKind::Unknown("cannot serialise metadata".into()))?;
        tokio::fs::write(&metadata_file, document)
            .await
            .or_raise(|| ErrorKind::Unknown(format!("cannot write {}", metadata_file.display())))?;
        acquisition.metadata = Some(merged);
        acquisition.advance(Stage::MetadataMerged)?;

        let cover_file = workdir.file(&name, ArtifactKind::Cover.extension());
        let cover = transcoder.extract_cover(&stripped.path, &cover_file).await;

        let pending = |kind: ArtifactKind, local: PathBuf| PendingArtifact {
            local,
            key: request.key(&name, kind.extension()),
            kind,
            required: true,
        };
        let mut batch = vec![pending(ArtifactKind::Audio, asset.path.clone())];
        if self.config.publish_decrypted {
            batch.push(pending(ArtifactKind::Decrypted, stripped.path.clone()));
        }
        batch.push(pending(ArtifactKind::Metadata, metadata_file));
        let cover_failure = match cover {
            Ok(path) => {
                batch.push(pending(ArtifactKind::Cover, path));
                None
            },
            Err(err) => {
                let err = ErrorKind::transcode(err);
                tracing::warn!(error = ?err, "Cover extraction failed");
                let key = request.key(&name, ArtifactKind::Cover.extension());
                Some(PublishedArtifact::unpublished(ArtifactKind::Cover, key, true, (*err).to_string()))
            },
        };
        let mut artifacts = publisher.publish_all(batch).await;
        artifacts.extend(cover_failure);
        acquisition.artifacts = artifacts;
        acquisition.advance(Stage::Published)?;

        let blocking: Vec<String> = acquisition
            .artifacts
            .iter()
            .filter(|a| a.is_blocking())
            .map(|a| format!("{} {}: {}", a.kind, a.key, a.error.as_deref().unwrap_or("not verified").trim()))
            .collect();
        if !blocking.is_empty() {
            exn::bail!(ErrorKind::Publish(format!(
                "{} of {} artifacts not published; {}",
                blocking.len(),
                acquisition.artifacts.len(),
                blocking.join("; ")
            )));
        }
        acquisition.advance(Stage::Done)
    }

    async fn runner(&self, publisher: &Publisher) -> Result<Arc<dyn ToolRunner>> {
        let location = match &self.tooling {
            Tooling::Runner(runner) => return Ok(runner.clone()),
            Tooling::Located(location) => location,
        };
        let program = match location {
            ToolLocation::Shared { cache_dir } => publisher.ensure_shared_binary(cache_dir).await.map_err(|e| {
                let message = format!("cannot fetch shared {TOOL_NAME}: {}", *e);
                e.raise(ErrorKind::Conversion(message))
            })?,
            local => match local.resolve_local() {
                Some(found) => found.map_err(ErrorKind::transcode)?,
                None => exn::bail!(ErrorKind::Conversion(format!("cannot locate {TOOL_NAME}"))),
            },
        };
        Ok(Arc::new(ProcessRunner::new(program)))
    }
}
