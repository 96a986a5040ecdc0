use crate::error::{ErrorKind, Result};
use crate::runner::{ToolOutput, ToolRunner};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// A decrypted audio container and what the tool said while producing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    pub path: PathBuf,
    /// The tool's diagnostic output (stderr), which describes the input's
    /// metadata, chapters and streams.
    pub diagnostics: String,
}

/// Builds argument lists for the two conversions and interprets the results.
#[derive(Clone)]
pub struct Transcoder {
    runner: Arc<dyn ToolRunner>,
}
impl Transcoder {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Remove DRM from `asset` by stream-copying its audio (with container
    /// metadata and chapters) into `output`.
    ///
    /// The embedded cover picture, when there is one, is copied too, so that
    /// [`extract_cover`](Self::extract_cover) can read it from `output`.
    ///
    /// `key` and `iv` are the hex strings from the decryption voucher.
    #[instrument(skip(self, key, iv), fields(asset = %asset.display(), output = %output.display()))]
    pub async fn strip_drm(&self, asset: &Path, key: &str, iv: &str, output: &Path) -> Result<Stripped> {
        let args = strip_drm_args(asset, key, iv, output);
        let result = self.invoke(&args, output).await?;
        tracing::info!("DRM removed from audio container");
        Ok(Stripped {
            path: output.to_path_buf(),
            diagnostics: result.stderr,
        })
    }

    /// Copy the first embedded picture of `input` into `output`.
    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub async fn extract_cover(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let args = extract_cover_args(input, output);
        self.invoke(&args, output).await?;
        tracing::info!("Cover art extracted");
        Ok(output.to_path_buf())
    }

    async fn invoke(&self, args: &[OsString], output: &Path) -> Result<ToolOutput> {
        let result = self.runner.run(args).await?;
        if !result.success() {
            tracing::warn!(code = ?result.code, "Tool exited unsuccessfully");
            exn::bail!(ErrorKind::ConversionFailed {
                code: result.code,
                stderr: result.stderr,
            });
        }
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            exn::bail!(ErrorKind::MissingOutput(output.to_path_buf()));
        }
        Ok(result)
    }
}

fn strip_drm_args(asset: &Path, key: &str, iv: &str, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-y", "-audible_key", key, "-audible_iv", iv, "-i"].map(OsString::from).into();
    args.push(asset.into());
    args.extend(["-map", "0:a", "-map", "0:v?", "-map_metadata", "0", "-map_chapters", "0", "-c", "copy"].map(OsString::from));
    args.push(output.into());
    args
}

fn extract_cover_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-y", "-i"].map(OsString::from).into();
    args.push(input.into());
    args.extend(["-an", "-map", "0:v:0", "-c:v", "copy", "-frames:v", "1"].map(OsString::from));
    args.push(output.into());
    args
}
