//! Streaming content download.
//!
//! Bytes are written to a `.part` sibling of the destination as they arrive
//! and only renamed into place once the whole body has been received, so a
//! [`DownloadedAsset`] always refers to complete data.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use reqwest::Client;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::instrument;
use url::Url;

const MILESTONES: [u8; 5] = [0, 25, 50, 75, 100];

/// Observable download progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Started,
    /// Only reported when the size is known up front; each milestone once.
    Percent(u8),
    Completed { bytes: u64 },
}

/// Converts received byte counts into percentage milestones.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: Option<u64>,
    received: u64,
    next: usize,
}
impl ProgressTracker {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total,
            received: 0,
            next: 0,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Record `bytes` more and return the milestones crossed, in order.
    pub fn advance(&mut self, bytes: u64) -> Vec<u8> {
        self.received = self.received.saturating_add(bytes);
        let Some(total) = self.total else {
            return Vec::new();
        };
        let percent = match total {
            0 => 100,
            total => (u128::from(self.received) * 100 / u128::from(total)).min(100) as u8,
        };
        let mut crossed = Vec::new();
        while let Some(&milestone) = MILESTONES.get(self.next) {
            if milestone > percent {
                break;
            }
            crossed.push(milestone);
            self.next += 1;
        }
        crossed
    }
}

/// A fully downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedAsset {
    pub path: PathBuf,
    pub size: u64,
}

fn part_path(destination: &Path) -> Result<PathBuf> {
    let mut name: OsString = destination
        .file_name()
        .ok_or_raise(|| ErrorKind::Download(format!("{} is not a file path", destination.display())))?
        .to_os_string();
    name.push(".part");
    Ok(destination.with_file_name(name))
}

#[derive(Debug, Clone, Default)]
pub struct Downloader {
    http: Client,
}
impl Downloader {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Stream `url` into `destination`, reporting progress as it goes.
    ///
    /// An existing file at `destination` is overwritten. On any failure the
    /// partial file is removed and nothing is left at `destination` by this
    /// call.
    #[instrument(skip(self, url, on_progress), fields(host = url.host_str(), destination = %destination.display()))]
    pub async fn download(
        &self,
        url: &Url,
        destination: &Path,
        on_progress: &mut (impl FnMut(Progress) + Send),
    ) -> Result<DownloadedAsset> {
        let part = part_path(destination)?;
        let bytes = match self.fetch(url, &part, on_progress).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                    tracing::debug!(error = %cleanup, "Could not remove partial download");
                }
                return Err(err);
            },
        };
        tokio::fs::rename(&part, destination).await.or_raise(|| ErrorKind::Io)?;
        tracing::info!(bytes, "Download complete");
        on_progress(Progress::Completed { bytes });
        Ok(DownloadedAsset {
            path: destination.to_path_buf(),
            size: bytes,
        })
    }

    async fn fetch(&self, url: &Url, part: &Path, on_progress: &mut (impl FnMut(Progress) + Send)) -> Result<u64> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .or_raise(|| ErrorKind::Download("request failed".into()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Download(format!("HTTP {status}")));
        }
        let total = response.content_length();
        tracing::debug!(total, "Download started");
        on_progress(Progress::Started);
        let mut tracker = ProgressTracker::new(total);
        let mut report = |crossed: Vec<u8>| {
            for percent in crossed {
                tracing::debug!(percent, "Download progress");
                on_progress(Progress::Percent(percent));
            }
        };
        report(tracker.advance(0));

        let file = File::create(part).await.or_raise(|| ErrorKind::Io)?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.or_raise(|| ErrorKind::Download("connection interrupted".into()))?;
            writer.write_all(&chunk).await.or_raise(|| ErrorKind::Io)?;
            report(tracker.advance(chunk.len() as u64));
        }
        writer.flush().await.or_raise(|| ErrorKind::Io)?;

        if let Some(total) = total
            && tracker.received() != total
        {
            exn::bail!(ErrorKind::Download(format!("received {} of {total} bytes", tracker.received())));
        }
        Ok(tracker.received())
    }
}
