use crate::error::Error;
use crate::publish::{ArtifactKind, PublishedArtifact};
use crate::run::Acquisition;
use earmark_extract::models::MergedMetadata;
use serde::Serialize;

pub const SUCCESS_MESSAGE: &str = "Audible file downloaded and uploaded successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The JSON answer to an acquisition request.
///
/// Failed runs still carry whatever was produced before the failure, such as
/// the keys of artifacts that did get published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionResponse {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aaxc_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m4b_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence_rules: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MergedMetadata>,
}

fn verified_key(artifacts: &[PublishedArtifact], kind: ArtifactKind) -> Option<String> {
    artifacts.iter().find(|a| a.kind == kind && a.verified).map(|a| a.key.clone())
}

impl AcquisitionResponse {
    /// A response for a request that never got as far as a run.
    pub fn rejected(error: &Error) -> Self {
        Self::from_parts(Acquisition::default(), Some(error))
    }

    pub fn from_parts(acquisition: Acquisition, error: Option<&Error>) -> Self {
        let (status, message, error_kind) = match error {
            None => (Status::Success, SUCCESS_MESSAGE.to_string(), None),
            Some(err) => (Status::Error, (**err).to_string(), Some(err.name())),
        };
        let artifacts = &acquisition.artifacts;
        Self {
            status,
            message,
            error_kind,
            download_status: acquisition.download.map(|bytes| format!("completed ({bytes} bytes)")),
            aaxc_path: verified_key(artifacts, ArtifactKind::Audio),
            m4b_path: verified_key(artifacts, ArtifactKind::Decrypted),
            metadata_path: verified_key(artifacts, ArtifactKind::Metadata),
            cover_path: verified_key(artifacts, ArtifactKind::Cover),
            key: acquisition.voucher.as_ref().map(|v| v.key().to_string()),
            iv: acquisition.voucher.as_ref().map(|v| v.iv().to_string()),
            licence_rules: acquisition.voucher.as_ref().map(|v| v.rules().clone()).filter(|r| !r.is_null()),
            metadata: acquisition.metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
