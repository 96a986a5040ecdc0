use super::Chapters;

/// Everything the tool's diagnostic output says about a decrypted title.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtractedMetadata {
    /// Container title with any `(Unabridged)` marker removed
    pub title: Option<String>,
    /// Comma-separated `artist` tag, split and trimmed
    pub authors: Vec<String>,
    /// `date` tag, verbatim
    pub date: Option<String>,
    pub bitrate_kbs: Option<u32>,
    pub codec: Option<String>,
    pub chapters: Chapters,
    /// Whether the container title carried the literal `(Unabridged)`
    pub unabridged_marker: bool,
}
impl ExtractedMetadata {
    /// Total length in seconds: the end of the last chapter.
    pub fn length(&self) -> Option<f64> {
        self.chapters.length()
    }
}
