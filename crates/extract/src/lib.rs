pub mod error;
mod merge;
pub mod models;
mod parse;

use tracing::instrument;

use crate::error::Result;
pub use crate::merge::strip_html_paragraphs;
use crate::models::{CatalogMetadata, ExtractedMetadata, MergedMetadata};

/// Top-level entrypoint for reading the transcoder's diagnostic output.
///
/// Picks up the container title, authors and date from the first `Metadata:`
/// block, the first bitrate and audio codec mentioned, and every chapter
/// record (with nested titles).
///
/// # Errors
///
/// - [`ParseError`](error::ErrorKind::ParseError) if a chapter record has
///   malformed numbers.
/// - [`InvalidChapters`](error::ErrorKind::InvalidChapters) if the chapters
///   are out of order, overlap, or have no duration.
#[instrument(skip(text), fields(text_size = text.len()))]
pub fn parse_tool_metadata(text: &str) -> Result<ExtractedMetadata> {
    let metadata = parse::parse(text)?;
    tracing::debug!(
        chapters = metadata.chapters.len(),
        bitrate_kbs = metadata.bitrate_kbs,
        codec = metadata.codec.as_deref(),
        "parsed tool diagnostics"
    );
    Ok(metadata)
}

/// Combine what the audio container says with what the catalog says.
///
/// Pure; the catalog wins for descriptive fields, the container wins for
/// technical ones (bitrate, codec, chapters, length).
pub fn merge_metadata(extracted: ExtractedMetadata, catalog: CatalogMetadata) -> MergedMetadata {
    merge::merge(extracted, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const DIAGNOSTICS: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'B0EXAMPLE.aaxc':
  Metadata:
    major_brand     : aax
    title           : My Book (Unabridged)
    artist          : Jane Doe, John Roe
    date            : 2020
  Duration: 05:00:00.00, start: 0.000000, bitrate: 64 kb/s
  Chapters:
    Chapter #0:0: start 0.000000, end 120.000000
      Metadata:
        title           : Chapter 1
    Chapter #0:1: start 120.000000, end 300.000000
  Stream #0:0(und): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 62 kb/s
";

    #[test]
    fn test_parse_diagnostics() {
        let metadata = parse_tool_metadata(DIAGNOSTICS).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("My Book"));
        assert!(metadata.unabridged_marker);
        assert_eq!(metadata.authors, vec!["Jane Doe", "John Roe"]);
        assert_eq!(metadata.date.as_deref(), Some("2020"));
        assert_eq!(metadata.bitrate_kbs, Some(64));
        assert_eq!(metadata.codec.as_deref(), Some("aac"));
        assert_eq!(metadata.chapters.len(), 2);
        assert_eq!(metadata.chapters[0].title.as_deref(), Some("Chapter 1"));
        assert_eq!(metadata.chapters[1].title, None);
        assert_eq!(metadata.length(), Some(300.0));
    }

    #[test]
    fn test_merge_with_catalog() {
        let extracted = parse_tool_metadata(DIAGNOSTICS).unwrap();
        let catalog = CatalogMetadata {
            sku_lite: Some("BK123".to_string()),
            release_date: Some(date!(2020 - 06 - 01)),
            ..Default::default()
        };
        let merged = merge_metadata(extracted, catalog);
        assert_eq!(merged.title.as_deref(), Some("My Book"));
        assert_eq!(merged.author, vec!["Jane Doe", "John Roe"]);
        assert_eq!(merged.year.as_deref(), Some("2020"));
        assert_eq!(merged.abridged, Some(false));
        assert_eq!(merged.sku.as_deref(), Some("BK123"));
        assert_eq!(merged.length, Some(300.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_merged_document_shape() {
        let merged = merge_metadata(parse_tool_metadata(DIAGNOSTICS).unwrap(), CatalogMetadata::default());
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["bitrate_kbs"], 64);
        assert_eq!(json["length"], 300.0);
        assert_eq!(json["chapters"]["0"]["startTime"], 0.0);
        assert_eq!(json["chapters"]["0"]["endTime"], 120.0);
        assert_eq!(json["chapters"]["0"]["title"], "Chapter 1");
        assert!(json["chapters"]["1"].get("title").is_none());
        assert!(json.get("subtitle").is_none());
    }
}
