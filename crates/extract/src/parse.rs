//! Line-oriented reader for the tool's diagnostic output.
//!
//! The diagnostics of interest look like this:
//!
//! ```text
//! Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'B0EXAMPLE.aaxc':
//!   Metadata:
//!     title           : My Book (Unabridged)
//!     artist          : Jane Doe, John Roe
//!     date            : 2020
//!   Duration: 05:00:00.00, start: 0.000000, bitrate: 64 kb/s
//!   Chapters:
//!     Chapter #0:0: start 0.000000, end 120.000000
//!       Metadata:
//!         title           : Chapter 1
//!   Stream #0:0(und): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 62 kb/s
//! Output #0, ipod, to 'B0EXAMPLE.m4b':
//! ```
//!
//! Each line is classified into a [`Line`], then a small state machine tracks
//! which `Metadata:` block a `key : value` pair belongs to. Everything after
//! the first `Output #` header describes what was written, not what was read,
//! and is ignored.

use crate::error::{ErrorKind, Result};
use crate::models::{Chapter, Chapters, ExtractedMetadata};
use exn::{OptionExt, ResultExt};

const UNABRIDGED_MARKER: &str = "(Unabridged)";

#[derive(Debug, PartialEq)]
enum Line<'a> {
    Input,
    Output,
    MetadataMarker,
    Duration,
    Chapter(&'a str),
    Stream,
    Pair(&'a str, &'a str),
    Other,
}
impl<'a> Line<'a> {
    fn classify(raw: &'a str) -> Self {
        let line = raw.trim();
        if line.starts_with("Input #") {
            Line::Input
        } else if line.starts_with("Output #") {
            Line::Output
        } else if line == "Metadata:" {
            Line::MetadataMarker
        } else if line.starts_with("Duration:") {
            Line::Duration
        } else if let Some(record) = line.strip_prefix("Chapter #") {
            Line::Chapter(record)
        } else if line.starts_with("Stream #") {
            Line::Stream
        } else if let Some((key, value)) = line.split_once(':') {
            Line::Pair(key.trim(), value.trim())
        } else {
            Line::Other
        }
    }
}

/// Which block the reader is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    /// Before the first `Metadata:` marker.
    Preamble,
    /// The container-level metadata block.
    Header,
    /// Between blocks; pairs here are ignored.
    Body,
    /// Directly after a chapter record, before its nested block (if any).
    Chapter,
    /// The nested `Metadata:` block of the latest chapter.
    ChapterMetadata,
    /// Stream or other metadata blocks nobody asked for.
    Ignored,
}

/// Parse a `Chapter #0:<index>: start <float>, end <float>` record (with the
/// `Chapter #` prefix already removed). The comma is optional.
fn chapter_record(record: &str) -> Result<Chapter> {
    let malformed = || ErrorKind::ParseError {
        field: "chapter",
        value: record.to_string(),
    };
    let (ident, times) = record.trim().split_once(char::is_whitespace).ok_or_raise(malformed)?;
    let index = ident
        .trim_end_matches(':')
        .split_once(':')
        .map(|(_stream, index)| index)
        .ok_or_raise(malformed)?;
    let index = index.parse::<u32>().or_raise(|| ErrorKind::ParseError {
        field: "chapter index",
        value: index.to_string(),
    })?;
    let times = times.trim().strip_prefix("start").ok_or_raise(malformed)?;
    let (start, end) = times.split_once("end").ok_or_raise(malformed)?;
    let start = start.trim().trim_end_matches(',').trim();
    let end = end.trim();
    Ok(Chapter::new(
        index,
        start.parse::<f64>().or_raise(|| ErrorKind::ParseError {
            field: "chapter start",
            value: start.to_string(),
        })?,
        end.parse::<f64>().or_raise(|| ErrorKind::ParseError {
            field: "chapter end",
            value: end.to_string(),
        })?,
        None::<String>,
    ))
}

/// First integer immediately preceding a literal `kb/s`.
fn bitrate(line: &str) -> Option<u32> {
    let mut rest = line;
    while let Some(at) = rest.find("kb/s") {
        let before = rest[..at].trim_end();
        let digits = before.chars().rev().take_while(char::is_ascii_digit).count();
        if let Ok(value) = before[before.len() - digits..].parse() {
            return Some(value);
        }
        rest = &rest[at + "kb/s".len()..];
    }
    None
}

/// First token after a literal `Audio:`, without a trailing comma.
fn codec(line: &str) -> Option<String> {
    let (_, rest) = line.split_once("Audio:")?;
    let token = rest.split_whitespace().next()?.trim_end_matches(',');
    (!token.is_empty()).then(|| token.to_string())
}

fn header_pair(metadata: &mut ExtractedMetadata, key: &str, value: &str) {
    match key {
        "title" => {
            metadata.unabridged_marker = value.contains(UNABRIDGED_MARKER);
            let title = value.replace(UNABRIDGED_MARKER, "");
            let title = title.trim();
            metadata.title = (!title.is_empty()).then(|| title.to_string());
        },
        "artist" => {
            metadata.authors =
                value.split(',').map(str::trim).filter(|a| !a.is_empty()).map(str::to_string).collect();
        },
        "date" if !value.is_empty() => metadata.date = Some(value.to_string()),
        _ => {},
    }
}

pub(crate) fn parse(text: &str) -> Result<ExtractedMetadata> {
    let mut metadata = ExtractedMetadata::default();
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut block = Block::Preamble;
    let mut seen_header = false;

    for raw in text.lines() {
        if metadata.bitrate_kbs.is_none() {
            metadata.bitrate_kbs = bitrate(raw);
        }
        if metadata.codec.is_none() {
            metadata.codec = codec(raw);
        }
        block = match (Line::classify(raw), block) {
            (Line::Output, _) => break,
            (Line::Input, _) | (Line::Duration, _) | (Line::Stream, _) | (Line::Other, _) => match block {
                Block::Preamble => Block::Preamble,
                _ => Block::Body,
            },
            (Line::Chapter(record), _) => {
                chapters.push(chapter_record(record)?);
                Block::Chapter
            },
            (Line::MetadataMarker, Block::Preamble) if !seen_header => {
                seen_header = true;
                Block::Header
            },
            (Line::MetadataMarker, Block::Chapter) => Block::ChapterMetadata,
            (Line::MetadataMarker, _) => Block::Ignored,
            (Line::Pair(key, value), Block::Header) => {
                header_pair(&mut metadata, key, value);
                Block::Header
            },
            (Line::Pair("title", value), Block::ChapterMetadata) => {
                if let Some(chapter) = chapters.last_mut().filter(|c| c.title.is_none() && !value.is_empty()) {
                    chapter.title = Some(value.to_string());
                }
                Block::ChapterMetadata
            },
            (Line::Pair(..), Block::Chapter) => Block::Body,
            (Line::Pair(..), block) => block,
        };
    }

    metadata.chapters = Chapters::new(chapters)?;
    Ok(metadata)
}
