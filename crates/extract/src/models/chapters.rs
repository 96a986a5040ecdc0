use crate::error::{ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::Deref;

/// A single chapter record, times in seconds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Chapter {
    /// Literal chapter number from the diagnostics (starting at 0)
    #[cfg_attr(feature = "serde", serde(skip))]
    pub index: u32,
    #[cfg_attr(feature = "serde", serde(rename = "startTime"))]
    pub start: f64,
    #[cfg_attr(feature = "serde", serde(rename = "endTime"))]
    pub end: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub title: Option<String>,
}
impl Chapter {
    pub fn new(index: u32, start: f64, end: f64, title: Option<impl Into<String>>) -> Self {
        Self {
            index,
            start,
            end,
            title: title.map(Into::into),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
impl From<(u32, f64, f64)> for Chapter {
    fn from((index, start, end): (u32, f64, f64)) -> Self {
        Chapter::new(index, start, end, None::<String>)
    }
}
impl Display for Chapter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.title {
            Some(title) => write!(f, "#{} [{:.3}-{:.3}] {title}", self.index, self.start, self.end),
            None => write!(f, "#{} [{:.3}-{:.3}]", self.index, self.start, self.end),
        }
    }
}

/// An ordered, non-overlapping chapter timeline.
///
/// Can only be constructed through [`Chapters::new`], which enforces:
/// - indexes strictly increasing,
/// - `start < end` for every chapter,
/// - `start(i+1) >= end(i)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chapters(Vec<Chapter>);
impl Chapters {
    pub fn new(chapters: Vec<Chapter>) -> Result<Self> {
        for (i, chapter) in chapters.iter().enumerate() {
            if !chapter.start.is_finite() || !chapter.end.is_finite() {
                exn::bail!(ErrorKind::InvalidChapters(format!("chapter {chapter} has a non-finite time")));
            }
            if chapter.start >= chapter.end {
                exn::bail!(ErrorKind::InvalidChapters(format!("chapter {chapter} does not end after it starts")));
            }
            if let Some(previous) = i.checked_sub(1).and_then(|p| chapters.get(p)) {
                if chapter.index <= previous.index {
                    exn::bail!(ErrorKind::InvalidChapters(format!(
                        "chapter {chapter} is out of order after {previous}"
                    )));
                }
                if chapter.start < previous.end {
                    exn::bail!(ErrorKind::InvalidChapters(format!("chapter {chapter} overlaps {previous}")));
                }
            }
        }
        Ok(Self(chapters))
    }

    /// Total length: the end time of the last chapter.
    pub fn length(&self) -> Option<f64> {
        self.0.last().map(|c| c.end)
    }

    pub fn into_inner(self) -> Vec<Chapter> {
        self.0
    }
}
impl Deref for Chapters {
    type Target = [Chapter];
    fn deref(&self) -> &[Chapter] {
        &self.0
    }
}
impl TryFrom<Vec<Chapter>> for Chapters {
    type Error = crate::error::Error;
    fn try_from(chapters: Vec<Chapter>) -> std::result::Result<Self, Self::Error> {
        Chapters::new(chapters)
    }
}

/// Serialised as a JSON object keyed by chapter index, matching the shape
/// consumers of the metadata document already expect.
#[cfg(feature = "serde")]
impl serde::Serialize for Chapters {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|c| (c.index.to_string(), c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_timeline() {
        let chapters = Chapters::new(vec![(0, 0.0, 120.0).into(), (1, 120.0, 300.0).into()]).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters.length(), Some(300.0));
    }

    #[test]
    fn test_empty_has_no_length() {
        assert_eq!(Chapters::default().length(), None);
    }

    #[test]
    fn test_gaps_are_allowed() {
        assert!(Chapters::new(vec![(0, 0.0, 10.0).into(), (1, 12.5, 20.0).into()]).is_ok());
    }

    #[rstest]
    #[case::zero_length(vec![(0, 5.0, 5.0)])]
    #[case::reversed(vec![(0, 10.0, 5.0)])]
    #[case::overlap(vec![(0, 0.0, 10.0), (1, 9.0, 20.0)])]
    #[case::duplicate_index(vec![(0, 0.0, 10.0), (0, 10.0, 20.0)])]
    #[case::descending_index(vec![(1, 0.0, 10.0), (0, 10.0, 20.0)])]
    #[case::not_a_number(vec![(0, f64::NAN, 10.0)])]
    fn test_invalid_timelines(#[case] records: Vec<(u32, f64, f64)>) {
        let err = Chapters::new(records.into_iter().map(Chapter::from).collect()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidChapters(_)));
    }

    #[test]
    fn test_display() {
        let chapter = Chapter::new(3, 1.5, 2.25, Some("Epilogue"));
        assert_eq!(chapter.to_string(), "#3 [1.500-2.250] Epilogue");
    }
}
