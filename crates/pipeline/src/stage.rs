use crate::error::{ErrorKind, Result};
use derive_more::Display;

/// Where a run is. Stages only move forward one step at a time, except that
/// any stage may fail.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    #[default]
    Start,
    LicenseResolved,
    VoucherDecrypted,
    Downloaded,
    AudioStripped,
    MetadataExtracted,
    MetadataMerged,
    Published,
    Done,
    Failed,
}

impl Stage {
    /// The stage that follows this one on success.
    pub fn next(self) -> Option<Stage> {
        Some(match self {
            Self::Start => Self::LicenseResolved,
            Self::LicenseResolved => Self::VoucherDecrypted,
            Self::VoucherDecrypted => Self::Downloaded,
            Self::Downloaded => Self::AudioStripped,
            Self::AudioStripped => Self::MetadataExtracted,
            Self::MetadataExtracted => Self::MetadataMerged,
            Self::MetadataMerged => Self::Published,
            Self::Published => Self::Done,
            Self::Done | Self::Failed => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(self, to: Stage) -> Result<Stage> {
        if self.next() != Some(to) {
            exn::bail!(ErrorKind::Unknown(format!("illegal stage transition {self} -> {to}")));
        }
        tracing::info!(from = %self, %to, "Stage transition");
        Ok(to)
    }

    /// Fail from wherever the run is. Terminal stages stay put.
    pub fn fail(self) -> Stage {
        match self {
            Self::Done | Self::Failed => self,
            _ => {
                tracing::info!(from = %self, "Stage transition to Failed");
                Self::Failed
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_happy_path_reaches_done() {
        let mut stage = Stage::Start;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = stage.advance(next).unwrap();
            seen.push(stage);
        }
        assert_eq!(stage, Stage::Done);
        assert_eq!(seen.len(), 9);
        assert!(!seen.contains(&Stage::Failed));
    }

    #[rstest]
    #[case::skip(Stage::Start, Stage::VoucherDecrypted)]
    #[case::backwards(Stage::Downloaded, Stage::LicenseResolved)]
    #[case::same(Stage::Published, Stage::Published)]
    #[case::from_done(Stage::Done, Stage::Start)]
    #[case::from_failed(Stage::Failed, Stage::Done)]
    fn test_illegal_transitions(#[case] from: Stage, #[case] to: Stage) {
        let err = from.advance(to).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unknown(_)));
    }

    #[rstest]
    #[case(Stage::Start)]
    #[case(Stage::Downloaded)]
    #[case(Stage::Published)]
    fn test_fail_from_anywhere(#[case] from: Stage) {
        assert_eq!(from.fail(), Stage::Failed);
    }

    #[test]
    fn test_done_does_not_fail() {
        assert_eq!(Stage::Done.fail(), Stage::Done);
        assert!(Stage::Done.is_terminal());
    }
}
