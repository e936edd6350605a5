//! Per-track outcomes and per-collection aggregates.

use std::fmt;
use std::path::{Path, PathBuf};

/// How a track run ended. Expected conditions are values, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Success(SuccessKind),
    Skipped(SkipReason),
    Failed(FailReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuccessKind {
    /// Fetched (and possibly converted) into `path`
    Downloaded {
        path: PathBuf,
        /// False when tags went to a sidecar instead
        tags_written: bool,
    },
    /// The destination was already present, nothing was fetched
    AlreadyExists { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Strict quality mode rejected the stream
    QualityRejected(String),
    /// Artist download found a track by someone else
    DifferentArtist { expected: String },
    /// The playlist download service has no match and the original
    /// service cannot download
    NoMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    /// The service resolved the track with an error
    Unavailable(String),
    /// A service call failed
    Service(String),
    /// The payload could not be fetched or moved into place
    Fetch(String),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }

    /// Final file location for successful runs.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PipelineOutcome::Success(SuccessKind::Downloaded { path, .. })
            | PipelineOutcome::Success(SuccessKind::AlreadyExists { path }) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Success(SuccessKind::Downloaded { tags_written: true, .. }) => {
                write!(f, "downloaded")
            }
            PipelineOutcome::Success(SuccessKind::Downloaded { .. }) => {
                write!(f, "downloaded, tags saved to text file")
            }
            PipelineOutcome::Success(SuccessKind::AlreadyExists { .. }) => {
                write!(f, "already exists")
            }
            PipelineOutcome::Skipped(SkipReason::QualityRejected(why)) => {
                write!(f, "skipped: {why}")
            }
            PipelineOutcome::Skipped(SkipReason::DifferentArtist { expected }) => {
                write!(f, "skipped: not by {expected}")
            }
            PipelineOutcome::Skipped(SkipReason::NoMatch) => write!(f, "skipped: no match"),
            PipelineOutcome::Failed(FailReason::Unavailable(why)) => {
                write!(f, "unavailable: {why}")
            }
            PipelineOutcome::Failed(FailReason::Service(why))
            | PipelineOutcome::Failed(FailReason::Fetch(why)) => write!(f, "failed: {why}"),
        }
    }
}

/// Aggregate of one album or playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionReport {
    pub name: String,
    /// Member tracks in the collection
    pub total: usize,
    /// Ids of tracks that ended in success, in order
    pub succeeded: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

impl CollectionReport {
    pub fn new(name: impl Into<String>, total: usize) -> Self {
        Self {
            name: name.into(),
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, track_id: &str, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Success(_) => self.succeeded.push(track_id.to_string()),
            PipelineOutcome::Skipped(_) => self.skipped += 1,
            PipelineOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }
}

impl fmt::Display for CollectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} tracks", self.success_count(), self.total)
    }
}

/// Aggregate of an artist walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtistReport {
    pub name: String,
    /// Every album listed, filtered ones included
    pub albums_found: usize,
    /// Albums that passed the filters and were processed
    pub albums_downloaded: usize,
    pub albums_filtered: usize,
    /// Albums whose processing raised an error
    pub albums_failed: usize,
    /// Ids of tracks downloaded as part of albums
    pub album_tracks: Vec<String>,
    /// Loose tracks not belonging to a listed album
    pub loose_tracks: CollectionReport,
    /// Loose tracks left out because an album already had them
    pub loose_tracks_skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_report_counts() {
        let mut report = CollectionReport::new("Mix", 3);
        report.record(
            "1",
            &PipelineOutcome::Success(SuccessKind::AlreadyExists {
                path: PathBuf::from("a.flac"),
            }),
        );
        report.record(
            "2",
            &PipelineOutcome::Failed(FailReason::Unavailable("region locked".to_string())),
        );
        report.record("3", &PipelineOutcome::Skipped(SkipReason::NoMatch));

        assert_eq!(report.succeeded, vec!["1".to_string()]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.to_string(), "1/3 tracks");
    }

    #[test]
    fn test_outcome_path_and_display() {
        let outcome = PipelineOutcome::Success(SuccessKind::Downloaded {
            path: PathBuf::from("/music/01. Intro.flac"),
            tags_written: false,
        });
        assert!(outcome.is_success());
        assert_eq!(outcome.path(), Some(Path::new("/music/01. Intro.flac")));
        assert_eq!(outcome.to_string(), "downloaded, tags saved to text file");

        let skipped = PipelineOutcome::Skipped(SkipReason::DifferentArtist {
            expected: "Daft Punk".to_string(),
        });
        assert!(!skipped.is_success());
        assert_eq!(skipped.path(), None);
        assert_eq!(skipped.to_string(), "skipped: not by Daft Punk");
    }
}
