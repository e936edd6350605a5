//! Append-only logs of tracks that could not be downloaded.
//!
//! Each collection gets an `error.txt` for unavailable tracks and a
//! `strict_quality_error.txt` for strict-quality rejections. Standalone
//! downloads log into the download root instead. The directory is created on
//! the first entry, so a clean collection leaves no trace.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::model::TrackDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Unavailable,
    StrictQuality,
}

/// Ledger files of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    dir: PathBuf,
    unavailable_file: &'static str,
    strict_quality_file: &'static str,
}

impl Ledger {
    /// Ledgers inside an album or playlist directory.
    pub fn for_collection(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            unavailable_file: "error.txt",
            strict_quality_file: "strict_quality_error.txt",
        }
    }

    /// Ledgers for standalone track downloads.
    pub fn standalone(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            unavailable_file: "unavailable_tracks.log",
            strict_quality_file: "strict_quality_errors.log",
        }
    }

    pub fn path(&self, kind: LedgerKind) -> PathBuf {
        match kind {
            LedgerKind::Unavailable => self.dir.join(self.unavailable_file),
            LedgerKind::StrictQuality => self.dir.join(self.strict_quality_file),
        }
    }

    /// Append one line for `track`.
    pub fn record(&self, kind: LedgerKind, track_id: &str, track: &TrackDescriptor) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(kind);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", entry_line(kind, track_id, track))?;
        tracing::debug!("Logged {} to {:?}", track_id, path);
        Ok(())
    }

    /// [`record`](Self::record), logging instead of failing.
    pub fn record_or_warn(&self, kind: LedgerKind, track_id: &str, track: &TrackDescriptor) {
        if let Err(e) = self.record(kind, track_id, track) {
            tracing::warn!("Failed to write {:?}: {}", self.path(kind), e);
        }
    }
}

/// `<prefix>: artist [artist_id]/album [album_id]/name [track_id]`
pub fn entry_line(kind: LedgerKind, track_id: &str, track: &TrackDescriptor) -> String {
    let prefix = match kind {
        LedgerKind::Unavailable => "Unavailable",
        LedgerKind::StrictQuality => "Not meet quality requirements",
    };
    let artist = track.artists.first().map(String::as_str).unwrap_or("Unknown");
    format!(
        "{prefix}: {artist} [{}]/{} [{}]/{} [{track_id}]",
        track.artist_id, track.album, track.album_id, track.name
    )
}
