//! Download orchestration.
//!
//! [`Downloader`] owns the immutable run [`Settings`] and the seams to the
//! outside world (services, fetcher, transcoder, tagger) and drives tracks,
//! albums, playlists and artist discographies through the track pipeline.
//!
//! Everything runs sequentially on one task. Per-track problems surface as
//! [`PipelineOutcome`] values; the only error that ends a run early is
//! [`Error::Interrupted`](crate::error::Error::Interrupted).

mod album;
mod artist;
mod context;
mod ledger;
mod m3u;
mod outcome;
mod playlist;
mod track;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::convert::Transcoder;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::metadata::TagWriter;
use crate::model::{DownloadMode, ExtraParams};
use crate::service::ServiceRegistry;

pub use artist::{ALBUM_BATCH_SIZE, AlbumFilter};
pub use context::Settings;
pub use ledger::{Ledger, LedgerKind};
pub use m3u::M3uPlaylist;
pub use outcome::{
    ArtistReport, CollectionReport, FailReason, PipelineOutcome, SkipReason, SuccessKind,
};
pub use track::{Gate, TrackJob};

/// What a run produced, by download mode.
#[derive(Debug, Clone, PartialEq)]
pub enum RunReport {
    Track(PipelineOutcome),
    Album(CollectionReport),
    Playlist(CollectionReport),
    Artist(ArtistReport),
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReport::Track(outcome) => write!(f, "Track {outcome}"),
            RunReport::Album(report) => write!(f, "Album {} downloaded ({report})", report.name),
            RunReport::Playlist(report) => {
                write!(f, "Playlist {} downloaded ({report})", report.name)
            }
            RunReport::Artist(report) => write!(
                f,
                "Artist {}: {} albums found, {} downloaded, {} filtered, {} failed, {} tracks",
                report.name,
                report.albums_found,
                report.albums_downloaded,
                report.albums_filtered,
                report.albums_failed,
                report.album_tracks.len() + report.loose_tracks.success_count()
            ),
        }
    }
}

/// Runs downloads against a set of services.
pub struct Downloader {
    settings: Settings,
    services: ServiceRegistry,
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    tagger: Arc<dyn TagWriter>,
}

impl Downloader {
    pub fn new(
        settings: Settings,
        services: ServiceRegistry,
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
        tagger: Arc<dyn TagWriter>,
    ) -> Self {
        Self {
            settings,
            services,
            fetcher,
            transcoder,
            tagger,
        }
    }

    /// Download `id` from `service` as a `mode`.
    ///
    /// Fails when the service is unknown, the top-level descriptor cannot be
    /// resolved, or the user interrupts the run.
    pub async fn download(&self, service: &str, mode: DownloadMode, id: &str) -> Result<RunReport> {
        let service = self.services.get(service)?;
        let base = self.base_path(service.name());
        let extra = ExtraParams::new();
        tracing::info!("Starting {} download of {} from {}", mode, id, service.name());

        let report = match mode {
            DownloadMode::Track => {
                RunReport::Track(self.download_single(service.as_ref(), id, &extra, &base).await?)
            }
            DownloadMode::Album => RunReport::Album(
                self.download_album(service.as_ref(), id, &extra, &base, None)
                    .await?,
            ),
            DownloadMode::Playlist => {
                RunReport::Playlist(self.download_playlist(service.as_ref(), id, &base).await?)
            }
            DownloadMode::Artist => {
                RunReport::Artist(self.download_artist(service.as_ref(), id, &base).await?)
            }
        };
        tracing::info!("{}", report);
        Ok(report)
    }

    /// Download root, with the service subdirectory when enabled.
    fn base_path(&self, service: &str) -> PathBuf {
        let base = &self.settings.download_path;
        if self.settings.source_subdirectories {
            base.join(service)
        } else {
            base.clone()
        }
    }
}
