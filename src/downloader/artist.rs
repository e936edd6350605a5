//! Artist discography downloads.
//!
//! Album ids are listed page by page. Every album is resolved, run through
//! the [`AlbumFilter`] and downloaded; a failing album is logged and counted
//! without stopping the walk, unless debug mode is on. Loose tracks come last.

use std::path::Path;

use super::Downloader;
use super::ledger::Ledger;
use super::outcome::ArtistReport;
use super::track::TrackJob;
use crate::error::{Result, ResultExt};
use crate::model::{AlbumDescriptor, ExtraParams};
use crate::service::MusicService;

/// Album ids requested per listing call.
pub const ALBUM_BATCH_SIZE: usize = 50;

const COLLECTOR_KEYWORDS: &[&str] = &[
    "collector",
    "deluxe",
    "expanded",
    "bonus",
    "special",
    "anniversary",
    "remastered",
    "reissue",
    "limited",
];

const LIVE_KEYWORDS: &[&str] = &[
    "live",
    "concert",
    "performance",
    "stage",
    "tour",
    "acoustic",
    "unplugged",
    "mtv",
    "bbc",
    "radio",
    "session",
];

/// Which albums of a discography to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumFilter {
    pub remove_collectors_editions: bool,
    pub remove_live_recordings: bool,
    /// Only keep albums credited to exactly this artist
    pub strict_artist: Option<String>,
}

impl AlbumFilter {
    /// Why `album` is filtered out, or `None` to keep it.
    ///
    /// Keywords match anywhere in the lowercased album name.
    pub fn rejects(&self, album: &AlbumDescriptor) -> Option<&'static str> {
        let name = album.name.to_lowercase();
        if self.remove_collectors_editions && COLLECTOR_KEYWORDS.iter().any(|k| name.contains(k))
        {
            return Some("collector edition");
        }
        if self.remove_live_recordings && LIVE_KEYWORDS.iter().any(|k| name.contains(k)) {
            return Some("live recording");
        }
        if let Some(artist) = &self.strict_artist
            && album.artist.trim().to_lowercase() != artist.trim().to_lowercase()
        {
            return Some("different artist");
        }
        None
    }
}

impl Downloader {
    /// Download the discography of `artist_id` into `base`.
    pub async fn download_artist(
        &self,
        service: &dyn MusicService,
        artist_id: &str,
        base: &Path,
    ) -> Result<ArtistReport> {
        let settings = &self.settings;
        let credited = settings.return_credited_albums;
        let artist = service
            .get_artist_info(artist_id, credited, &ExtraParams::new())
            .await?;
        tracing::info!("Downloading artist {} ({})", artist.name, artist_id);

        let filter = AlbumFilter {
            remove_collectors_editions: settings.remove_collectors_editions,
            remove_live_recordings: settings.remove_live_recordings,
            strict_artist: settings.strict_artist_match.then(|| artist.name.clone()),
        };
        let mut report = ArtistReport {
            name: artist.name.clone(),
            ..Default::default()
        };

        let mut start = 0;
        loop {
            let album_ids = service
                .get_artist_album_ids(artist_id, start, ALBUM_BATCH_SIZE, credited)
                .await
                .with_context(format!("listing albums of {}", artist.name))?;
            if album_ids.is_empty() {
                break;
            }
            report.albums_found += album_ids.len();
            tracing::info!(
                "Processing albums {}-{} (found so far: {})",
                start + 1,
                start + album_ids.len(),
                report.albums_found
            );

            for album_id in &album_ids {
                match self
                    .download_artist_album(
                        service,
                        album_id,
                        &artist.album_extra,
                        base,
                        &artist.name,
                        &filter,
                    )
                    .await
                {
                    Ok(Some(tracks)) => {
                        report.albums_downloaded += 1;
                        report.album_tracks.extend(tracks);
                    }
                    Ok(None) => report.albums_filtered += 1,
                    Err(e) if e.is_interrupted() || settings.debug_mode => return Err(e),
                    Err(e) => {
                        tracing::warn!("Error processing album {}: {}", album_id, e);
                        report.albums_failed += 1;
                    }
                }
            }

            if album_ids.len() < ALBUM_BATCH_SIZE {
                break;
            }
            start += ALBUM_BATCH_SIZE;
        }

        let loose: Vec<&String> = artist
            .tracks
            .iter()
            .filter(|id| {
                !(settings.separate_tracks_skip_downloaded && report.album_tracks.contains(*id))
            })
            .collect();
        report.loose_tracks_skipped = artist.tracks.len() - loose.len();
        report.loose_tracks = super::CollectionReport::new(&artist.name, loose.len());
        if !loose.is_empty() {
            tracing::info!("Processing {} separate tracks", loose.len());
        }

        let ledger = Ledger::for_collection(base);
        for (position, track_id) in loose.iter().enumerate() {
            tracing::info!("Track {}/{}", position + 1, loose.len());
            let job = TrackJob {
                total: Some(1),
                expected_artist: Some(&artist.name),
                ..TrackJob::new(track_id, &artist.track_extra, base, &ledger)
            };
            let outcome = self.download_track(service, &job).await?;
            tracing::info!("Track {}: {}", track_id, outcome);
            report.loose_tracks.record(track_id, &outcome);
        }

        tracing::info!("Artist {} download completed", artist.name);
        tracing::info!("Total albums found: {}", report.albums_found);
        tracing::info!("Albums downloaded: {}", report.albums_downloaded);
        if report.loose_tracks_skipped > 0 {
            tracing::info!("Tracks skipped: {}", report.loose_tracks_skipped);
        }
        Ok(report)
    }

    /// Resolve, filter and download one album of a discography.
    ///
    /// Returns `None` when the album was filtered out.
    async fn download_artist_album(
        &self,
        service: &dyn MusicService,
        album_id: &str,
        extra: &ExtraParams,
        base: &Path,
        artist: &str,
        filter: &AlbumFilter,
    ) -> Result<Option<Vec<String>>> {
        let album = service.get_album_info(album_id, extra).await?;
        if let Some(reason) = filter.rejects(&album) {
            tracing::info!("Skipping {}: {}", reason, album.name);
            return Ok(None);
        }
        let report = self
            .download_resolved_album(service, album_id, &album, base, Some(artist))
            .await?;
        Ok(Some(report.succeeded))
    }
}
