//! Playlist downloads, optionally sourcing tracks from another service.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Downloader;
use super::ledger::Ledger;
use super::m3u::M3uPlaylist;
use super::outcome::{CollectionReport, PipelineOutcome, SkipReason};
use super::track::{Gate, TrackJob, tolerate};
use crate::error::{Error, Result};
use crate::model::{CoverOptions, DownloadMode, ExtraParams, PlaylistDescriptor};
use crate::organizer::{TemplateValues, limit_path, sanitize_filename};
use crate::service::{Capabilities, MusicService};

impl Downloader {
    /// Resolve and download playlist `playlist_id` into `base`.
    pub async fn download_playlist(
        &self,
        service: &dyn MusicService,
        playlist_id: &str,
        base: &Path,
    ) -> Result<CollectionReport> {
        let playlist = service
            .get_playlist_info(playlist_id, &ExtraParams::new())
            .await?;
        let alternate = self.alternate_service(service)?;

        let total = playlist.tracks.len();
        tracing::info!("Downloading playlist {} ({})", playlist.name, playlist_id);
        tracing::info!("Creator: {} ({})", playlist.creator, playlist.creator_id);
        tracing::info!("Number of tracks: {}", total);
        if let Some(alternate) = &alternate {
            tracing::info!("Service used for downloading: {}", alternate.name());
        }

        let values = TemplateValues::for_playlist(&playlist);
        let dir = limit_path(&base.join(self.settings.playlist_format.render(&values)));
        let ledger = Ledger::for_collection(&dir);
        let mut report = CollectionReport::new(&playlist.name, total);
        let mut m3u: Option<M3uPlaylist> = None;
        let mut assets_ready = false;

        for (position, track_id) in playlist.tracks.iter().enumerate() {
            tracing::info!("Track {}/{}", position + 1, total);
            let job = TrackJob {
                index: Some(report.success_count() as u32 + 1),
                total: Some(total as u32),
                album_lookup: true,
                ..TrackJob::new(track_id, &playlist.track_extra, &dir, &ledger)
            };

            let track = match self.resolve_and_gate(service, &job).await {
                Gate::Pass(track) => track,
                Gate::Stop(outcome) => {
                    tracing::info!("Track {}: {}", track_id, outcome);
                    report.record(track_id, &outcome);
                    continue;
                }
            };

            let hit = match &alternate {
                Some(alternate) => {
                    match alternate
                        .search(DownloadMode::Track, &track.search_query(), Some(&*track), 1)
                        .await
                    {
                        Ok(results) => results.into_iter().next(),
                        Err(e) => {
                            tracing::warn!("Search on {} failed: {}", alternate.name(), e);
                            None
                        }
                    }
                }
                None => None,
            };
            if alternate.is_some()
                && hit.is_none()
                && !service.capabilities().contains(Capabilities::DOWNLOAD)
            {
                tracing::info!("Track {} not found, skipping", track.name);
                report.record(track_id, &PipelineOutcome::Skipped(SkipReason::NoMatch));
                continue;
            }

            if !assets_ready {
                m3u = self.playlist_files(service, &playlist, &dir).await?;
                assets_ready = true;
            }

            let outcome = match (&alternate, &hit) {
                (Some(alternate), Some(hit)) => {
                    let job = TrackJob {
                        id: &hit.id,
                        extra: &hit.extra,
                        m3u: m3u.as_ref(),
                        ..job
                    };
                    self.download_track(alternate.as_ref(), &job).await?
                }
                (alternate, _) => {
                    if alternate.is_some() {
                        tracing::info!(
                            "Track {} not found, using the original service as a fallback",
                            track.name
                        );
                    }
                    let job = TrackJob {
                        m3u: m3u.as_ref(),
                        ..job
                    };
                    self.acquire_and_commit(service, *track, &job).await?
                }
            };
            tracing::info!("Track {}: {}", track_id, outcome);
            report.record(track_id, &outcome);
        }

        if report.success_count() == 0 {
            tracing::warn!("Playlist {} skipped, no track could be downloaded", playlist.name);
        } else {
            tracing::info!("Playlist {} downloaded ({})", playlist.name, report);
        }
        Ok(report)
    }

    /// The configured playlist download service, when it differs from
    /// `service`.
    fn alternate_service(
        &self,
        service: &dyn MusicService,
    ) -> Result<Option<Arc<dyn MusicService>>> {
        let Some(name) = self
            .settings
            .playlist_download_service
            .as_deref()
            .filter(|name| *name != service.name())
        else {
            return Ok(None);
        };
        let alternate = self.services.get(name)?;
        if !alternate.capabilities().contains(Capabilities::DOWNLOAD) {
            return Err(Error::config(format!(
                "Service {name} cannot be used to download a playlist"
            )));
        }
        Ok(Some(alternate))
    }

    /// Directory, cover, animated cover, description and M3U of `playlist`.
    async fn playlist_files(
        &self,
        service: &dyn MusicService,
        playlist: &PlaylistDescriptor,
        dir: &Path,
    ) -> Result<Option<M3uPlaylist>> {
        std::fs::create_dir_all(dir)?;
        let headers = Default::default();

        if let Some(url) = &playlist.cover_url {
            tracing::info!("Downloading playlist cover");
            let cover = dir.join(format!("cover.{}", playlist.cover_type.extension()));
            let saved = tolerate(
                self.fetcher.fetch_to(url, &headers, &cover).await,
                "playlist cover",
            )?;
            if saved.is_some() {
                let options = CoverOptions {
                    file_type: playlist.cover_type,
                    ..self.settings.main_cover
                };
                self.normalize_cover(service, &cover, &options);
            }
        }

        if self.settings.save_animated_cover
            && let Some(url) = &playlist.animated_cover_url
        {
            tracing::info!("Downloading animated playlist cover");
            tolerate(
                self.fetcher.fetch_to(url, &headers, &dir.join("cover.mp4")).await,
                "animated playlist cover",
            )?;
        }

        if let Some(description) = &playlist.description
            && let Err(e) = std::fs::write(dir.join("description.txt"), description)
        {
            tracing::warn!("Failed to write playlist description: {}", e);
        }

        if !self.settings.save_m3u {
            return Ok(None);
        }
        let path: PathBuf = dir.join(format!("{}.m3u", sanitize_filename(&playlist.name)));
        match M3uPlaylist::create(&path, self.settings.m3u_paths, self.settings.extended_m3u) {
            Ok(m3u) => Ok(Some(m3u)),
            Err(e) => {
                tracing::warn!("Failed to create {:?}: {}", path, e);
                Ok(None)
            }
        }
    }
}
