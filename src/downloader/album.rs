//! Album downloads.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use super::Downloader;
use super::ledger::Ledger;
use super::outcome::CollectionReport;
use super::track::{Gate, TrackJob, tolerate};
use crate::error::Result;
use crate::fetch::fetch_to_temp;
use crate::model::{AlbumDescriptor, CoverOptions, ExtraParams};
use crate::organizer::{TemplateValues, limit_path};
use crate::service::MusicService;

impl Downloader {
    /// Resolve and download album `album_id` into `parent`.
    pub async fn download_album(
        &self,
        service: &dyn MusicService,
        album_id: &str,
        extra: &ExtraParams,
        parent: &Path,
        expected_artist: Option<&str>,
    ) -> Result<CollectionReport> {
        let album = service.get_album_info(album_id, extra).await?;
        self.download_resolved_album(service, album_id, &album, parent, expected_artist)
            .await
    }

    /// Download an album whose descriptor is already known.
    ///
    /// The album directory only appears once a ledger entry or a track needs
    /// it; shared files are fetched when the first track passes the gate.
    pub(super) async fn download_resolved_album(
        &self,
        service: &dyn MusicService,
        album_id: &str,
        album: &AlbumDescriptor,
        parent: &Path,
        expected_artist: Option<&str>,
    ) -> Result<CollectionReport> {
        let total = album.tracks.len();
        let mut report = CollectionReport::new(&album.name, total);
        if total == 0 {
            tracing::warn!("Album {} ({}) has no tracks", album.name, album_id);
            return Ok(report);
        }

        let dir = self.album_dir(parent, album, album_id);
        let ledger = Ledger::for_collection(&dir);
        let base_job = TrackJob {
            expected_artist,
            ..TrackJob::new("", &album.track_extra, &dir, &ledger)
        };

        if total == 1 && !self.settings.force_album_format {
            tracing::info!("Downloading single track album {} ({})", album.name, album_id);
            let track_id = &album.tracks[0];
            let job = TrackJob {
                id: track_id,
                total: Some(1),
                ..base_job
            };
            let outcome = self.download_track(service, &job).await?;
            report.record(track_id, &outcome);
            return Ok(report);
        }

        tracing::info!("Downloading album {} ({})", album.name, album_id);
        tracing::info!("Artist: {} ({})", album.artist, album.artist_id);
        if let Some(year) = album.release_year {
            tracing::info!("Year: {}", year);
        }
        tracing::info!("Number of tracks: {}", total);

        let mut assets_ready = false;
        let mut shared_cover: Option<TempPath> = None;
        for (position, track_id) in album.tracks.iter().enumerate() {
            tracing::info!("Track {}/{}", position + 1, total);
            let job = TrackJob {
                id: track_id,
                index: Some(report.success_count() as u32 + 1),
                total: Some(total as u32),
                ..base_job
            };

            let outcome = match self.resolve_and_gate(service, &job).await {
                Gate::Stop(outcome) => outcome,
                Gate::Pass(track) => {
                    if !assets_ready {
                        self.album_files(service, album, &dir).await?;
                        if let Some(url) = &album.all_track_cover_url {
                            shared_cover = tolerate(
                                fetch_to_temp(self.fetcher.as_ref(), url, ".jpg").await,
                                "album cover",
                            )?;
                            if let Some(cover) = &shared_cover {
                                self.normalize_cover(service, cover, &self.settings.main_cover);
                            }
                        }
                        assets_ready = true;
                    }
                    let job = TrackJob {
                        collection_cover: shared_cover.as_deref(),
                        ..job
                    };
                    self.acquire_and_commit(service, *track, &job).await?
                }
            };
            tracing::info!("Track {}: {}", track_id, outcome);
            report.record(track_id, &outcome);
        }

        if report.success_count() == 0 {
            tracing::warn!("Album {} skipped, no track could be downloaded", album.name);
        } else {
            tracing::info!("Album {} downloaded ({})", album.name, report);
        }
        Ok(report)
    }

    /// Directory of `album` inside `parent`.
    pub(super) fn album_dir(
        &self,
        parent: &Path,
        album: &AlbumDescriptor,
        album_id: &str,
    ) -> PathBuf {
        let values = TemplateValues::for_album(album, album_id);
        limit_path(&parent.join(self.settings.album_format.render(&values)))
    }

    /// Booklet, cover, animated cover and description of `album`.
    ///
    /// Missing or failing assets are logged; only an interrupt is an error.
    pub(super) async fn album_files(
        &self,
        service: &dyn MusicService,
        album: &AlbumDescriptor,
        dir: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let headers = Default::default();

        if let Some(url) = &album.booklet_url {
            let booklet = dir.join("Booklet.pdf");
            if !booklet.exists() {
                tracing::info!("Downloading booklet");
                tolerate(self.fetcher.fetch_to(url, &headers, &booklet).await, "booklet")?;
            }
        }

        if let Some(url) = &album.cover_url {
            tracing::info!("Downloading album cover");
            let cover = dir.join(format!("cover.{}", album.cover_type.extension()));
            if tolerate(self.fetcher.fetch_to(url, &headers, &cover).await, "album cover")?.is_some()
            {
                let options = CoverOptions {
                    file_type: album.cover_type,
                    ..self.settings.main_cover
                };
                self.normalize_cover(service, &cover, &options);
            }
        }

        if self.settings.save_animated_cover
            && let Some(url) = &album.animated_cover_url
        {
            tracing::info!("Downloading animated album cover");
            tolerate(
                self.fetcher.fetch_to(url, &headers, &dir.join("cover.mp4")).await,
                "animated album cover",
            )?;
        }

        if let Some(description) = &album.description
            && let Err(e) = std::fs::write(dir.join("description.txt"), description)
        {
            tracing::warn!("Failed to write album description: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{harness, simple_harness};
    use crate::downloader::{FailReason, LedgerKind, PipelineOutcome, RunReport};
    use crate::cover::image_resolution;
    use crate::model::{AlbumDescriptor, Codec, DownloadMode, TrackDescriptor};
    use crate::service::Capabilities;
    use crate::service::mocks::MockService;
    use crate::test_utils::{
        MockFetcher, MockTagWriter, sample_track, solid_png, test_settings,
    };

    fn album(tracks: &[&str]) -> AlbumDescriptor {
        AlbumDescriptor {
            name: "Test Album".to_string(),
            artist: "Test Artist".to_string(),
            tracks: tracks.iter().map(|t| t.to_string()).collect(),
            cover_url: Some("https://img/album.jpg".to_string()),
            booklet_url: Some("https://img/booklet.pdf".to_string()),
            description: Some("Liner notes".to_string()),
            ..Default::default()
        }
    }

    fn album_fetcher() -> MockFetcher {
        MockFetcher::new()
            .with_file("https://img/album.jpg", solid_png(80, 4, 4))
            .with_file("https://img/booklet.pdf", b"%PDF".to_vec())
    }

    async fn run(h: &super::super::tests::Harness, id: &str) -> crate::downloader::CollectionReport {
        match h.downloader.download("mock", DownloadMode::Album, id).await.unwrap() {
            RunReport::Album(report) => report,
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_album_layout_and_assets() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockService::new("mock")
            .with_album("a1", album(&["t1", "t2", "t3"]))
            .with_track("t1", sample_track("Intro", 1))
            .with_track("t2", sample_track("VCR", 2))
            .with_track("t3", sample_track("Crystalised", 3));
        let h = harness(
            test_settings(dir.path()),
            service,
            Vec::new(),
            album_fetcher(),
            MockTagWriter::new(),
        );

        let report = run(&h, "a1").await;
        assert_eq!(report.succeeded, vec!["t1", "t2", "t3"]);

        let album_dir = dir.path().join("Test Album");
        assert!(album_dir.join("1. Intro.flac").exists());
        assert!(album_dir.join("3. Crystalised.flac").exists());
        assert!(album_dir.join("cover.jpg").exists());
        assert!(album_dir.join("Booklet.pdf").exists());
        assert_eq!(
            std::fs::read_to_string(album_dir.join("description.txt")).unwrap(),
            "Liner notes"
        );
        // Fetched once, not per track
        let fetched = h.fetcher.fetched_urls();
        assert_eq!(fetched.iter().filter(|u| u.ends_with("album.jpg")).count(), 1);
        assert!(!album_dir.join("error.txt").exists());
    }

    #[tokio::test]
    async fn test_numbering_is_contiguous_and_zero_filled() {
        let dir = tempfile::tempdir().unwrap();
        let ids: Vec<String> = (1..=10).map(|n| format!("t{n}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut service = MockService::new("mock").with_album("a1", album(&id_refs));
        for (n, id) in ids.iter().enumerate() {
            let mut track = sample_track(&format!("Song {}", n + 1), n as u32 + 1);
            if n == 1 {
                track.error = Some("Region locked".to_string());
            }
            service = service.with_track(id, track);
        }
        let h = simple_harness(dir.path(), service);

        let report = run(&h, "a1").await;
        assert_eq!(report.success_count(), 9);
        assert_eq!(report.failed, 1);

        let album_dir = dir.path().join("Test Album");
        assert!(album_dir.join("01. Song 1.flac").exists());
        // Song 3 takes the slot freed by the unavailable Song 2
        assert!(album_dir.join("02. Song 3.flac").exists());
        assert!(album_dir.join("09. Song 10.flac").exists());

        let ledger = std::fs::read_to_string(album_dir.join("error.txt")).unwrap();
        assert_eq!(ledger.lines().count(), 1);
        assert!(ledger.contains("Song 2 [t2]"));
    }

    #[tokio::test]
    async fn test_strict_quality_rejects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = test_settings(dir.path());
        settings.strict_quality = true;
        let mut lossy = sample_track("Intro", 1);
        lossy.codec = Codec::Aac;
        lossy.bitrate = Some(256);
        lossy.bit_depth = None;
        let service = MockService::new("mock")
            .with_album("a1", album(&["t1", "t2"]))
            .with_track("t1", lossy.clone())
            .with_track("t2", lossy);
        let h = harness(settings, service, Vec::new(), album_fetcher(), MockTagWriter::new());

        let report = run(&h, "a1").await;
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.skipped, 2);

        let album_dir = dir.path().join("Test Album");
        let ledger = crate::downloader::Ledger::for_collection(&album_dir);
        let text = std::fs::read_to_string(ledger.path(LedgerKind::StrictQuality)).unwrap();
        assert_eq!(text.lines().count(), 2);
        // Nothing passed the gate, so no assets were fetched
        assert!(!album_dir.join("cover.jpg").exists());
        assert!(h.fetcher.fetched_urls().is_empty());
        assert!(h.service.calls_to("download:").is_empty());
    }

    #[tokio::test]
    async fn test_single_track_album_uses_single_layout() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockService::new("mock")
            .with_album("a1", album(&["t1"]))
            .with_track("t1", sample_track("Intro", 4));
        let h = harness(
            test_settings(dir.path()),
            service,
            Vec::new(),
            album_fetcher(),
            MockTagWriter::new(),
        );

        let report = run(&h, "a1").await;
        assert_eq!(report.to_string(), "1/1 tracks");

        let album_dir = dir.path().join("Test Album");
        assert!(album_dir.join("Intro.flac").exists());
        assert!(!album_dir.join("cover.jpg").exists());
        assert!(!album_dir.join("Booklet.pdf").exists());
    }

    #[tokio::test]
    async fn test_empty_album() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockService::new("mock").with_album("a1", album(&[]));
        let h = simple_harness(dir.path(), service);

        let report = run(&h, "a1").await;
        assert_eq!(report.total, 0);
        assert!(!dir.path().join("Test Album").exists());
    }

    #[tokio::test]
    async fn test_different_artist_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockService::new("mock")
            .with_album("a1", album(&["t1", "t2"]))
            .with_track("t1", sample_track("Intro", 1))
            .with_track(
                "t2",
                TrackDescriptor {
                    artists: vec!["Someone Else".to_string()],
                    ..sample_track("Cover", 2)
                },
            );
        let h = simple_harness(dir.path(), service);

        let report = h
            .downloader
            .download_album(
                h.service.as_ref(),
                "a1",
                &Default::default(),
                dir.path(),
                Some("test artist"),
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded, vec!["t1"]);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            h.service.calls_to("download:"),
            vec!["download:t1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_is_reported_per_track() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = MockService::new("mock")
            .with_album("a1", album(&["t1", "t2"]))
            .with_track("t1", sample_track("Intro", 1))
            .with_track("t2", sample_track("VCR", 2));
        service.failing_downloads.push("t1".to_string());
        let h = simple_harness(dir.path(), service);

        let report = run(&h, "a1").await;
        assert_eq!(report.succeeded, vec!["t2"]);
        assert_eq!(report.failed, 1);
        assert!(dir.path().join("Test Album").join("1. VCR.flac").exists());

        let track = h
            .downloader
            .download_track(
                h.service.as_ref(),
                &crate::downloader::TrackJob::new(
                    "t1",
                    &Default::default(),
                    dir.path(),
                    &crate::downloader::Ledger::standalone(dir.path()),
                ),
            )
            .await
            .unwrap();
        assert!(matches!(track, PipelineOutcome::Failed(FailReason::Service(_))));
    }

    fn cover_harness(
        root: &std::path::Path,
        capabilities: Capabilities,
    ) -> super::super::tests::Harness {
        let mut settings = test_settings(root);
        settings.main_cover.resolution = 16;
        let service = MockService::new("mock")
            .with_capabilities(capabilities)
            .with_album("a1", album(&["t1"]))
            .with_track("t1", sample_track("Intro", 1));
        harness(settings, service, Vec::new(), album_fetcher(), MockTagWriter::new())
    }

    #[tokio::test]
    async fn test_album_cover_resized_for_native_size_services() {
        let dir = tempfile::tempdir().unwrap();
        let h = cover_harness(
            dir.path(),
            Capabilities::DOWNLOAD | Capabilities::NEEDS_COVER_RESIZE,
        );

        let report = run(&h, "a1").await;
        assert_eq!(report.succeeded, vec!["t1"]);

        let cover = dir.path().join("Test Album").join("cover.jpg");
        assert_eq!(image_resolution(&cover).unwrap(), (16, 16));
        assert_eq!(
            image::ImageReader::open(&cover)
                .unwrap()
                .with_guessed_format()
                .unwrap()
                .format(),
            Some(image::ImageFormat::Jpeg)
        );
    }

    #[tokio::test]
    async fn test_album_cover_untouched_without_resize_capability() {
        let dir = tempfile::tempdir().unwrap();
        let h = cover_harness(dir.path(), Capabilities::DOWNLOAD);

        run(&h, "a1").await;

        let cover = dir.path().join("Test Album").join("cover.jpg");
        assert_eq!(image_resolution(&cover).unwrap(), (4, 4));
    }
}
