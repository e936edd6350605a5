//! The per-track pipeline.
//!
//! `Resolving -> Gating -> Acquiring -> Enriching -> Converting -> Tagging`.
//! Orchestrators call [`Downloader::resolve_and_gate`] first so they can
//! materialize shared collection assets once a track is known to pass, then
//! [`Downloader::acquire_and_commit`] for the rest.
//!
//! Every problem short of a user interrupt ends as a [`PipelineOutcome`];
//! only [`Error::Interrupted`] is returned as `Err`. With `debug_mode` a
//! failed payload download is returned as `Err` too.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use super::Downloader;
use super::ledger::{Ledger, LedgerKind};
use super::m3u::M3uPlaylist;
use super::outcome::{FailReason, PipelineOutcome, SkipReason, SuccessKind};
use crate::convert::{ConversionEngine, PlanDecision};
use crate::cover::{CoverSelector, resize_cover};
use crate::error::{Error, Result};
use crate::fetch::{FetchError, fetch_to_temp};
use crate::metadata::write_tag_sidecar;
use crate::model::{
    Codec, Container, CoverInfo, CoverOptions, Credit, DownloadMode, DownloadSource, ExtraParams,
    LyricsInfo, TrackDescriptor,
};
use crate::organizer::{
    TemplateValues, limit_stem, move_file, with_extension, with_suffix, zfill_width,
};
use crate::quality;
use crate::service::{Capabilities, MusicService};

/// Candidates requested from a covers module.
const COVER_SEARCH_LIMIT: usize = 10;

/// One track to run through the pipeline and where it goes.
#[derive(Debug, Clone, Copy)]
pub struct TrackJob<'a> {
    pub id: &'a str,
    pub extra: &'a ExtraParams,
    /// Collection directory, or the download root for standalone tracks
    pub dir: &'a Path,
    /// Position used to renumber the track
    pub index: Option<u32>,
    /// Collection size used to renumber the track
    pub total: Option<u32>,
    /// A track download on its own: single-file layout, no zero-fill width
    pub standalone: bool,
    /// Look the track's album up and file it there in forced album layout
    pub album_lookup: bool,
    /// Artist being walked, when downloading a discography
    pub expected_artist: Option<&'a str>,
    pub ledger: &'a Ledger,
    /// Cover shared by the whole collection
    pub collection_cover: Option<&'a Path>,
    pub m3u: Option<&'a M3uPlaylist>,
}

impl<'a> TrackJob<'a> {
    pub fn new(id: &'a str, extra: &'a ExtraParams, dir: &'a Path, ledger: &'a Ledger) -> Self {
        Self {
            id,
            extra,
            dir,
            index: None,
            total: None,
            standalone: false,
            album_lookup: false,
            expected_artist: None,
            ledger,
            collection_cover: None,
            m3u: None,
        }
    }
}

/// Result of resolving and gating.
#[derive(Debug)]
pub enum Gate {
    Pass(Box<TrackDescriptor>),
    Stop(PipelineOutcome),
}

/// Convert a fetch error into "carry on without it", except for interrupts.
pub(super) fn tolerate<T>(
    result: std::result::Result<T, FetchError>,
    what: &str,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(FetchError::Interrupted) => Err(Error::Interrupted),
        Err(e) => {
            tracing::warn!("Failed to download {}: {}", what, e);
            Ok(None)
        }
    }
}

impl Downloader {
    /// Download a track on its own into `base`.
    pub async fn download_single(
        &self,
        service: &dyn MusicService,
        track_id: &str,
        extra: &ExtraParams,
        base: &Path,
    ) -> Result<PipelineOutcome> {
        let ledger = Ledger::standalone(base);
        let job = TrackJob {
            standalone: true,
            album_lookup: true,
            ..TrackJob::new(track_id, extra, base, &ledger)
        };
        self.download_track(service, &job).await
    }

    /// Run the whole pipeline for one track.
    pub async fn download_track(
        &self,
        service: &dyn MusicService,
        job: &TrackJob<'_>,
    ) -> Result<PipelineOutcome> {
        match self.resolve_and_gate(service, job).await {
            Gate::Pass(track) => self.acquire_and_commit(service, *track, job).await,
            Gate::Stop(outcome) => Ok(outcome),
        }
    }

    /// Resolve the descriptor and apply availability, quality and artist
    /// policy.
    pub async fn resolve_and_gate(&self, service: &dyn MusicService, job: &TrackJob<'_>) -> Gate {
        let settings = &self.settings;
        let track = match service
            .get_track_info(job.id, &settings.quality, &settings.codec_options, job.extra)
            .await
        {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!("Track {} could not be resolved: {}", job.id, e);
                return Gate::Stop(PipelineOutcome::Failed(FailReason::Service(e.to_string())));
            }
        };

        if let Some(error) = &track.error {
            tracing::warn!("Track {} unavailable: {}", job.id, error);
            if settings.log_unavailable_tracks {
                job.ledger.record_or_warn(LedgerKind::Unavailable, job.id, &track);
            }
            return Gate::Stop(PipelineOutcome::Failed(FailReason::Unavailable(error.clone())));
        }

        if settings.strict_quality
            && let Err(rejection) = quality::check(&settings.quality, &track)
        {
            tracing::warn!(
                "Strict quality download failed for {} - {} [{}]: {}",
                track.primary_artist(),
                track.name,
                job.id,
                rejection
            );
            job.ledger
                .record_or_warn(LedgerKind::StrictQuality, job.id, &track);
            return Gate::Stop(PipelineOutcome::Skipped(SkipReason::QualityRejected(
                rejection.to_string(),
            )));
        }

        if let Some(artist) = job.expected_artist
            && settings.ignore_different_artists
            && !track.has_artist(artist)
        {
            tracing::info!("Track {} is not from {}, skipping", track.name, artist);
            return Gate::Stop(PipelineOutcome::Skipped(SkipReason::DifferentArtist {
                expected: artist.to_string(),
            }));
        }

        Gate::Pass(Box::new(track))
    }

    /// Fetch, enrich, convert and tag a track that passed the gate.
    pub async fn acquire_and_commit(
        &self,
        service: &dyn MusicService,
        mut track: TrackDescriptor,
        job: &TrackJob<'_>,
    ) -> Result<PipelineOutcome> {
        let settings = &self.settings;
        tracing::info!("Downloading track {} ({})", track.name, job.id);
        tracing::debug!(
            "Codec: {}, bitrate: {:?}, bit depth: {:?}, sample rate: {:?}",
            track.codec.data().pretty_name,
            track.bitrate,
            track.bit_depth,
            track.sample_rate
        );

        if !settings.force_album_format {
            if let Some(index) = job.index {
                track.tags.track_number = Some(index);
            }
            if let Some(total) = job.total {
                track.tags.total_tracks = Some(total);
            }
        }

        let dir = if settings.force_album_format && job.album_lookup {
            self.forced_album_dir(service, &track, job.dir).await?
        } else {
            job.dir.to_path_buf()
        };
        let stem = self.track_stem(&track, job, &dir);
        if let Some(parent) = stem.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            return Ok(PipelineOutcome::Failed(FailReason::Fetch(format!(
                "Failed to create {parent:?}: {e}"
            ))));
        }

        // Existence is checked against the container after conversion
        let final_container = settings.conversions.final_container(track.codec);
        let existing = with_extension(&stem, final_container.extension());
        if existing.is_file() && !settings.ignore_existing_files {
            tracing::info!("Track file already exists: {:?}", existing);
            if let Some(m3u) = job.m3u {
                m3u.add_or_warn(&track, &existing);
            }
            return Ok(PipelineOutcome::Success(SuccessKind::AlreadyExists {
                path: existing,
            }));
        }

        if let Some(description) = &track.description
            && let Err(e) = std::fs::write(with_extension(&stem, "txt"), description)
        {
            tracing::warn!("Failed to write track description: {}", e);
        }

        // Acquiring
        let (mut path, mut codec) = match self.acquire(service, &track, job, &stem).await? {
            Ok(acquired) => acquired,
            Err(reason) => {
                tracing::warn!("Track {} failed: {:?}", job.id, reason);
                return Ok(PipelineOutcome::Failed(reason));
            }
        };
        let mut container = codec.container();

        // Enriching
        let downloaded_cover = match job.collection_cover {
            Some(_) => None,
            None => self.track_cover(service, &track, job.id, &stem).await?,
        };
        let cover: Option<&Path> = job
            .collection_cover
            .or_else(|| downloaded_cover.as_deref());

        if settings.save_animated_cover
            && let Some(url) = &track.animated_cover_url
        {
            tracing::info!("Downloading animated cover");
            let dest = with_suffix(&stem, "_cover.mp4");
            tolerate(
                self.fetcher.fetch_to(url, &Default::default(), &dest).await,
                "animated cover",
            )?;
        }

        let mut embedded_lyrics = None;
        if settings.embed_lyrics || settings.save_synced_lyrics {
            let lyrics = self.track_lyrics(service, &track, job.id).await;
            if let Some(embedded) = lyrics.embedded.filter(|l| !l.is_empty()) {
                if settings.save_synced_lyrics
                    && let Some(synced) = &lyrics.synced
                    && let Err(e) = std::fs::write(with_extension(&stem, "lrc"), synced)
                {
                    tracing::warn!("Failed to write synced lyrics: {}", e);
                }
                if settings.embed_lyrics {
                    embedded_lyrics = Some(embedded);
                }
            }
        }

        let credits = self.track_credits(service, &track, job.id).await;

        // Converting
        let mut original: Option<(PathBuf, Container)> = None;
        if let PlanDecision::Planned(plan) = settings.conversions.plan(codec) {
            let engine = ConversionEngine::new(self.transcoder.as_ref(), settings.keep_original);
            match engine.execute(&plan, &path, &stem) {
                Ok(converted) => {
                    original = converted.original.map(|p| (p, container));
                    path = converted.path;
                    codec = converted.codec;
                    container = converted.container;
                }
                Err(e) => {
                    tracing::warn!("Conversion failed, keeping {}: {}", codec, e);
                }
            }
        }
        track.codec = codec;

        if let Some(m3u) = job.m3u {
            m3u.add_or_warn(&track, &path);
        }

        // Tagging
        let tag_cover = cover.filter(|_| settings.embed_cover);
        let mut tags_written = true;
        let mut targets = vec![(path.as_path(), container)];
        if let Some((original_path, original_container)) = &original {
            targets.push((original_path.as_path(), *original_container));
        }
        for (target, target_container) in targets {
            if let Err(e) = self.tagger.write_tags(
                target,
                tag_cover,
                &track,
                &credits,
                embedded_lyrics.as_deref(),
                target_container,
            ) {
                tracing::warn!("Tagging failed: {}", e);
                tags_written = false;
            }
        }
        if !tags_written {
            match write_tag_sidecar(&stem, &track, &credits, embedded_lyrics.as_deref()) {
                Ok(_) => tracing::info!("Tagging failed, tags saved to text file"),
                Err(e) => tracing::error!("Failed to save tags to text file: {}", e),
            }
        }

        tracing::info!("Track {} downloaded", job.id);
        Ok(PipelineOutcome::Success(SuccessKind::Downloaded {
            path,
            tags_written,
        }))
    }

    /// File path without extension for `track`.
    fn track_stem(&self, track: &TrackDescriptor, job: &TrackJob<'_>, dir: &Path) -> PathBuf {
        let settings = &self.settings;
        let zfill = settings.enable_zfill.then(|| {
            if job.standalone {
                1
            } else {
                zfill_width(track.tags.total_tracks.unwrap_or(1))
            }
        });
        let values = TemplateValues::for_track(track, job.id, zfill);

        let single_file = !settings.force_album_format
            && (job.standalone || track.tags.total_tracks == Some(1));
        let mut dir = dir.to_path_buf();
        let name = if single_file {
            settings.single_full_path_format.render(&values)
        } else {
            if settings.disc_subdirectories
                && track.tags.total_discs.is_some_and(|d| d > 1)
            {
                dir.push(format!("Disc {}", track.tags.disc_number.unwrap_or(1)));
            }
            settings.track_filename_format.render(&values)
        };
        limit_stem(&dir.join(name))
    }

    /// Fetch the payload into `<stem>.<container>`.
    ///
    /// The inner `Err` is a track failure; the outer one an interrupt, or
    /// any failure at all in debug mode.
    async fn acquire(
        &self,
        service: &dyn MusicService,
        track: &TrackDescriptor,
        job: &TrackJob<'_>,
        stem: &Path,
    ) -> Result<std::result::Result<(PathBuf, Codec), FailReason>> {
        let debug_mode = self.settings.debug_mode;
        let download = match service
            .get_track_download(job.id, &track.download_extra)
            .await
        {
            Ok(download) => download,
            Err(e) if debug_mode => return Err(e.into()),
            Err(e) => return Ok(Err(FailReason::Service(e.to_string()))),
        };

        let dest = with_extension(stem, track.codec.container().extension());
        match &download.source {
            DownloadSource::Url { url, headers } => {
                match self.fetcher.fetch_to(url, headers, &dest).await {
                    Ok(()) => {}
                    Err(FetchError::Interrupted) => return Err(Error::Interrupted),
                    Err(e) if debug_mode => return Err(e.into()),
                    Err(e) => return Ok(Err(FailReason::Fetch(e.to_string()))),
                }
            }
            DownloadSource::TempFile(temp) => match move_file(temp, &dest) {
                Ok(()) => {}
                Err(e) if debug_mode => return Err(e.into()),
                Err(e) => {
                    return Ok(Err(FailReason::Fetch(format!(
                        "Failed to move {temp:?}: {e}"
                    ))));
                }
            },
        }

        let Some(actual) = download.different_codec.filter(|c| *c != track.codec) else {
            return Ok(Ok((dest, track.codec)));
        };
        tracing::info!("Service delivered {} instead of {}", actual, track.codec);
        let renamed = with_extension(stem, actual.container().extension());
        if renamed != dest
            && let Err(e) = move_file(&dest, &renamed)
        {
            return Ok(Err(FailReason::Fetch(format!(
                "Failed to rename {dest:?}: {e}"
            ))));
        }
        Ok(Ok((renamed, actual)))
    }

    /// Directory of the track's album inside `parent`, with album assets.
    async fn forced_album_dir(
        &self,
        service: &dyn MusicService,
        track: &TrackDescriptor,
        parent: &Path,
    ) -> Result<PathBuf> {
        let album = match service
            .get_album_info(&track.album_id, &ExtraParams::new())
            .await
        {
            Ok(album) => album,
            Err(e) => {
                tracing::warn!("Album {} lookup failed, using {:?}: {}", track.album_id, parent, e);
                return Ok(parent.to_path_buf());
            }
        };
        let dir = self.album_dir(parent, &album, &track.album_id);
        self.album_files(service, &album, &dir).await?;
        Ok(dir)
    }

    /// Download the track cover into a temp file.
    ///
    /// With a covers module configured the service cover is only a
    /// reference for picking a better match.
    async fn track_cover(
        &self,
        service: &dyn MusicService,
        track: &TrackDescriptor,
        track_id: &str,
        stem: &Path,
    ) -> Result<Option<TempPath>> {
        let settings = &self.settings;
        let covers_module = settings
            .covers_module
            .as_deref()
            .filter(|name| *name != service.name())
            .and_then(|name| match self.services.get(name) {
                Ok(module) => Some(module),
                Err(e) => {
                    tracing::warn!("Covers module unavailable: {}", e);
                    None
                }
            });

        let Some(cover_url) = &track.cover_url else {
            return Ok(None);
        };

        let Some(module) = covers_module else {
            tracing::info!("Downloading artwork");
            let cover = self
                .fetch_cover_to_temp(service, cover_url, &settings.main_cover, "cover")
                .await?;
            if let Some(external) = &settings.external_cover
                && service.capabilities().contains(Capabilities::COVERS)
            {
                match service
                    .get_track_cover(track_id, external, &track.cover_extra)
                    .await
                {
                    Ok(info) => self.save_external_cover(service, &info, stem, external).await?,
                    Err(e) => tracing::warn!("No external cover: {}", e),
                }
            }
            return Ok(cover);
        };

        tracing::info!("Downloading artwork with {}", module.name());
        let Some(reference) = tolerate(
            fetch_to_temp(self.fetcher.as_ref(), cover_url, ".jpg").await,
            "cover",
        )?
        else {
            return Ok(None);
        };

        let candidates = match module
            .search(DownloadMode::Track, &track.search_query(), Some(track), COVER_SEARCH_LIMIT)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Cover search failed: {}", e);
                Vec::new()
            }
        };

        let selector = CoverSelector::new(self.fetcher.as_ref(), settings.cover_variance_threshold);
        let found = selector
            .find_match(module.as_ref(), &reference, &candidates)
            .await
            .map_err(|_| Error::Interrupted)?;
        let Some(found) = found else {
            return Ok(Some(reference));
        };

        let candidate = &candidates[found.index];
        let main = match module
            .get_track_cover(&candidate.id, &settings.main_cover, &candidate.extra)
            .await
        {
            Ok(info) => {
                self.fetch_cover_to_temp(
                    module.as_ref(),
                    &info.url,
                    &settings.main_cover,
                    "matched cover",
                )
                .await?
            }
            Err(e) => {
                tracing::warn!("Matched cover unavailable: {}", e);
                None
            }
        };

        if let Some(external) = &settings.external_cover {
            match module
                .get_track_cover(&candidate.id, external, &candidate.extra)
                .await
            {
                Ok(info) => {
                    self.save_external_cover(module.as_ref(), &info, stem, external)
                        .await?
                }
                Err(e) => tracing::warn!("No external cover: {}", e),
            }
        }

        Ok(Some(main.unwrap_or(reference)))
    }

    /// Fetch a cover into a temp file, normalised for `service`.
    async fn fetch_cover_to_temp(
        &self,
        service: &dyn MusicService,
        url: &str,
        options: &CoverOptions,
        what: &str,
    ) -> Result<Option<TempPath>> {
        let cover = tolerate(fetch_to_temp(self.fetcher.as_ref(), url, ".jpg").await, what)?;
        if let Some(cover) = &cover {
            self.normalize_cover(service, cover, options);
        }
        Ok(cover)
    }

    /// Save the external-resolution cover next to the track.
    async fn save_external_cover(
        &self,
        service: &dyn MusicService,
        info: &CoverInfo,
        stem: &Path,
        options: &CoverOptions,
    ) -> Result<()> {
        // A resized cover is re-encoded, so it takes the configured format
        let file_type = if needs_cover_resize(service) {
            options.file_type
        } else {
            info.file_type
        };
        let dest = with_extension(stem, file_type.extension());
        let saved = tolerate(
            self.fetcher.fetch_to(&info.url, &Default::default(), &dest).await,
            "external cover",
        )?;
        if saved.is_some() {
            self.normalize_cover(service, &dest, options);
        }
        Ok(())
    }

    /// Resize a cover fetched from `service` when it cannot do so itself.
    ///
    /// A cover that fails to resize is kept as fetched.
    pub(super) fn normalize_cover(
        &self,
        service: &dyn MusicService,
        path: &Path,
        options: &CoverOptions,
    ) {
        if !needs_cover_resize(service) {
            return;
        }
        tracing::debug!("Resizing cover {:?} to {}px", path, options.resolution);
        if let Err(e) = resize_cover(path, options) {
            tracing::warn!("Failed to resize cover {:?}: {}", path, e);
        }
    }

    /// Lyrics from the lyrics module, or the service itself.
    async fn track_lyrics(
        &self,
        service: &dyn MusicService,
        track: &TrackDescriptor,
        track_id: &str,
    ) -> LyricsInfo {
        let result = match self.enrichment_module(self.settings.lyrics_module.as_deref(), service) {
            Some(module) => {
                tracing::info!("Retrieving lyrics with {}", module.name());
                match first_search_hit(module.as_ref(), track).await {
                    Some(hit) => module.get_track_lyrics(&hit.id, &hit.extra).await,
                    None => return LyricsInfo::default(),
                }
            }
            None if service.capabilities().contains(Capabilities::LYRICS) => {
                tracing::info!("Retrieving lyrics");
                service.get_track_lyrics(track_id, &track.lyrics_extra).await
            }
            None => return LyricsInfo::default(),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("No lyrics: {}", e);
            LyricsInfo::default()
        })
    }

    /// Credits from the credits module, or the service itself.
    async fn track_credits(
        &self,
        service: &dyn MusicService,
        track: &TrackDescriptor,
        track_id: &str,
    ) -> Vec<Credit> {
        let result = match self.enrichment_module(self.settings.credits_module.as_deref(), service) {
            Some(module) => {
                tracing::info!("Retrieving credits with {}", module.name());
                match first_search_hit(module.as_ref(), track).await {
                    Some(hit) => module.get_track_credits(&hit.id, &hit.extra).await,
                    None => return Vec::new(),
                }
            }
            None if service.capabilities().contains(Capabilities::CREDITS) => {
                tracing::info!("Retrieving credits");
                service.get_track_credits(track_id, &track.credits_extra).await
            }
            None => return Vec::new(),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("No credits: {}", e);
            Vec::new()
        })
    }

    /// A configured third-party module other than `service`.
    fn enrichment_module(
        &self,
        name: Option<&str>,
        service: &dyn MusicService,
    ) -> Option<std::sync::Arc<dyn MusicService>> {
        let name = name.filter(|name| *name != service.name())?;
        match self.services.get(name) {
            Ok(module) => Some(module),
            Err(e) => {
                tracing::warn!("Module {} unavailable: {}", name, e);
                None
            }
        }
    }
}

fn needs_cover_resize(service: &dyn MusicService) -> bool {
    service
        .capabilities()
        .contains(Capabilities::NEEDS_COVER_RESIZE)
}

/// Best match for `track` on another service.
async fn first_search_hit(
    module: &dyn MusicService,
    track: &TrackDescriptor,
) -> Option<crate::model::SearchResult> {
    match module
        .search(DownloadMode::Track, &track.search_query(), Some(track), 1)
        .await
    {
        Ok(results) => results.into_iter().next(),
        Err(e) => {
            tracing::warn!("Search on {} failed: {}", module.name(), e);
            None
        }
    }
}
