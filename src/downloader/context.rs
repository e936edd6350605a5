//! Immutable run settings.
//!
//! Built once from the [`Config`] at the start of a run. Templates are parsed
//! here so a typo in a path format fails before anything is downloaded.

use std::path::PathBuf;

use crate::config::{Config, M3uPathMode};
use crate::convert::ConversionRules;
use crate::error::{Error, Result, ResultExt};
use crate::metadata::TagOptions;
use crate::model::{CodecOptions, CoverCompression, CoverOptions, ImageFileType, QualityTier};
use crate::organizer::{ALBUM_KEYS, PLAYLIST_KEYS, PathTemplate, TRACK_KEYS};

/// Everything a download run needs to know, validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub download_path: PathBuf,
    pub quality: QualityTier,
    pub strict_quality: bool,
    pub codec_options: CodecOptions,

    // Layout
    pub album_format: PathTemplate,
    pub playlist_format: PathTemplate,
    pub track_filename_format: PathTemplate,
    pub single_full_path_format: PathTemplate,
    pub enable_zfill: bool,
    pub force_album_format: bool,
    pub disc_subdirectories: bool,
    pub source_subdirectories: bool,

    // Covers
    pub embed_cover: bool,
    pub main_cover: CoverOptions,
    /// Set when an external cover should be saved next to every track
    pub external_cover: Option<CoverOptions>,
    pub save_animated_cover: bool,
    pub cover_variance_threshold: f64,

    // Lyrics
    pub embed_lyrics: bool,
    pub save_synced_lyrics: bool,

    // Playlists
    pub save_m3u: bool,
    pub m3u_paths: M3uPathMode,
    pub extended_m3u: bool,
    pub playlist_download_service: Option<String>,

    // Conversion
    pub conversions: ConversionRules,
    pub keep_original: bool,

    // Filtering and policy
    pub ignore_existing_files: bool,
    pub ignore_different_artists: bool,
    pub log_unavailable_tracks: bool,
    pub remove_collectors_editions: bool,
    pub remove_live_recordings: bool,
    pub strict_artist_match: bool,
    pub return_credited_albums: bool,
    pub separate_tracks_skip_downloaded: bool,
    pub debug_mode: bool,

    // Third-party modules
    pub covers_module: Option<String>,
    pub lyrics_module: Option<String>,
    pub credits_module: Option<String>,

    pub tagging: TagOptions,
}

impl Settings {
    /// Validate `config` into run settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        let formatting = &config.formatting;
        let covers = &config.covers;

        let album_format = PathTemplate::parse(&formatting.album_format, ALBUM_KEYS)
            .map_err(Error::from)
            .with_context("album_format")?;
        let playlist_format = PathTemplate::parse(&formatting.playlist_format, PLAYLIST_KEYS)
            .map_err(Error::from)
            .with_context("playlist_format")?;
        let track_filename_format =
            PathTemplate::parse(&formatting.track_filename_format, TRACK_KEYS)
                .map_err(Error::from)
                .with_context("track_filename_format")?;
        let single_full_path_format =
            PathTemplate::parse(&formatting.single_full_path_format, TRACK_KEYS)
                .map_err(Error::from)
                .with_context("single_full_path_format")?;

        let main_cover = CoverOptions {
            file_type: ImageFileType::Jpg,
            resolution: covers.main_resolution,
            compression: parse_compression(&covers.main_compression)?,
        };
        let external_cover = if covers.save_external {
            Some(CoverOptions {
                file_type: covers
                    .external_format
                    .parse::<ImageFileType>()
                    .map_err(Error::config)?,
                resolution: covers.external_resolution,
                compression: parse_compression(&covers.external_compression)?,
            })
        } else {
            None
        };

        let quality = QualityTier::from(config.general.download_quality.as_str());
        if let QualityTier::Unknown(name) = &quality {
            tracing::warn!("Unknown download quality \"{}\", every stream will be accepted", name);
        }

        let advanced = &config.advanced;
        Ok(Self {
            download_path: config.general.download_path.clone(),
            quality,
            strict_quality: config.general.strict_quality_download,
            codec_options: CodecOptions {
                spatial_codecs: config.codecs.spatial_codecs,
                proprietary_codecs: config.codecs.proprietary_codecs,
            },
            album_format,
            playlist_format,
            track_filename_format,
            single_full_path_format,
            enable_zfill: formatting.enable_zfill,
            force_album_format: formatting.force_album_format,
            disc_subdirectories: formatting.disc_subdirectories,
            source_subdirectories: formatting.source_subdirectories,
            embed_cover: covers.embed_cover,
            main_cover,
            external_cover,
            save_animated_cover: covers.save_animated_cover,
            cover_variance_threshold: advanced.cover_variance_threshold,
            embed_lyrics: config.lyrics.embed_lyrics,
            save_synced_lyrics: config.lyrics.save_synced_lyrics,
            save_m3u: config.playlist.save_m3u,
            m3u_paths: config.playlist.paths_m3u,
            extended_m3u: config.playlist.extended_m3u,
            playlist_download_service: config.playlist.download_service.clone(),
            conversions: ConversionRules::from_config(advanced),
            keep_original: advanced.conversion_keep_original,
            ignore_existing_files: advanced.ignore_existing_files,
            ignore_different_artists: advanced.ignore_different_artists,
            log_unavailable_tracks: advanced.log_unavailable_tracks,
            remove_collectors_editions: advanced.remove_collectors_editions,
            remove_live_recordings: advanced.remove_live_recordings,
            strict_artist_match: advanced.strict_artist_match,
            return_credited_albums: config.artist_downloading.return_credited_albums,
            separate_tracks_skip_downloaded: config.artist_downloading.separate_tracks_skip_downloaded,
            debug_mode: advanced.debug_mode,
            covers_module: config.modules.covers.clone(),
            lyrics_module: config.modules.lyrics.clone(),
            credits_module: config.modules.credits.clone(),
            tagging: TagOptions {
                save_tags: config.tagging.save_tags.clone(),
                overwrite_tags_only: config.tagging.overwrite_tags_only,
            },
        })
    }
}

fn parse_compression(value: &str) -> Result<CoverCompression> {
    match value.trim().to_lowercase().as_str() {
        "low" => Ok(CoverCompression::Low),
        "high" => Ok(CoverCompression::High),
        other => Err(Error::config(format!("Unknown cover compression: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::from_config(&Config::default()).unwrap();
        assert_eq!(settings.quality, QualityTier::Hifi);
        assert_eq!(settings.main_cover.resolution, 1400);
        assert_eq!(settings.main_cover.compression, CoverCompression::High);
        assert!(settings.external_cover.is_none());
        assert_eq!(settings.track_filename_format.as_str(), "{track_number}. {name}");
    }

    #[test]
    fn test_unknown_placeholder_fails_fast() {
        let mut config = Config::default();
        config.formatting.album_format = "{artist}/{nmae}".to_string();

        let err = Settings::from_config(&config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("album_format"));
        assert!(msg.contains("nmae"));
    }

    #[test]
    fn test_external_cover_options() {
        let mut config = Config::default();
        config.covers.save_external = true;
        config.covers.external_format = "webp".to_string();

        let settings = Settings::from_config(&config).unwrap();
        let external = settings.external_cover.unwrap();
        assert_eq!(external.file_type, ImageFileType::Webp);
        assert_eq!(external.resolution, 3000);
        assert_eq!(external.compression, CoverCompression::Low);

        config.covers.external_format = "tiff".to_string();
        assert!(Settings::from_config(&config).is_err());
    }

    #[test]
    fn test_bad_compression_is_config_error() {
        let mut config = Config::default();
        config.covers.main_compression = "medium".to_string();
        assert!(matches!(
            Settings::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
