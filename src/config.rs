//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\music-courier\config.toml
//! - macOS: ~/Library/Application Support/music-courier/config.toml
//! - Linux: ~/.config/music-courier/config.toml
//!
//! The file is human-readable and every section is optional. At the start of
//! a run the config is validated and turned into immutable
//! [`Settings`](crate::downloader::Settings).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download location and quality
    pub general: GeneralConfig,

    /// Path templates and layout switches
    pub formatting: FormattingConfig,

    /// Which codec families services may return
    pub codecs: CodecConfig,

    /// Cover art options
    pub covers: CoverConfig,

    /// Lyrics options
    pub lyrics: LyricsConfig,

    /// Playlist options
    pub playlist: PlaylistConfig,

    /// Conversion and filtering switches
    pub advanced: AdvancedConfig,

    /// Artist discography options
    pub artist_downloading: ArtistConfig,

    /// Third-party modules used for enrichment
    pub modules: ModulesConfig,

    /// Tag writing options
    pub tagging: TaggingConfig,

    /// Catalog-file services, name -> JSON file
    pub catalogs: BTreeMap<String, PathBuf>,
}

/// Download location and requested quality
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub download_path: PathBuf,

    /// One of `low`, `medium`, `high`, `hifi`, `lossless`; anything else
    /// accepts every stream
    pub download_quality: String,

    /// Skip tracks whose stream does not meet `download_quality`
    pub strict_quality_download: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("./downloads/"),
            download_quality: "hifi".to_string(),
            strict_quality_download: false,
        }
    }
}

/// Path templates and layout switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingConfig {
    /// Album directory template
    pub album_format: String,

    /// Playlist directory template
    pub playlist_format: String,

    /// Track file name template inside a collection
    pub track_filename_format: String,

    /// Full path template for standalone tracks
    pub single_full_path_format: String,

    /// Pad track and disc numbers to the width of the track count
    pub enable_zfill: bool,

    /// Keep album numbering and layout even for playlists and single tracks
    pub force_album_format: bool,

    /// Put multi-disc albums into `Disc N` subdirectories
    pub disc_subdirectories: bool,

    /// Prefix downloads with the service name
    pub source_subdirectories: bool,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            album_format: "{name}{explicit}".to_string(),
            playlist_format: "{name}{explicit}".to_string(),
            track_filename_format: "{track_number}. {name}".to_string(),
            single_full_path_format: "{name}".to_string(),
            enable_zfill: true,
            force_album_format: false,
            disc_subdirectories: false,
            source_subdirectories: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub spatial_codecs: bool,
    pub proprietary_codecs: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            spatial_codecs: true,
            proprietary_codecs: false,
        }
    }
}

/// Cover art options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub embed_cover: bool,
    pub main_compression: String,
    pub main_resolution: u32,
    /// Also keep a cover file next to every track
    pub save_external: bool,
    pub external_format: String,
    pub external_compression: String,
    pub external_resolution: u32,
    pub save_animated_cover: bool,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            embed_cover: true,
            main_compression: "high".to_string(),
            main_resolution: 1400,
            save_external: false,
            external_format: "png".to_string(),
            external_compression: "low".to_string(),
            external_resolution: 3000,
            save_animated_cover: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    pub embed_lyrics: bool,
    /// Write time-synced lyrics to `<track>.lrc`
    pub save_synced_lyrics: bool,
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            embed_lyrics: true,
            save_synced_lyrics: true,
        }
    }
}

/// How track paths are written into an M3U file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum M3uPathMode {
    #[default]
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    pub save_m3u: bool,
    pub paths_m3u: M3uPathMode,
    pub extended_m3u: bool,
    /// Download playlist tracks through this service instead
    pub download_service: Option<String>,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            save_m3u: true,
            paths_m3u: M3uPathMode::Absolute,
            extended_m3u: true,
            download_service: None,
        }
    }
}

/// Conversion and filtering switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    /// Source codec -> target codec, lowercase names
    pub codec_conversions: BTreeMap<String, String>,

    /// Target codec -> extra ffmpeg options
    pub conversion_flags: BTreeMap<String, BTreeMap<String, String>>,

    pub conversion_keep_original: bool,

    /// Maximum RMS difference for a third-party cover to count as a match
    pub cover_variance_threshold: f64,

    /// Raise failed track downloads and collection errors instead of
    /// logging them and moving on
    pub debug_mode: bool,

    /// Allow lossy to lossless and lossy to lossy conversions
    pub enable_undesirable_conversions: bool,

    /// Re-download files that already exist
    pub ignore_existing_files: bool,

    /// Skip artist tracks not credited to the artist
    pub ignore_different_artists: bool,

    pub log_unavailable_tracks: bool,
    pub remove_collectors_editions: bool,
    pub remove_live_recordings: bool,
    pub strict_artist_match: bool,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        let codec_conversions = [("alac", "flac"), ("wav", "flac")]
            .into_iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        let conversion_flags = BTreeMap::from([(
            "flac".to_string(),
            BTreeMap::from([("compression_level".to_string(), "5".to_string())]),
        )]);

        Self {
            codec_conversions,
            conversion_flags,
            conversion_keep_original: false,
            cover_variance_threshold: 8.0,
            debug_mode: false,
            enable_undesirable_conversions: false,
            ignore_existing_files: false,
            ignore_different_artists: true,
            log_unavailable_tracks: true,
            remove_collectors_editions: false,
            remove_live_recordings: false,
            strict_artist_match: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistConfig {
    pub return_credited_albums: bool,
    /// Skip loose tracks already downloaded as part of an album
    pub separate_tracks_skip_downloaded: bool,
}

impl Default for ArtistConfig {
    fn default() -> Self {
        Self {
            return_credited_albums: true,
            separate_tracks_skip_downloaded: true,
        }
    }
}

/// Third-party modules, by registered service name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub covers: Option<String>,
    pub lyrics: Option<String>,
    pub credits: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Restrict written tags to these keys (empty = all)
    pub save_tags: Vec<String>,
    /// Rewrite text tags only, never embed a cover
    pub overwrite_tags_only: bool,
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("music-courier"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load configuration from an explicit path, failing on any problem.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save configuration to disk
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &dir.join("config.toml"))
}

/// Save configuration to an explicit path.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
