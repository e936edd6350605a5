//! Core data models shared by services and the download pipeline.
//!
//! Defines codecs and containers with their static properties, quality tiers,
//! and the descriptors a [`MusicService`](crate::service::MusicService)
//! returns for tracks, albums, playlists and artists.
//!
//! Descriptors derive `Deserialize` so that file-backed catalogs can be loaded
//! straight from JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Free-form per-backend parameters passed back into later service calls.
pub type ExtraParams = HashMap<String, String>;

// ============================================================================
// Codecs and containers
// ============================================================================

/// File container an encoded stream is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Flac,
    Wav,
    Opus,
    Ogg,
    M4a,
    Mp3,
    Mp4,
    Ac3,
    Ac4,
    Eac3,
    Webm,
}

impl Container {
    /// File extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Flac => "flac",
            Container::Wav => "wav",
            Container::Opus => "opus",
            Container::Ogg => "ogg",
            Container::M4a => "m4a",
            Container::Mp3 => "mp3",
            Container::Mp4 => "mp4",
            Container::Ac3 => "ac3",
            Container::Ac4 => "ac4",
            Container::Eac3 => "eac3",
            Container::Webm => "webm",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Audio codec reported by a service for a resolved track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Codec {
    Flac,
    Alac,
    Wav,
    Mqa,
    Opus,
    Vorbis,
    Mp3,
    Aac,
    Heaac,
    /// MPEG-H 3D Audio (360 Reality Audio)
    Mhm1,
    Ac3,
    Eac3,
    Ac4,
    Atmos,
    /// No playable stream
    #[default]
    None,
}

/// Static properties of a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecData {
    pub pretty_name: &'static str,
    pub container: Container,
    pub lossless: bool,
    pub spatial: bool,
    pub proprietary: bool,
}

impl Codec {
    /// Every codec, in declaration order.
    pub const ALL: [Codec; 15] = [
        Codec::Flac,
        Codec::Alac,
        Codec::Wav,
        Codec::Mqa,
        Codec::Opus,
        Codec::Vorbis,
        Codec::Mp3,
        Codec::Aac,
        Codec::Heaac,
        Codec::Mhm1,
        Codec::Ac3,
        Codec::Eac3,
        Codec::Ac4,
        Codec::Atmos,
        Codec::None,
    ];

    pub fn data(&self) -> CodecData {
        let (pretty_name, container, lossless, spatial, proprietary) = match self {
            Codec::Flac => ("FLAC", Container::Flac, true, false, false),
            Codec::Alac => ("ALAC", Container::M4a, true, false, false),
            Codec::Wav => ("WAVE", Container::Wav, true, false, false),
            Codec::Mqa => ("FLAC (MQA)", Container::Flac, false, false, true),
            Codec::Opus => ("Opus", Container::Opus, false, false, false),
            Codec::Vorbis => ("Vorbis", Container::Ogg, false, false, false),
            Codec::Mp3 => ("MP3", Container::Mp3, false, false, false),
            Codec::Aac => ("AAC-LC", Container::M4a, false, false, false),
            Codec::Heaac => ("HE-AAC", Container::M4a, false, false, false),
            Codec::Mhm1 => ("MPEG-H 3D (360RA)", Container::Mp4, false, true, true),
            Codec::Ac3 => ("Dolby Digital", Container::Ac3, false, true, true),
            Codec::Eac3 => ("Dolby Digital Plus", Container::Eac3, false, true, true),
            Codec::Ac4 => ("Dolby AC-4", Container::Ac4, false, true, true),
            Codec::Atmos => ("Dolby Atmos", Container::Mp4, false, true, true),
            Codec::None => ("None", Container::Webm, false, false, false),
        };
        CodecData {
            pretty_name,
            container,
            lossless,
            spatial,
            proprietary,
        }
    }

    pub fn container(&self) -> Container {
        self.data().container
    }

    pub fn is_lossless(&self) -> bool {
        self.data().lossless
    }

    pub fn is_spatial(&self) -> bool {
        self.data().spatial
    }

    /// Upper-case identifier as used in settings files (`FLAC`, `HEAAC`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Flac => "FLAC",
            Codec::Alac => "ALAC",
            Codec::Wav => "WAV",
            Codec::Mqa => "MQA",
            Codec::Opus => "OPUS",
            Codec::Vorbis => "VORBIS",
            Codec::Mp3 => "MP3",
            Codec::Aac => "AAC",
            Codec::Heaac => "HEAAC",
            Codec::Mhm1 => "MHM1",
            Codec::Ac3 => "AC3",
            Codec::Eac3 => "EAC3",
            Codec::Ac4 => "AC4",
            Codec::Atmos => "ATMOS",
            Codec::None => "NONE",
        }
    }

    /// Default ffmpeg encoder name for this codec.
    pub fn encoder_name(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown codec: {0}")]
pub struct UnknownCodec(pub String);

impl FromStr for Codec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Codec::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| UnknownCodec(s.to_string()))
    }
}

/// Which codec families a service may hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecOptions {
    pub spatial_codecs: bool,
    pub proprietary_codecs: bool,
}

// ============================================================================
// Quality tiers
// ============================================================================

/// Requested download fidelity.
///
/// Ordered `Low < Medium < High < Hifi < Lossless`. Any other configured name
/// is preserved as [`QualityTier::Unknown`] and admits every stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Hifi,
    Lossless,
    Unknown(String),
}

impl From<String> for QualityTier {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "low" => QualityTier::Low,
            "medium" => QualityTier::Medium,
            "high" => QualityTier::High,
            "hifi" => QualityTier::Hifi,
            "lossless" => QualityTier::Lossless,
            other => QualityTier::Unknown(other.to_string()),
        }
    }
}

impl From<&str> for QualityTier {
    fn from(value: &str) -> Self {
        QualityTier::from(value.to_string())
    }
}

impl From<QualityTier> for String {
    fn from(value: QualityTier) -> Self {
        value.to_string()
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityTier::Low => f.write_str("low"),
            QualityTier::Medium => f.write_str("medium"),
            QualityTier::High => f.write_str("high"),
            QualityTier::Hifi => f.write_str("hifi"),
            QualityTier::Lossless => f.write_str("lossless"),
            QualityTier::Unknown(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// Covers, lyrics, credits
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFileType {
    #[default]
    Jpg,
    Png,
    Webp,
}

impl ImageFileType {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFileType::Jpg => "jpg",
            ImageFileType::Png => "png",
            ImageFileType::Webp => "webp",
        }
    }
}

impl FromStr for ImageFileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFileType::Jpg),
            "png" => Ok(ImageFileType::Png),
            "webp" => Ok(ImageFileType::Webp),
            other => Err(format!("Unknown image type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoverCompression {
    Low,
    #[default]
    High,
}

/// What a cover request should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverOptions {
    pub file_type: ImageFileType,
    pub resolution: u32,
    pub compression: CoverCompression,
}

/// Location of a cover image at the requested options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverInfo {
    pub url: String,
    #[serde(default)]
    pub file_type: ImageFileType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsInfo {
    /// Plain lyrics suitable for embedding
    pub embedded: Option<String>,
    /// Time-synced lyrics in LRC format
    pub synced: Option<String>,
}

/// A credit role and the people credited for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    #[serde(rename = "type")]
    pub kind: String,
    pub names: Vec<String>,
}

// ============================================================================
// Descriptors
// ============================================================================

/// Tag values written into the final file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSet {
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub disc_number: Option<u32>,
    pub total_discs: Option<u32>,
    /// ISO date, `YYYY-MM-DD`
    pub release_date: Option<String>,
    pub copyright: Option<String>,
    pub genres: Vec<String>,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub extra_tags: BTreeMap<String, String>,
    pub replay_gain: Option<f32>,
    pub replay_peak: Option<f32>,
}

/// Resolved metadata for one track.
///
/// A descriptor with `error` set carries no playable data and must never be
/// downloaded, converted or tagged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDescriptor {
    pub name: String,
    pub album: String,
    pub album_id: String,
    pub artists: Vec<String>,
    pub artist_id: String,
    pub release_year: Option<i32>,
    /// Duration in seconds
    pub duration: Option<u32>,
    pub codec: Codec,
    /// Bitrate in kbps
    pub bitrate: Option<u32>,
    pub bit_depth: Option<u32>,
    /// Sample rate in kHz
    pub sample_rate: Option<f32>,
    pub explicit: Option<bool>,
    pub cover_url: Option<String>,
    pub animated_cover_url: Option<String>,
    pub description: Option<String>,
    pub error: Option<String>,
    pub tags: TagSet,
    pub download_extra: ExtraParams,
    pub cover_extra: ExtraParams,
    pub lyrics_extra: ExtraParams,
    pub credits_extra: ExtraParams,
}

impl TrackDescriptor {
    /// First credited artist, or a placeholder.
    pub fn primary_artist(&self) -> &str {
        self.artists
            .first()
            .map(String::as_str)
            .unwrap_or("Unknown Artist")
    }

    /// Whether `artist` is among this track's artists, ignoring case.
    pub fn has_artist(&self, artist: &str) -> bool {
        let wanted = artist.to_lowercase();
        self.artists.iter().any(|a| a.to_lowercase() == wanted)
    }

    /// Query string used when looking this track up on another service.
    pub fn search_query(&self) -> String {
        format!("{} {}", self.name, self.artists.join(" "))
    }
}

/// Album metadata and its ordered member tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbumDescriptor {
    pub name: String,
    pub artist: String,
    pub artist_id: String,
    pub release_year: Option<i32>,
    pub duration: Option<u32>,
    pub explicit: Option<bool>,
    /// Quality label shown in folder names, e.g. `24bit 96kHz`
    pub quality: Option<String>,
    pub upc: Option<String>,
    pub cover_url: Option<String>,
    pub cover_type: ImageFileType,
    pub animated_cover_url: Option<String>,
    pub booklet_url: Option<String>,
    pub description: Option<String>,
    /// Cover shared by every track, when the service provides one
    pub all_track_cover_url: Option<String>,
    pub tracks: Vec<String>,
    pub track_extra: ExtraParams,
}

/// Playlist metadata and its ordered member tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistDescriptor {
    pub name: String,
    pub creator: String,
    pub creator_id: String,
    pub release_year: Option<i32>,
    pub duration: Option<u32>,
    pub explicit: Option<bool>,
    pub cover_url: Option<String>,
    pub cover_type: ImageFileType,
    pub animated_cover_url: Option<String>,
    pub description: Option<String>,
    pub tracks: Vec<String>,
    pub track_extra: ExtraParams,
}

/// Artist discography.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtistDescriptor {
    pub name: String,
    pub albums: Vec<String>,
    /// Tracks not belonging to any listed album
    pub tracks: Vec<String>,
    pub album_extra: ExtraParams,
    pub track_extra: ExtraParams,
}

/// One hit from a service search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    #[serde(default)]
    pub extra: ExtraParams,
}

/// Where the media payload of a track can be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadSource {
    /// Remote file to fetch with the given request headers
    Url {
        url: String,
        headers: HashMap<String, String>,
    },
    /// Already materialized local temporary file, moved into place
    TempFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub source: DownloadSource,
    /// Actual codec when it differs from the one in the track descriptor
    pub different_codec: Option<Codec>,
}

/// The kind of catalog entity a run downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadMode {
    Track,
    Album,
    Playlist,
    Artist,
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadMode::Track => f.write_str("track"),
            DownloadMode::Album => f.write_str("album"),
            DownloadMode::Playlist => f.write_str("playlist"),
            DownloadMode::Artist => f.write_str("artist"),
        }
    }
}
