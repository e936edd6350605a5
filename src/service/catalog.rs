//! File-backed catalog service.
//!
//! Serves a JSON document describing tracks, albums, playlists and artists,
//! with each track pointing at a local (or remote) media file. Useful for
//! mirroring an existing collection and for running the pipeline offline.
//!
//! ```json
//! {
//!   "tracks": {
//!     "t1": { "name": "Intro", "artists": ["The XX"], "codec": "FLAC",
//!              "file": "media/intro.flac", "cover": "media/cover.jpg" }
//!   },
//!   "albums": { "a1": { "name": "xx", "artist": "The XX", "tracks": ["t1"] } }
//! }
//! ```
//!
//! Relative file and cover paths are resolved against the catalog's directory.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{Capabilities, MusicService, ServiceError};
use crate::model::{
    AlbumDescriptor, ArtistDescriptor, CodecOptions, CoverInfo, CoverOptions, Credit,
    DownloadMode, DownloadResult, DownloadSource, ExtraParams, ImageFileType, LyricsInfo,
    PlaylistDescriptor, QualityTier, SearchResult, TrackDescriptor,
};

/// A track entry: its descriptor plus where the media lives.
#[derive(Debug, Clone, Deserialize)]
struct CatalogTrack {
    #[serde(flatten)]
    info: TrackDescriptor,
    /// Media file path or URL
    file: Option<String>,
    /// Cover image path or URL
    cover: Option<String>,
    #[serde(default)]
    lyrics: Option<LyricsInfo>,
    #[serde(default)]
    credits: Vec<Credit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CatalogFile {
    tracks: HashMap<String, CatalogTrack>,
    albums: HashMap<String, AlbumDescriptor>,
    playlists: HashMap<String, PlaylistDescriptor>,
    artists: HashMap<String, ArtistDescriptor>,
}

/// Service backed by a JSON catalog file.
pub struct CatalogService {
    name: String,
    root: PathBuf,
    catalog: CatalogFile,
}

impl CatalogService {
    /// Load a catalog from disk.
    pub fn load(name: &str, path: &Path) -> Result<Self, ServiceError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::NotFound(format!("{}: {}", path.display(), e)))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_json(name, &contents, root)
    }

    /// Parse a catalog from JSON; relative paths resolve against `root`.
    pub fn from_json(name: &str, json: &str, root: PathBuf) -> Result<Self, ServiceError> {
        let catalog: CatalogFile =
            serde_json::from_str(json).map_err(|e| ServiceError::Parse(e.to_string()))?;
        tracing::info!(
            "Catalog {}: {} tracks, {} albums, {} playlists, {} artists",
            name,
            catalog.tracks.len(),
            catalog.albums.len(),
            catalog.playlists.len(),
            catalog.artists.len()
        );
        Ok(Self {
            name: name.to_string(),
            root,
            catalog,
        })
    }

    fn track(&self, track_id: &str) -> Result<&CatalogTrack, ServiceError> {
        self.catalog
            .tracks
            .get(track_id)
            .ok_or_else(|| ServiceError::NotFound(format!("track {track_id}")))
    }

    /// Turn a catalog path into something the fetcher understands.
    fn locate(&self, location: &str) -> String {
        if location.contains("://") || Path::new(location).is_absolute() {
            location.to_string()
        } else {
            self.root.join(location).to_string_lossy().into_owned()
        }
    }
}

fn matches_query(haystack: &str, query: &str) -> bool {
    let haystack = haystack.to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .all(|word| haystack.contains(word))
}

#[async_trait]
impl MusicService for CatalogService {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::DOWNLOAD
            | Capabilities::PLAYLIST
            | Capabilities::COVERS
            | Capabilities::LYRICS
            | Capabilities::CREDITS
            | Capabilities::NEEDS_COVER_RESIZE
    }

    async fn get_track_info(
        &self,
        track_id: &str,
        _quality: &QualityTier,
        codecs: &CodecOptions,
        _extra: &ExtraParams,
    ) -> Result<TrackDescriptor, ServiceError> {
        let entry = self.track(track_id)?;
        let mut info = entry.info.clone();

        let data = info.codec.data();
        if info.error.is_none() && data.spatial && !codecs.spatial_codecs {
            info.error = Some(format!("{} is spatial and spatial codecs are disabled", data.pretty_name));
        } else if info.error.is_none() && data.proprietary && !codecs.proprietary_codecs {
            info.error = Some(format!(
                "{} is proprietary and proprietary codecs are disabled",
                data.pretty_name
            ));
        } else if info.error.is_none() && entry.file.is_none() {
            info.error = Some("No media file in catalog".to_string());
        }
        if info.cover_url.is_none() {
            info.cover_url = entry.cover.as_deref().map(|c| self.locate(c));
        }
        Ok(info)
    }

    async fn get_album_info(
        &self,
        album_id: &str,
        _extra: &ExtraParams,
    ) -> Result<AlbumDescriptor, ServiceError> {
        let mut album = self
            .catalog
            .albums
            .get(album_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("album {album_id}")))?;
        album.cover_url = album.cover_url.map(|c| self.locate(&c));
        album.booklet_url = album.booklet_url.map(|b| self.locate(&b));
        album.animated_cover_url = album.animated_cover_url.map(|a| self.locate(&a));
        Ok(album)
    }

    async fn get_playlist_info(
        &self,
        playlist_id: &str,
        _extra: &ExtraParams,
    ) -> Result<PlaylistDescriptor, ServiceError> {
        let mut playlist = self
            .catalog
            .playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("playlist {playlist_id}")))?;
        playlist.cover_url = playlist.cover_url.map(|c| self.locate(&c));
        Ok(playlist)
    }

    async fn get_artist_info(
        &self,
        artist_id: &str,
        _credited: bool,
        _extra: &ExtraParams,
    ) -> Result<ArtistDescriptor, ServiceError> {
        self.catalog
            .artists
            .get(artist_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("artist {artist_id}")))
    }

    async fn get_track_download(
        &self,
        track_id: &str,
        _extra: &ExtraParams,
    ) -> Result<DownloadResult, ServiceError> {
        let entry = self.track(track_id)?;
        let file = entry
            .file
            .as_deref()
            .ok_or_else(|| ServiceError::NotFound(format!("media for track {track_id}")))?;
        Ok(DownloadResult {
            source: DownloadSource::Url {
                url: self.locate(file),
                headers: HashMap::new(),
            },
            different_codec: None,
        })
    }

    async fn get_track_cover(
        &self,
        track_id: &str,
        _options: &CoverOptions,
        _extra: &ExtraParams,
    ) -> Result<CoverInfo, ServiceError> {
        let entry = self.track(track_id)?;
        let cover = entry
            .cover
            .as_deref()
            .ok_or_else(|| ServiceError::NotFound(format!("cover for track {track_id}")))?;
        let file_type = Path::new(cover)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<ImageFileType>().ok())
            .unwrap_or_default();
        Ok(CoverInfo {
            url: self.locate(cover),
            file_type,
        })
    }

    async fn get_track_lyrics(
        &self,
        track_id: &str,
        _extra: &ExtraParams,
    ) -> Result<LyricsInfo, ServiceError> {
        Ok(self.track(track_id)?.lyrics.clone().unwrap_or_default())
    }

    async fn get_track_credits(
        &self,
        track_id: &str,
        _extra: &ExtraParams,
    ) -> Result<Vec<Credit>, ServiceError> {
        Ok(self.track(track_id)?.credits.clone())
    }

    async fn search(
        &self,
        mode: DownloadMode,
        query: &str,
        _track: Option<&TrackDescriptor>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let mut ids: Vec<&String> = match mode {
            DownloadMode::Track => self
                .catalog
                .tracks
                .iter()
                .filter(|(_, t)| matches_query(&t.info.search_query(), query))
                .map(|(id, _)| id)
                .collect(),
            DownloadMode::Album => self
                .catalog
                .albums
                .iter()
                .filter(|(_, a)| matches_query(&format!("{} {}", a.name, a.artist), query))
                .map(|(id, _)| id)
                .collect(),
            DownloadMode::Playlist => self
                .catalog
                .playlists
                .iter()
                .filter(|(_, p)| matches_query(&p.name, query))
                .map(|(id, _)| id)
                .collect(),
            DownloadMode::Artist => self
                .catalog
                .artists
                .iter()
                .filter(|(_, a)| matches_query(&a.name, query))
                .map(|(id, _)| id)
                .collect(),
        };
        // HashMap order is arbitrary
        ids.sort();

        Ok(ids
            .into_iter()
            .take(limit)
            .map(|id| SearchResult {
                id: id.clone(),
                extra: ExtraParams::new(),
            })
            .collect())
    }
}
