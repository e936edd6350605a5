//! Music service backends.
//!
//! A backend implements [`MusicService`] and advertises what it can do through
//! [`Capabilities`]. Optional operations have default implementations that
//! return [`ServiceError::Unsupported`], so a lyrics-only provider only has to
//! implement the calls it actually serves.
//!
//! Backends are collected in a closed [`ServiceRegistry`] built once at
//! startup; orchestrators look services up by name.

pub mod catalog;

use async_trait::async_trait;
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::model::{
    AlbumDescriptor, ArtistDescriptor, CodecOptions, CoverInfo, CoverOptions, Credit,
    DownloadMode, DownloadResult, ExtraParams, LyricsInfo, PlaylistDescriptor, QualityTier,
    SearchResult, TrackDescriptor,
};

pub use catalog::CatalogService;

bitflags! {
    /// Operations a service supports beyond track metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Track payloads can be downloaded
        const DOWNLOAD = 1 << 0;
        /// Playlists can be listed
        const PLAYLIST = 1 << 1;
        /// Track covers can be requested at arbitrary options
        const COVERS = 1 << 2;
        const LYRICS = 1 << 3;
        const CREDITS = 1 << 4;
        /// Artist albums can be listed page by page
        const ARTIST_PAGING = 1 << 5;
        /// Covers come at their native size and must be resized locally
        const NEEDS_COVER_RESIZE = 1 << 6;
    }
}

/// Errors returned by service backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} does not support {operation}")]
    Unsupported {
        service: String,
        operation: &'static str,
    },

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("API error: {0}")]
    Api(String),
}

impl ServiceError {
    pub fn unsupported(service: &str, operation: &'static str) -> Self {
        Self::Unsupported {
            service: service.to_string(),
            operation,
        }
    }
}

/// A music catalog backend.
#[async_trait]
pub trait MusicService: Send + Sync {
    /// Registered name, also used for source subdirectories.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Resolve a track at the requested quality.
    ///
    /// Unavailable tracks are reported through [`TrackDescriptor::error`]
    /// rather than an `Err`.
    async fn get_track_info(
        &self,
        track_id: &str,
        quality: &QualityTier,
        codecs: &CodecOptions,
        extra: &ExtraParams,
    ) -> Result<TrackDescriptor, ServiceError>;

    async fn get_album_info(
        &self,
        album_id: &str,
        extra: &ExtraParams,
    ) -> Result<AlbumDescriptor, ServiceError> {
        let _ = (album_id, extra);
        Err(ServiceError::unsupported(self.name(), "albums"))
    }

    async fn get_playlist_info(
        &self,
        playlist_id: &str,
        extra: &ExtraParams,
    ) -> Result<PlaylistDescriptor, ServiceError> {
        let _ = (playlist_id, extra);
        Err(ServiceError::unsupported(self.name(), "playlists"))
    }

    /// Artist discography; `credited` includes albums the artist appears on.
    async fn get_artist_info(
        &self,
        artist_id: &str,
        credited: bool,
        extra: &ExtraParams,
    ) -> Result<ArtistDescriptor, ServiceError> {
        let _ = (artist_id, credited, extra);
        Err(ServiceError::unsupported(self.name(), "artists"))
    }

    /// One page of an artist's album ids.
    ///
    /// Services without [`Capabilities::ARTIST_PAGING`] slice the full
    /// discography.
    async fn get_artist_album_ids(
        &self,
        artist_id: &str,
        start: usize,
        limit: usize,
        credited: bool,
    ) -> Result<Vec<String>, ServiceError> {
        let artist = self
            .get_artist_info(artist_id, credited, &ExtraParams::new())
            .await?;
        Ok(artist
            .albums
            .into_iter()
            .skip(start)
            .take(limit)
            .collect())
    }

    async fn get_track_download(
        &self,
        track_id: &str,
        extra: &ExtraParams,
    ) -> Result<DownloadResult, ServiceError> {
        let _ = (track_id, extra);
        Err(ServiceError::unsupported(self.name(), "downloads"))
    }

    async fn get_track_cover(
        &self,
        track_id: &str,
        options: &CoverOptions,
        extra: &ExtraParams,
    ) -> Result<CoverInfo, ServiceError> {
        let _ = (track_id, options, extra);
        Err(ServiceError::unsupported(self.name(), "covers"))
    }

    async fn get_track_lyrics(
        &self,
        track_id: &str,
        extra: &ExtraParams,
    ) -> Result<LyricsInfo, ServiceError> {
        let _ = (track_id, extra);
        Err(ServiceError::unsupported(self.name(), "lyrics"))
    }

    async fn get_track_credits(
        &self,
        track_id: &str,
        extra: &ExtraParams,
    ) -> Result<Vec<Credit>, ServiceError> {
        let _ = (track_id, extra);
        Err(ServiceError::unsupported(self.name(), "credits"))
    }

    /// Search for `query`; `track` carries the original descriptor when
    /// matching a track found on another service.
    async fn search(
        &self,
        mode: DownloadMode,
        query: &str,
        track: Option<&TrackDescriptor>,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ServiceError> {
        let _ = (mode, query, track, limit);
        Err(ServiceError::unsupported(self.name(), "search"))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Name-keyed set of available services.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<dyn MusicService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the catalogs listed in the config.
    ///
    /// Catalogs that fail to load are logged and left out.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, path) in &config.catalogs {
            match CatalogService::load(name, path) {
                Ok(service) => registry.register(Arc::new(service)),
                Err(e) => tracing::error!("Failed to load catalog {} from {:?}: {}", name, path, e),
            }
        }
        registry
    }

    pub fn register(&mut self, service: Arc<dyn MusicService>) {
        tracing::debug!(
            "Registered service {} ({:?})",
            service.name(),
            service.capabilities()
        );
        self.services.insert(service.name().to_string(), service);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn MusicService>, ServiceError> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownService(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::MockService;
    use super::*;

    /// Service implementing only the required calls
    struct TrackOnly;

    #[async_trait]
    impl MusicService for TrackOnly {
        fn name(&self) -> &str {
            "track-only"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }

        async fn get_track_info(
            &self,
            _track_id: &str,
            _quality: &QualityTier,
            _codecs: &CodecOptions,
            _extra: &ExtraParams,
        ) -> Result<TrackDescriptor, ServiceError> {
            Ok(TrackDescriptor::default())
        }
    }

    #[tokio::test]
    async fn test_optional_operations_default_to_unsupported() {
        let service = TrackOnly;
        let err = service
            .get_track_lyrics("1", &ExtraParams::new())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::unsupported("track-only", "lyrics"));
        assert!(err.to_string().contains("track-only does not support lyrics"));

        let err = service
            .get_artist_album_ids("a", 0, 50, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_default_album_paging_slices_discography() {
        struct Discography;

        #[async_trait]
        impl MusicService for Discography {
            fn name(&self) -> &str {
                "disco"
            }

            fn capabilities(&self) -> Capabilities {
                Capabilities::empty()
            }

            async fn get_track_info(
                &self,
                _track_id: &str,
                _quality: &QualityTier,
                _codecs: &CodecOptions,
                _extra: &ExtraParams,
            ) -> Result<TrackDescriptor, ServiceError> {
                Ok(TrackDescriptor::default())
            }

            async fn get_artist_info(
                &self,
                _artist_id: &str,
                _credited: bool,
                _extra: &ExtraParams,
            ) -> Result<ArtistDescriptor, ServiceError> {
                Ok(ArtistDescriptor {
                    albums: (0..7).map(|i| format!("al{i}")).collect(),
                    ..Default::default()
                })
            }
        }

        let page = Discography
            .get_artist_album_ids("a", 5, 50, false)
            .await
            .unwrap();
        assert_eq!(page, vec!["al5".to_string(), "al6".to_string()]);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ServiceRegistry::new();
        registry.register(Arc::new(MockService::new("alpha")));
        registry.register(Arc::new(MockService::new("beta")));

        assert_eq!(registry.get("beta").unwrap().name(), "beta");
        assert_eq!(
            registry.get("gamma").err(),
            Some(ServiceError::UnknownService("gamma".to_string()))
        );
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_capabilities() {
        let caps = Capabilities::DOWNLOAD | Capabilities::LYRICS;
        assert!(caps.contains(Capabilities::LYRICS));
        assert!(!caps.contains(Capabilities::PLAYLIST));
    }
}
