//! Test utilities and fixtures for music-courier tests.
//!
//! In-memory stand-ins for the network, ffmpeg and the tagger, plus a few
//! builders for descriptors and media bytes.
//!
//! # Example
//!
//! ```ignore
//! use music_courier::test_utils::{MockFetcher, sample_track};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let fetcher = MockFetcher::new().with_file("https://covers/1", solid_png(10, 4, 4));
//!     let track = sample_track("Intro", 1);
//!     // ... test logic
//! }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Config;
use crate::convert::{ConversionFlags, TranscodeFailure, Transcoder};
use crate::downloader::Settings;
use crate::error::{Error, Result};
use crate::fetch::{FetchError, Fetcher};
use crate::metadata::TagWriter;
use crate::model::{Codec, Container, Credit, TagSet, TrackDescriptor};

// ============================================================================
// Fetcher
// ============================================================================

/// Fetcher serving registered bytes.
///
/// `mock://` URLs (what [`MockService`](crate::service::mocks::MockService)
/// hands out for downloads) always succeed and write the URL itself.
/// Anything else that was not registered is a 404.
#[derive(Default)]
pub struct MockFetcher {
    files: HashMap<String, Vec<u8>>,
    interrupt_on: Option<String>,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    /// Behave as if the user pressed Ctrl-C while fetching `url`.
    pub fn interrupt_on(mut self, url: &str) -> Self {
        self.interrupt_on = Some(url.to_string());
        self
    }

    /// Every URL requested so far, failed attempts included.
    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch_to(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        dest: &Path,
    ) -> std::result::Result<(), FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.interrupt_on.as_deref() == Some(url) {
            return Err(FetchError::Interrupted);
        }

        let bytes = match self.files.get(url) {
            Some(bytes) => bytes.clone(),
            None if url.starts_with("mock://") => url.as_bytes().to_vec(),
            None => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(dest, bytes).map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }
}

// ============================================================================
// Transcoder
// ============================================================================

/// Transcoder that copies the input and records the encoders it was asked
/// for.
#[derive(Default)]
pub struct MockTranscoder {
    failures: HashMap<String, String>,
    used: Mutex<Vec<String>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `message` whenever `encoder` is requested.
    pub fn fail_with(mut self, encoder: &str, message: &str) -> Self {
        self.failures
            .insert(encoder.to_string(), message.to_string());
        self
    }

    pub fn encoders_used(&self) -> Vec<String> {
        self.used.lock().unwrap().clone()
    }
}

impl Transcoder for MockTranscoder {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        encoder: &str,
        _flags: &ConversionFlags,
    ) -> std::result::Result<(), TranscodeFailure> {
        self.used.lock().unwrap().push(encoder.to_string());
        if let Some(message) = self.failures.get(encoder) {
            return Err(TranscodeFailure::new(message.clone()));
        }
        std::fs::copy(input, output)
            .map(|_| ())
            .map_err(|e| TranscodeFailure::new(e.to_string()))
    }
}

// ============================================================================
// Tagger
// ============================================================================

/// One call to [`MockTagWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct TagCall {
    pub path: PathBuf,
    pub had_cover: bool,
    pub lyrics: Option<String>,
    pub credits: Vec<Credit>,
    pub container: Container,
}

/// Tagger that records calls instead of touching files.
#[derive(Default)]
pub struct MockTagWriter {
    failing: bool,
    calls: Mutex<Vec<TagCall>>,
}

impl MockTagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write, as a corrupt file would.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<TagCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl TagWriter for MockTagWriter {
    fn write_tags(
        &self,
        path: &Path,
        cover: Option<&Path>,
        _track: &TrackDescriptor,
        credits: &[Credit],
        lyrics: Option<&str>,
        container: Container,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(TagCall {
            path: path.to_path_buf(),
            had_cover: cover.is_some(),
            lyrics: lyrics.map(str::to_string),
            credits: credits.to_vec(),
            container,
        });
        if self.failing {
            return Err(Error::tag_write(path, "unsupported file"));
        }
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A resolved FLAC track by "Test Artist" on "Test Album".
pub fn sample_track(name: &str, track_number: u32) -> TrackDescriptor {
    TrackDescriptor {
        name: name.to_string(),
        album: "Test Album".to_string(),
        album_id: "album-1".to_string(),
        artists: vec!["Test Artist".to_string()],
        artist_id: "artist-1".to_string(),
        release_year: Some(2020),
        duration: Some(180),
        codec: Codec::Flac,
        bitrate: Some(1411),
        bit_depth: Some(16),
        sample_rate: Some(44.1),
        tags: TagSet {
            track_number: Some(track_number),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// PNG bytes of a single-colour grey image.
pub fn solid_png(level: u8, width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([level, level, level]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// A silent 16-bit mono 44.1 kHz WAV file.
pub fn silent_wav(samples: u32) -> Vec<u8> {
    let data_len = samples * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // channels
    bytes.extend_from_slice(&44_100u32.to_le_bytes());
    bytes.extend_from_slice(&(44_100u32 * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);
    bytes
}

/// Default settings downloading into `download_path`.
pub fn test_settings(download_path: &Path) -> Settings {
    let mut config = Config::default();
    config.general.download_path = download_path.to_path_buf();
    Settings::from_config(&config).unwrap()
}
