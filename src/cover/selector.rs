use std::path::Path;

use super::{compare_images, image_resolution};
use crate::fetch::{FetchError, Fetcher, fetch_to_temp};
use crate::model::{CoverCompression, CoverOptions, ImageFileType, SearchResult};
use crate::service::MusicService;

/// A candidate close enough to the reference image.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverMatch {
    /// Position in the candidate list
    pub index: usize,
    pub rms: f64,
}

/// Scans cover candidates from a covers module against a reference image.
pub struct CoverSelector<'a> {
    fetcher: &'a dyn Fetcher,
    threshold: f64,
}

impl<'a> CoverSelector<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, threshold: f64) -> Self {
        Self { fetcher, threshold }
    }

    /// Return the first candidate whose cover is within the RMS threshold.
    ///
    /// Candidate covers are requested at the reference's resolution so the
    /// comparison is like for like. Repeated URLs are only tested once. Only
    /// an interrupt is returned as an error; anything else skips the
    /// candidate.
    pub async fn find_match(
        &self,
        module: &dyn MusicService,
        reference: &Path,
        candidates: &[SearchResult],
    ) -> Result<Option<CoverMatch>, FetchError> {
        let resolution = match image_resolution(reference) {
            Ok((width, _)) => width,
            Err(e) => {
                tracing::warn!("Reference cover unreadable, skipping comparison: {}", e);
                return Ok(None);
            }
        };
        let test_options = CoverOptions {
            file_type: ImageFileType::Jpg,
            resolution,
            compression: CoverCompression::High,
        };

        tracing::info!("Covers to test: {}", candidates.len());
        let mut attempted: Vec<String> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let info = match module
                .get_track_cover(&candidate.id, &test_options, &candidate.extra)
                .await
            {
                Ok(info) => info,
                Err(e) => {
                    tracing::debug!("No test cover for candidate {}: {}", candidate.id, e);
                    continue;
                }
            };
            if attempted.contains(&info.url) {
                continue;
            }
            attempted.push(info.url.clone());

            let test_image = match fetch_to_temp(self.fetcher, &info.url, ".img").await {
                Ok(path) => path,
                Err(FetchError::Interrupted) => return Err(FetchError::Interrupted),
                Err(e) => {
                    tracing::warn!("Failed to fetch test cover {}: {}", info.url, e);
                    continue;
                }
            };
            let rms = match compare_images(reference, &test_image) {
                Ok(rms) => rms,
                Err(e) => {
                    tracing::warn!("Failed to compare cover {}: {}", info.url, e);
                    continue;
                }
            };

            tracing::info!("Attempt {} RMS: {:.2}", index + 1, rms);
            if rms < self.threshold {
                tracing::info!("Match found below threshold {}", self.threshold);
                return Ok(Some(CoverMatch { index, rms }));
            }
        }

        tracing::info!("Covers module could not find a matching cover, using fallback");
        Ok(None)
    }
}
