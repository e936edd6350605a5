//! Byte transport for track payloads and assets.
//!
//! Every fetch streams into a temporary file next to the destination and is
//! only renamed into place once complete. Fetches race against Ctrl-C: on
//! interrupt the future is dropped, which deletes the partial temp file, and
//! [`FetchError::Interrupted`] is returned.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// User agent sent with every request
const USER_AGENT: &str = concat!("music-courier/", env!("CARGO_PKG_VERSION"));

/// Errors raised while fetching a resource.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Interrupted by user")]
    Interrupted,
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Something that can materialize a URL into a local file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into `dest`, replacing any existing file.
    async fn fetch_to(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest: &Path,
    ) -> Result<(), FetchError>;
}

/// Fetch into a fresh temporary file that is deleted when dropped.
///
/// `suffix` is appended to the temp file name (e.g. `.jpg`) so tools that
/// sniff extensions keep working.
pub async fn fetch_to_temp(
    fetcher: &dyn Fetcher,
    url: &str,
    suffix: &str,
) -> Result<TempPath, FetchError> {
    let temp_dir = std::env::temp_dir();
    let temp = tempfile::Builder::new()
        .prefix("music-courier-")
        .suffix(suffix)
        .tempfile_in(&temp_dir)
        .map_err(|e| FetchError::io(&temp_dir, e))?
        .into_temp_path();
    fetcher.fetch_to(url, &HashMap::new(), &temp).await?;
    Ok(temp)
}

/// Run `fut` unless the user presses Ctrl-C first.
pub async fn interruptible<T, F>(fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        result = fut => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupt received, discarding partial download");
            Err(FetchError::Interrupted)
        }
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Production fetcher backed by `reqwest`.
///
/// `file://` URLs and bare local paths are copied, which is what the catalog
/// backend hands out.
pub struct HttpFetcher {
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { http_client })
    }

    async fn download(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let mut request = self.http_client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut part = partial_file(dest)?;
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?
        {
            part.write_all(&chunk)
                .map_err(|e| FetchError::io(part.path(), e))?;
            written += chunk.len();
        }
        part.flush().map_err(|e| FetchError::io(part.path(), e))?;

        part.persist(dest)
            .map_err(|e| FetchError::io(dest, e.error))?;
        tracing::debug!("Fetched {} bytes from {} to {:?}", written, url, dest);
        Ok(())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_to(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest: &Path,
    ) -> Result<(), FetchError> {
        match local_source(url) {
            Some(source) => interruptible(copy_local(source, dest)).await,
            None => interruptible(self.download(url, headers, dest)).await,
        }
    }
}

/// A temp file in the destination directory, so the final rename stays on
/// one filesystem.
fn partial_file(dest: &Path) -> Result<tempfile::NamedTempFile, FetchError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| FetchError::io(&dir, e))?;
    tempfile::Builder::new()
        .prefix(".part-")
        .tempfile_in(&dir)
        .map_err(|e| FetchError::io(&dir, e))
}

fn local_source(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        return None;
    }
    Some(PathBuf::from(url))
}

async fn copy_local(source: PathBuf, dest: &Path) -> Result<(), FetchError> {
    let part = partial_file(dest)?.into_temp_path();
    tokio::fs::copy(&source, &part)
        .await
        .map_err(|e| FetchError::io(&source, e))?;
    part.persist(dest).map_err(|e| FetchError::io(dest, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_source_detection() {
        assert_eq!(
            local_source("file:///srv/music/a.flac"),
            Some(PathBuf::from("/srv/music/a.flac"))
        );
        assert_eq!(
            local_source("fixtures/cover.png"),
            Some(PathBuf::from("fixtures/cover.png"))
        );
        assert_eq!(local_source("https://cdn.example.com/a.flac"), None);
    }

    #[tokio::test]
    async fn test_http_fetcher_copies_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.flac");
        std::fs::write(&source, b"payload").unwrap();

        let dest = dir.path().join("out").join("01. Song.flac");
        let fetcher = HttpFetcher::new().unwrap();
        let url = format!("file://{}", source.display());
        fetcher.fetch_to(&url, &HashMap::new(), &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        // No partial files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".part-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch_to(
                &dir.path().join("missing.flac").display().to_string(),
                &HashMap::new(),
                &dir.path().join("dest.flac"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
        assert!(!dir.path().join("dest.flac").exists());
    }

    #[tokio::test]
    async fn test_fetch_to_temp_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cover.jpg");
        std::fs::write(&source, b"jpeg").unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let temp = fetch_to_temp(&fetcher, &source.display().to_string(), ".jpg")
            .await
            .unwrap();
        let temp_path = temp.to_path_buf();
        assert_eq!(std::fs::read(&temp_path).unwrap(), b"jpeg");
        assert!(temp_path.to_string_lossy().ends_with(".jpg"));

        drop(temp);
        assert!(!temp_path.exists());
    }
}
