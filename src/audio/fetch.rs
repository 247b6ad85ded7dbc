//! Source byte retrieval for the playback sinks.
//!
//! Resolved URLs are either plain filesystem paths, `file://` URLs from the
//! local library, or `http(s)` URLs from a remote source. Everything is
//! pulled fully into memory; the decoder needs the whole stream anyway.

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> SourceFetcher {
        SourceFetcher {
            client: reqwest::Client::new(),
        }
    }

    /// Fetch the bytes behind `url` along with a container extension hint.
    pub async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let hint = extension_hint(url);
        if let Some(path) = url.strip_prefix("file://") {
            let bytes = tokio::fs::read(path).await?;
            debug!("Read {} bytes from {path}", bytes.len());
            return Ok((bytes, hint));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            let bytes = self.fetch_http(url).await?;
            return Ok((bytes, hint));
        }
        // Anything else is treated as a local path.
        let bytes = tokio::fs::read(url).await?;
        debug!("Read {} bytes from {url}", bytes.len());
        Ok((bytes, hint))
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Media(format!("fetch failed: {e}")))?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::TooManyRequests(url.to_string()));
            }
            StatusCode::NOT_FOUND => return Err(Error::NotFound(url.to_string())),
            status => {
                return Err(Error::Media(format!("fetch {url}: status {status}")));
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Media(format!("fetch body failed: {e}")))?;
        debug!("Fetched {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}

impl Default for SourceFetcher {
    fn default() -> Self {
        SourceFetcher::new()
    }
}

/// File extension from the final path segment, ignoring any query string.
fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hints() {
        assert_eq!(extension_hint("/music/a.flac"), Some("flac".to_string()));
        assert_eq!(
            extension_hint("https://cdn.example.com/t/42.mp3?sig=abc"),
            Some("mp3".to_string())
        );
        assert_eq!(extension_hint("file:///music/track.OGG"), Some("ogg".to_string()));
        assert_eq!(extension_hint("https://cdn.example.com/stream"), None);
        assert_eq!(extension_hint("/music/.hidden"), None);
    }

    #[tokio::test]
    async fn test_reads_local_files_with_and_without_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, b"RIFFdata").unwrap();
        let fetcher = SourceFetcher::new();

        let (bytes, hint) = fetcher.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"RIFFdata");
        assert_eq!(hint.as_deref(), Some("wav"));

        let url = format!("file://{}", path.display());
        let (bytes, _) = fetcher.fetch(&url).await.unwrap();
        assert_eq!(bytes, b"RIFFdata");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let fetcher = SourceFetcher::new();
        let err = fetcher.fetch("/no/such/file.flac").await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
