//! Source fetching.
//!
//! A source location is either an `http(s)://` URL or a local file path.
//! Fetched bytes are decoded as UTF-8 (BOM aware, lossy).

use std::path::PathBuf;
use std::time::Duration;

use iptv_rank_protocol::{decode_canonical_order, decode_channel_list, CanonicalOrder, ChannelCandidates};
use log::{debug, info, warn};
use thiserror::Error;

#[cfg(feature = "http")]
use reqwest::Client;

/// User agent sent with HTTP requests.
#[cfg(feature = "http")]
const USER_AGENT: &str = concat!("iptv-rank/", env!("CARGO_PKG_VERSION"));

/// Source fetch errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// HTTP location given but the `http` feature is disabled.
    #[cfg(not(feature = "http"))]
    #[error("HTTP support is disabled, cannot fetch {0}")]
    HttpDisabled(String),

    /// Local file could not be read.
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every channel source failed.
    #[error("None of the {0} source(s) could be fetched")]
    AllSourcesFailed(usize),
}

/// Fetches channel lists and the canonical order.
pub struct SourceFetcher {
    #[cfg(feature = "http")]
    client: Client,
}

impl SourceFetcher {
    /// Create a fetcher whose HTTP requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        #[cfg(feature = "http")]
        let fetcher = Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()?,
        };

        #[cfg(not(feature = "http"))]
        let fetcher = {
            let _ = timeout;
            Self {}
        };

        Ok(fetcher)
    }

    /// Fetch one location as text.
    pub async fn fetch_text(&self, location: &str) -> Result<String, SourceError> {
        let bytes = if is_http(location) {
            self.fetch_http(location).await?
        } else {
            tokio::fs::read(location)
                .await
                .map_err(|source| SourceError::Io {
                    path: PathBuf::from(location),
                    source,
                })?
        };
        Ok(decode_text(location, &bytes))
    }

    #[cfg(feature = "http")]
    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    #[cfg(not(feature = "http"))]
    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        Err(SourceError::HttpDisabled(url.to_string()))
    }

    /// Fetch and merge every channel source, in order.
    ///
    /// A failing source is logged and skipped. Only when all of them fail
    /// is an error returned.
    pub async fn fetch_channel_candidates(
        &self,
        sources: &[String],
    ) -> Result<ChannelCandidates, SourceError> {
        let mut candidates = ChannelCandidates::new();
        let mut fetched = 0;

        for source in sources {
            let text = match self.fetch_text(source).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to fetch source {}: {}", source, e);
                    continue;
                }
            };
            fetched += 1;

            let decoded = decode_channel_list(&text);
            for rejected in &decoded.rejected {
                debug!("{}: skipped {}", source, rejected);
            }
            info!(
                "Fetched {}: {} entr{}, {} malformed line(s)",
                source,
                decoded.entries.len(),
                if decoded.entries.len() == 1 { "y" } else { "ies" },
                decoded.rejected.len()
            );
            candidates.extend(decoded.entries);
        }

        if fetched == 0 && !sources.is_empty() {
            return Err(SourceError::AllSourcesFailed(sources.len()));
        }

        Ok(candidates)
    }

    /// Fetch the canonical channel order.
    pub async fn fetch_canonical_order(&self, location: &str) -> Result<CanonicalOrder, SourceError> {
        let text = self.fetch_text(location).await?;
        let order = decode_canonical_order(&text);
        info!("Fetched canonical order {}: {} channel(s)", location, order.len());
        Ok(order)
    }
}

fn is_http(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Decode source bytes, honouring a byte order mark.
pub fn decode_text(location: &str, bytes: &[u8]) -> String {
    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if had_errors {
        warn!(
            "{}: invalid {} sequences replaced",
            location,
            encoding.name()
        );
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("iptv-rank-{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_is_http() {
        assert!(is_http("https://raw.githubusercontent.com/x/y.txt"));
        assert!(is_http("HTTP://a/b"));
        assert!(!is_http("/tmp/list.txt"));
        assert!(!is_http("sources/list.txt"));
    }

    #[test]
    fn test_decode_text_strips_bom() {
        let bytes = b"\xEF\xBB\xBFCCTV1,http://a/1";
        assert_eq!(decode_text("x", bytes), "CCTV1,http://a/1");
    }

    #[test]
    fn test_decode_text_lossy() {
        let bytes = b"CCTV1,http://a/\xFF";
        assert_eq!(decode_text("x", bytes), "CCTV1,http://a/\u{FFFD}");
    }

    #[tokio::test]
    async fn test_fetch_local_sources_merge() {
        let first = temp_file("first.txt", "央视频道,#genre#\nCCTV1,http://a/1\n".as_bytes());
        let second = temp_file("second.txt", b"CCTV1,http://a/2\nbad line\nCCTV2,http://b/1\n");
        let fetcher = SourceFetcher::new(Duration::from_secs(5)).unwrap();

        let sources = vec![
            first.to_string_lossy().to_string(),
            "/nonexistent/iptv-rank/source.txt".to_string(),
            second.to_string_lossy().to_string(),
        ];
        let candidates = fetcher.fetch_channel_candidates(&sources).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates.get("CCTV1").unwrap(), ["http://a/1", "http://a/2"]);

        std::fs::remove_file(first).unwrap();
        std::fs::remove_file(second).unwrap();
    }

    #[tokio::test]
    async fn test_all_sources_failing() {
        let fetcher = SourceFetcher::new(Duration::from_secs(5)).unwrap();
        let sources = vec!["/nonexistent/a.txt".to_string(), "/nonexistent/b.txt".to_string()];

        let err = fetcher.fetch_channel_candidates(&sources).await.unwrap_err();
        assert!(matches!(err, SourceError::AllSourcesFailed(2)));
    }

    #[tokio::test]
    async fn test_fetch_canonical_order() {
        let path = temp_file("order.txt", b"CCTV2\nCCTV1\n");
        let fetcher = SourceFetcher::new(Duration::from_secs(5)).unwrap();

        let order = fetcher
            .fetch_canonical_order(&path.to_string_lossy())
            .await
            .unwrap();
        let names: Vec<_> = order.iter().cloned().collect();
        assert_eq!(names, vec!["CCTV2", "CCTV1"]);

        std::fs::remove_file(path).unwrap();
    }

    #[cfg(not(feature = "http"))]
    #[tokio::test]
    async fn test_http_location_without_http_support() {
        let fetcher = SourceFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch_text("http://a/list.txt").await.unwrap_err();
        assert!(matches!(err, SourceError::HttpDisabled(url) if url == "http://a/list.txt"));
    }
}
