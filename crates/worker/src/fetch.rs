//! Image retrieval
//!
//! Workers acquire image bytes through the [`ImageFetcher`] trait so the
//! network primitive can be swapped out in tests.

use async_trait::async_trait;
use cocoserve_common::config::FetchConfig;
use cocoserve_common::{CocoError, Result};
use tracing::{debug, warn};

/// Where a job's image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Remote resource retrieved by the worker
    Url(String),

    /// Bytes already resident in the request
    Bytes(Vec<u8>),
}

impl ImageSource {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// Network fetch primitive: URI in, raw bytes out
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Resolve a source to bytes, fetching only when needed
pub async fn acquire(fetcher: &dyn ImageFetcher, source: ImageSource) -> Result<Vec<u8>> {
    match source {
        ImageSource::Bytes(bytes) => Ok(bytes),
        ImageSource::Url(url) => fetcher.fetch(&url).await,
    }
}

/// `reqwest`-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Build a client; certificate verification stays on unless configured off
    pub fn new(config: &FetchConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!("TLS certificate verification disabled for image fetches");
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| CocoError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    fn too_large(&self, url: &str, seen: u64) -> CocoError {
        CocoError::fetch(format!(
            "{}: body of at least {} bytes exceeds limit of {}",
            url, seen, self.max_bytes
        ))
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CocoError::fetch(format!("{}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| CocoError::fetch(format!("{}: {}", url, e)))?;

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(url, len));
            }
        }

        // Content-Length may be absent or wrong; enforce the limit while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CocoError::fetch(format!("{}: {}", url, e)))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(url, (bytes.len() + chunk.len()) as u64));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url, bytes = bytes.len(), "Fetched image");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingFetcher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const CHUNK: usize = 4096;
    const ENDLESS_BODY: usize = 64 * 1024 * 1024;

    /// One chunked response of `ENDLESS_BODY` bytes with no Content-Length.
    /// The counter tracks how much body the peer took before hanging up.
    async fn chunked_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let written = Arc::new(AtomicUsize::new(0));

        let counter = written.clone();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let head = concat!(
                "HTTP/1.1 200 OK\r\n",
                "Content-Type: image/jpeg\r\n",
                "Transfer-Encoding: chunked\r\n\r\n",
            );
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }

            let mut frame = format!("{:x}\r\n", CHUNK).into_bytes();
            frame.extend(std::iter::repeat(0xAB).take(CHUNK));
            frame.extend_from_slice(b"\r\n");

            while counter.load(Ordering::SeqCst) < ENDLESS_BODY {
                if socket.write_all(&frame).await.is_err() {
                    return;
                }
                counter.fetch_add(CHUNK, Ordering::SeqCst);
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        (format!("http://{}/image.jpg", addr), written)
    }

    #[tokio::test]
    async fn test_resident_bytes_skip_fetch() {
        let bytes = acquire(&FailingFetcher, ImageSource::Bytes(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_url_goes_through_fetcher() {
        let source = ImageSource::Url("http://example.invalid/a.jpg".into());
        let result = acquire(&FailingFetcher, source).await;
        assert!(matches!(result, Err(CocoError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_http_fetcher_reports_unreachable_host() {
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();

        // Port 9 on loopback is the discard port; nothing listens in test environments.
        let result = fetcher.fetch("http://127.0.0.1:9/image.jpg").await;

        assert!(matches!(result, Err(CocoError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_http_fetcher_stops_reading_past_limit() {
        let (url, written) = chunked_server().await;
        let fetcher = HttpFetcher::new(&FetchConfig {
            max_bytes: 1024,
            ..FetchConfig::default()
        })
        .unwrap();

        let result = fetcher.fetch(&url).await;

        match result {
            Err(CocoError::Fetch(message)) => assert!(message.contains("exceeds limit of 1024")),
            other => panic!("expected fetch error, got {:?}", other.map(|b| b.len())),
        }

        // Give the server time to notice the closed connection.
        drop(fetcher);
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(written.load(Ordering::SeqCst) < ENDLESS_BODY / 4);
    }

    #[test]
    fn test_describe_source() {
        assert_eq!(ImageSource::Bytes(vec![0; 4]).describe(), "<4 bytes>");
        assert_eq!(ImageSource::Url("http://a/b".into()).describe(), "http://a/b");
    }
}
