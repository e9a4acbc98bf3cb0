//! HTTP Feed Client
//!
//! Fetches the raw GTFS-realtime payload. No retries happen here; retry and
//! backoff policy belongs to the caller.

use crate::error::FetchError;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for a single feed request
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default feed location (Hamilton Street Railway vehicle positions)
pub const DEFAULT_FEED_URL: &str = "https://opendata.hamilton.ca/GTFS-RT/GTFS_VehiclePositions.pb";

/// Source of raw feed bytes
pub trait FeedSource: Send {
    /// Fetch one payload
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP client for a GTFS-realtime endpoint
pub struct HttpFeedClient {
    /// Feed URL
    url: String,
    /// Request timeout
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl HttpFeedClient {
    /// Create a new feed client with the default timeout
    pub fn new(url: &str) -> Result<Self, FetchError> {
        Self::with_timeout(url, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    /// Create a new feed client with a custom request timeout
    ///
    /// Must not be called from inside an async runtime; the blocking client
    /// runs its own.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, FetchError> {
        info!("Creating feed client for {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("transit-ingest/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::ClientSetup(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            timeout,
            client,
        })
    }
}

impl FeedSource for HttpFeedClient {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching {}", self.url);

        let response = self.client.get(&self.url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout.as_millis() as u64)
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .map_err(|e| FetchError::Body(e.to_string()))?;

        debug!("Downloaded {} bytes", body.len());
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one canned HTTP response on a local port
    fn serve_once(
        status_line: &'static str,
        body: &'static [u8],
    ) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/feed.pb", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let header = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(body).unwrap();
        });

        (url, handle)
    }

    #[test]
    fn test_fetch_success() {
        let (url, server) = serve_once("200 OK", b"\x0a\x05\x0a\x032.0");
        let mut client = HttpFeedClient::new(&url).unwrap();

        let bytes = client.fetch().unwrap();
        assert_eq!(bytes, b"\x0a\x05\x0a\x032.0");
        server.join().unwrap();
    }

    #[test]
    fn test_fetch_http_error_status() {
        let (url, server) = serve_once("503 Service Unavailable", b"");
        let mut client = HttpFeedClient::new(&url).unwrap();

        assert!(matches!(client.fetch(), Err(FetchError::Status(503))));
        server.join().unwrap();
    }

    #[test]
    fn test_fetch_connection_refused() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        // Listener dropped above; nothing accepts on this port any more
        let url = format!("http://{}/", addr);
        let mut client = HttpFeedClient::with_timeout(&url, Duration::from_secs(2)).unwrap();

        assert!(matches!(
            client.fetch(),
            Err(FetchError::Transport(_)) | Err(FetchError::Timeout(_))
        ));
    }
}
