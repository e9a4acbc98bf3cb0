//! Feed Error Types

use thiserror::Error;

/// Errors that can occur while fetching the raw feed
#[derive(Debug, Error)]
pub enum FetchError {
    /// Client could not be built
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    /// Connection, TLS or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for the feed
    #[error("Timeout fetching feed after {0}ms")]
    Timeout(u64),

    /// Server answered with a non-success status
    #[error("Feed server returned HTTP {0}")]
    Status(u16),

    /// Body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Errors that can occur while decoding a fetched payload
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was empty
    #[error("Empty feed payload")]
    Empty,

    /// Protobuf decoding failed
    #[error("Invalid GTFS-realtime message: {0}")]
    InvalidMessage(#[from] prost::DecodeError),
}
