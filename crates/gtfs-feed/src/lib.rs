//! GTFS-realtime Feed Access
//!
//! This crate fetches vehicle-position feeds over HTTP and decodes them into
//! fixed-size [`VehicleSnapshot`] values. Fetching and decoding sit behind the
//! [`FeedSource`] and [`FeedDecoder`] traits so the ingest pipeline can run
//! against other sources.

mod client;
mod decoder;
mod error;
mod snapshot;

pub mod proto;

pub use client::{FeedSource, HttpFeedClient, DEFAULT_FEED_URL};
pub use decoder::{FeedDecoder, GtfsRealtimeDecoder};
pub use error::{DecodeError, FetchError};
pub use snapshot::{BoundedId, VehicleSnapshot, MAX_ID_LEN, NOT_AVAILABLE};
