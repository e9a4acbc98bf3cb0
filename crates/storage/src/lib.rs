//! Storage Layer
//!
//! Batched persistence of vehicle snapshots behind the [`SnapshotStore`]
//! repository trait, with SQLite and in-memory backends.

mod repository;
mod sqlite;

pub use repository::MemoryRepository;
pub use sqlite::SqliteRepository;

use gtfs_feed::VehicleSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No batch is open")]
    NoOpenBatch,
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

/// Batched snapshot sink.
///
/// Only the consumer thread touches a store, so implementations take
/// `&mut self` and need no internal locking for the write path.
pub trait SnapshotStore: Send {
    /// Start a new batch. Opening while a batch is already open keeps the
    /// existing one.
    fn open_batch(&mut self) -> Result<(), StorageError>;

    /// Add one snapshot to the open batch
    fn write(&mut self, snapshot: &VehicleSnapshot) -> Result<(), StorageError>;

    /// Make the open batch durable, returning how many records it held
    fn commit_batch(&mut self) -> Result<usize, StorageError>;
}

/// A persisted vehicle position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPosition {
    pub recorded_at_ms: i64,
    pub fleet_number: String,
    pub internal_id: String,
    pub route_id: String,
    pub lat: f64,
    pub lon: f64,
}

impl StoredPosition {
    /// Stamp a snapshot with the current wall-clock time
    pub fn from_snapshot(snapshot: &VehicleSnapshot) -> Self {
        Self {
            recorded_at_ms: now_ms(),
            fleet_number: snapshot.fleet_number.to_string(),
            internal_id: snapshot.internal_id.to_string(),
            route_id: snapshot.route_id.to_string(),
            lat: f64::from(snapshot.lat),
            lon: f64::from(snapshot.lon),
        }
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
