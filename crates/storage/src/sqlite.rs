//! SQLite Repository
//!
//! `sqlx` is async; the repository owns a current-thread runtime and drives
//! every query with `block_on` from the (synchronous) consumer thread. It must
//! not be used or dropped from inside another async runtime.

use crate::{SnapshotStore, StorageError, StoredPosition};
use gtfs_feed::VehicleSnapshot;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS vehicle_positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at_ms INTEGER NOT NULL,
    fleet_number TEXT NOT NULL,
    internal_id TEXT NOT NULL,
    route_id TEXT NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL
)";

const CREATE_ROUTE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_vehicle_positions_route
    ON vehicle_positions (route_id, recorded_at_ms)";

const INSERT_POSITION: &str = "INSERT INTO vehicle_positions
    (recorded_at_ms, fleet_number, internal_id, route_id, lat, lon)
    VALUES (?, ?, ?, ?, ?, ?)";

/// SQLite-backed snapshot store
pub struct SqliteRepository {
    runtime: Runtime,
    pool: SqlitePool,
    /// Open transaction, if any
    batch: Option<Transaction<'static, Sqlite>>,
    /// Records written to the open transaction
    pending: usize,
}

impl SqliteRepository {
    /// Open (creating if missing) a database file in WAL mode
    pub fn open(path: &str) -> Result<Self, StorageError> {
        info!("Opening SQLite store at {}", path);
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        Self::connect(options)
    }

    /// Open a private in-memory database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options)
    }

    fn connect(options: SqliteConnectOptions) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Runtime(e.to_string()))?;

        // Single connection: one writer, and an in-memory database lives
        // exactly as long as its connection.
        let pool = runtime.block_on(
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options),
        )?;

        runtime.block_on(async {
            sqlx::query(CREATE_TABLE).execute(&pool).await?;
            sqlx::query(CREATE_ROUTE_INDEX).execute(&pool).await?;
            Ok::<_, sqlx::Error>(())
        })?;

        debug!("SQLite schema ready");
        Ok(Self {
            runtime,
            pool,
            batch: None,
            pending: 0,
        })
    }

    /// Total stored positions.
    ///
    /// Reads share the single connection with the write path, so call this
    /// only while no batch is open.
    pub fn count(&self) -> Result<i64, StorageError> {
        let count = self.runtime.block_on(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM vehicle_positions")
                .fetch_one(&self.pool),
        )?;
        Ok(count)
    }

    /// Get recent positions, most recent first
    pub fn recent(&self, limit: i64) -> Result<Vec<StoredPosition>, StorageError> {
        let rows = self.runtime.block_on(
            sqlx::query(
                "SELECT recorded_at_ms, fleet_number, internal_id, route_id, lat, lon
                 FROM vehicle_positions ORDER BY id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool),
        )?;

        rows.iter()
            .map(|row| -> Result<StoredPosition, StorageError> {
                Ok(StoredPosition {
                    recorded_at_ms: row.try_get("recorded_at_ms")?,
                    fleet_number: row.try_get("fleet_number")?,
                    internal_id: row.try_get("internal_id")?,
                    route_id: row.try_get("route_id")?,
                    lat: row.try_get("lat")?,
                    lon: row.try_get("lon")?,
                })
            })
            .collect()
    }
}

impl SnapshotStore for SqliteRepository {
    fn open_batch(&mut self) -> Result<(), StorageError> {
        if self.batch.is_none() {
            let tx = self.runtime.block_on(self.pool.begin())?;
            self.batch = Some(tx);
            self.pending = 0;
        }
        Ok(())
    }

    fn write(&mut self, snapshot: &VehicleSnapshot) -> Result<(), StorageError> {
        let tx = self.batch.as_mut().ok_or(StorageError::NoOpenBatch)?;
        let record = StoredPosition::from_snapshot(snapshot);

        self.runtime.block_on(
            sqlx::query(INSERT_POSITION)
                .bind(record.recorded_at_ms)
                .bind(record.fleet_number.as_str())
                .bind(record.internal_id.as_str())
                .bind(record.route_id.as_str())
                .bind(record.lat)
                .bind(record.lon)
                .execute(&mut **tx),
        )?;

        self.pending += 1;
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<usize, StorageError> {
        let tx = self.batch.take().ok_or(StorageError::NoOpenBatch)?;
        let size = std::mem::take(&mut self.pending);

        self.runtime.block_on(tx.commit())?;
        debug!("Committed batch of {} positions", size);
        Ok(size)
    }
}

impl Drop for SqliteRepository {
    fn drop(&mut self) {
        // Returning a connection to the pool spawns onto the runtime, so the
        // open transaction is released inside it.
        let batch = self.batch.take();
        let pending = self.pending;
        let pool = self.pool.clone();
        self.runtime.block_on(async move {
            if batch.is_some() && pending > 0 {
                warn!("Rolling back uncommitted batch of {} positions", pending);
            }
            drop(batch);
            pool.close().await;
        });
    }
}
