//! In-Memory Repository Implementation

use crate::{SnapshotStore, StorageError, StoredPosition};
use gtfs_feed::VehicleSnapshot;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Default retention cap (about an hour of a mid-size fleet at 30 s polls)
const DEFAULT_MAX_RECORDS: usize = 100_000;

struct Shared {
    /// Committed positions, oldest first
    positions: Mutex<VecDeque<StoredPosition>>,
    /// Size of every committed batch, in commit order
    commits: Mutex<Vec<usize>>,
    /// Max committed records kept
    max_records: usize,
}

/// In-memory repository.
///
/// Clones share committed data but each clone has its own open batch, so a
/// clone kept outside the consumer thread can observe commits as they land.
pub struct MemoryRepository {
    shared: Arc<Shared>,
    /// Open batch, if any
    pending: Option<Vec<StoredPosition>>,
}

impl MemoryRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_MAX_RECORDS)
    }

    /// Create a repository that keeps at most `max_records` committed positions
    pub fn with_retention(max_records: usize) -> Self {
        info!("Creating in-memory repository (retention {})", max_records);
        Self {
            shared: Arc::new(Shared {
                positions: Mutex::new(VecDeque::with_capacity(max_records.min(10_000))),
                commits: Mutex::new(Vec::new()),
                max_records,
            }),
            pending: None,
        }
    }

    /// Get recent positions, most recent first
    pub fn positions(&self, limit: usize) -> Result<Vec<StoredPosition>, StorageError> {
        let log = self.shared.positions.lock().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;

        Ok(log.iter().rev().take(limit).cloned().collect())
    }

    /// Get total committed position count
    pub fn count(&self) -> usize {
        self.shared.positions.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Sizes of all committed batches, in commit order
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.shared
            .commits
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Records written to this handle's open batch but not yet committed
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }

    /// Clear all committed data (for testing)
    pub fn clear(&self) {
        if let Ok(mut log) = self.shared.positions.lock() {
            log.clear();
        }
        if let Ok(mut commits) = self.shared.commits.lock() {
            commits.clear();
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryRepository {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            pending: None,
        }
    }
}

impl SnapshotStore for MemoryRepository {
    fn open_batch(&mut self) -> Result<(), StorageError> {
        if self.pending.is_none() {
            self.pending = Some(Vec::new());
        }
        Ok(())
    }

    fn write(&mut self, snapshot: &VehicleSnapshot) -> Result<(), StorageError> {
        let batch = self.pending.as_mut().ok_or(StorageError::NoOpenBatch)?;
        batch.push(StoredPosition::from_snapshot(snapshot));
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<usize, StorageError> {
        let batch = self.pending.take().ok_or(StorageError::NoOpenBatch)?;
        let size = batch.len();

        let mut log = self.shared.positions.lock().map_err(|e| {
            StorageError::DatabaseError(format!("Lock error: {}", e))
        })?;
        log.extend(batch);

        // Enforce retention
        while log.len() > self.shared.max_records {
            log.pop_front();
        }
        drop(log);

        self.shared
            .commits
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?
            .push(size);

        debug!("Committed batch of {} positions", size);
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(fleet: &str, route: &str) -> VehicleSnapshot {
        VehicleSnapshot::new(fleet, "id", route, 43.25, -79.87)
    }

    #[test]
    fn test_commit_and_retrieve() {
        let mut repo = MemoryRepository::new();

        repo.open_batch().unwrap();
        repo.write(&snapshot("1201", "10")).unwrap();
        repo.write(&snapshot("1202", "20")).unwrap();
        assert_eq!(repo.count(), 0);

        assert_eq!(repo.commit_batch().unwrap(), 2);

        let positions = repo.positions(10).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].fleet_number, "1202"); // Most recent
        assert_eq!(repo.commit_sizes(), vec![2]);
    }

    #[test]
    fn test_write_requires_open_batch() {
        let mut repo = MemoryRepository::new();
        assert!(matches!(
            repo.write(&snapshot("1", "1")),
            Err(StorageError::NoOpenBatch)
        ));
        assert!(matches!(repo.commit_batch(), Err(StorageError::NoOpenBatch)));
    }

    #[test]
    fn test_clone_observes_commits() {
        let mut repo = MemoryRepository::new();
        let observer = repo.clone();

        repo.open_batch().unwrap();
        repo.write(&snapshot("1", "1")).unwrap();
        assert_eq!(observer.count(), 0);
        assert_eq!(observer.pending_len(), 0);

        repo.commit_batch().unwrap();
        assert_eq!(observer.count(), 1);
    }

    #[test]
    fn test_retention_limit() {
        let mut repo = MemoryRepository::with_retention(5);

        repo.open_batch().unwrap();
        for i in 0..10 {
            repo.write(&snapshot(&i.to_string(), "1")).unwrap();
        }
        repo.commit_batch().unwrap();

        assert_eq!(repo.count(), 5);
        assert_eq!(repo.positions(1).unwrap()[0].fleet_number, "9");
    }
}
