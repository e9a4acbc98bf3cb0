//! GTFS-realtime Decoder

use crate::error::DecodeError;
use crate::proto::{FeedEntity, FeedMessage};
use crate::snapshot::{VehicleSnapshot, NOT_AVAILABLE};
use prost::Message;
use tracing::debug;

/// Turns a raw payload into vehicle snapshots
pub trait FeedDecoder: Send {
    /// Decode one payload. Snapshots are returned as-is, including ones
    /// without a usable position; filtering is the caller's job.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<VehicleSnapshot>, DecodeError>;
}

/// Decoder for `transit_realtime.FeedMessage` payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct GtfsRealtimeDecoder;

impl GtfsRealtimeDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Extract a snapshot from an entity carrying a vehicle position
    fn snapshot_from_entity(entity: &FeedEntity) -> Option<VehicleSnapshot> {
        let vehicle = entity.vehicle.as_ref()?;
        let descriptor = vehicle.vehicle.as_ref();

        // Entity ids are required on the wire, so an id (possibly empty)
        // is always there to fall back on
        let fleet_number = descriptor
            .and_then(|d| d.label.as_deref())
            .unwrap_or(entity.id.as_str());
        let internal_id = descriptor
            .and_then(|d| d.id.as_deref())
            .unwrap_or(NOT_AVAILABLE);
        let route_id = vehicle
            .trip
            .as_ref()
            .and_then(|t| t.route_id.as_deref())
            .unwrap_or(NOT_AVAILABLE);
        let (lat, lon) = vehicle
            .position
            .as_ref()
            .map(|p| (p.latitude, p.longitude))
            .unwrap_or((0.0, 0.0));

        Some(VehicleSnapshot::new(fleet_number, internal_id, route_id, lat, lon))
    }
}

impl FeedDecoder for GtfsRealtimeDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<VehicleSnapshot>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let message = FeedMessage::decode(bytes)?;
        debug!(
            "Decoded feed: GTFS-realtime {} with {} entities",
            message.header.gtfs_realtime_version,
            message.entity.len()
        );

        let snapshots: Vec<_> = message
            .entity
            .iter()
            .filter_map(Self::snapshot_from_entity)
            .collect();

        debug!("Extracted {} vehicle snapshots", snapshots.len());
        Ok(snapshots)
    }
}
