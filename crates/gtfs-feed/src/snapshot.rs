//! Vehicle Snapshot Types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier length limit in bytes
pub const MAX_ID_LEN: usize = 15;

/// Placeholder used when the feed omits an identifier
pub const NOT_AVAILABLE: &str = "[N/A]";

/// Fixed-size identifier stored inline so snapshots stay `Copy`.
///
/// Longer input is truncated at the last UTF-8 character boundary that fits in
/// [`MAX_ID_LEN`] bytes. Two identifiers sharing a 15-byte prefix collapse to
/// the same value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundedId {
    bytes: [u8; MAX_ID_LEN],
    len: u8,
}

impl BoundedId {
    /// Build an identifier, truncating if needed
    pub fn new(value: &str) -> Self {
        let mut end = value.len().min(MAX_ID_LEN);
        while !value.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; MAX_ID_LEN];
        bytes[..end].copy_from_slice(&value.as_bytes()[..end]);
        Self {
            bytes,
            len: end as u8,
        }
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        // Only ever filled from a `&str` cut at a char boundary
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for BoundedId {
    fn default() -> Self {
        Self::new(NOT_AVAILABLE)
    }
}

impl From<&str> for BoundedId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for BoundedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for BoundedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl Serialize for BoundedId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BoundedId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(&value))
    }
}

/// One observation of a vehicle's identity and position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// Public fleet number (vehicle label)
    pub fleet_number: BoundedId,
    /// Agency-internal vehicle id
    pub internal_id: BoundedId,
    /// Route the vehicle is serving
    pub route_id: BoundedId,
    /// Latitude in degrees (WGS84)
    pub lat: f32,
    /// Longitude in degrees (WGS84)
    pub lon: f32,
}

impl VehicleSnapshot {
    /// Create a new snapshot
    pub fn new(fleet_number: &str, internal_id: &str, route_id: &str, lat: f32, lon: f32) -> Self {
        Self {
            fleet_number: BoundedId::new(fleet_number),
            internal_id: BoundedId::new(internal_id),
            route_id: BoundedId::new(route_id),
            lat,
            lon,
        }
    }

    /// Whether the coordinates describe a real fix.
    ///
    /// `(0.0, 0.0)` is what the decoder emits for a vehicle without a position.
    pub fn has_valid_position(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
            && !(self.lat == 0.0 && self.lon == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_kept() {
        let id = BoundedId::new("4521");
        assert_eq!(id.as_str(), "4521");
        assert_eq!(id.len(), 4);
    }

    #[test]
    fn test_long_id_truncated() {
        let id = BoundedId::new("0123456789ABCDEFGHIJ");
        assert_eq!(id.as_str(), "0123456789ABCDE");
        assert_eq!(id.len(), MAX_ID_LEN);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 14 ASCII bytes followed by a 2-byte character
        let id = BoundedId::new("abcdefghijklmné");
        assert_eq!(id.as_str(), "abcdefghijklmn");
    }

    #[test]
    fn test_default_is_placeholder() {
        assert_eq!(BoundedId::default().as_str(), NOT_AVAILABLE);
    }

    #[test]
    fn test_position_validity() {
        let mut snap = VehicleSnapshot::new("1201", "v-1201", "10", 43.2557, -79.8711);
        assert!(snap.has_valid_position());

        snap.lat = 0.0;
        snap.lon = 0.0;
        assert!(!snap.has_valid_position());

        snap.lat = f32::NAN;
        snap.lon = -79.0;
        assert!(!snap.has_valid_position());

        snap.lat = 91.0;
        assert!(!snap.has_valid_position());
    }

    #[test]
    fn test_serializes_ids_as_strings() {
        let snap = VehicleSnapshot::new("1201", "v-1201", "10", 43.25, -79.87);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"fleet_number\":\"1201\""));

        let back: VehicleSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
