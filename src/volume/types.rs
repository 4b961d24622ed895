use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct VolumeId(pub u32);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl VolumeId {
    pub fn row_key(&self) -> String {
        self.0.to_string()
    }
}

/// A capacity-bounded unit on the store tier.
///
/// `used_bytes <= capacity_bytes` always holds for rows written by the
/// allocator: the check happens before the reservation is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogicalVolume {
    pub volume_id: VolumeId,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    /// False once sealed, either by the high-water mark or by an operator.
    pub write_enabled: bool,
}

impl LogicalVolume {
    pub fn new(volume_id: VolumeId, capacity_bytes: u64) -> Self {
        Self {
            volume_id,
            capacity_bytes,
            used_bytes: 0,
            write_enabled: true,
        }
    }

    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }

    /// Whether a new photo of `size` bytes may be placed here.
    pub fn can_fit(&self, size: u64) -> bool {
        self.write_enabled && self.free_bytes() >= size
    }

    pub fn is_past_high_water(&self, high_water_ratio: f64) -> bool {
        self.used_bytes as f64 >= self.capacity_bytes as f64 * high_water_ratio
    }
}

/// Space taken on a volume for one new photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub volume_id: VolumeId,
    pub reserved_bytes: u64,
    pub used_bytes_after: u64,
    /// True when this reservation pushed the volume past the high-water mark.
    pub sealed: bool,
}
