use crate::mapping::types::{MappingState, PhotoMapping};
use crate::volume::types::VolumeId;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_MAPPINGS: &str = "/mappings";
pub const ENDPOINT_MAPPING: &str = "/mappings/:photo_id/:alt_key";
pub const ENDPOINT_ADMIN_VOLUMES: &str = "/admin/volumes";
pub const ENDPOINT_ADMIN_VOLUME: &str = "/admin/volumes/:volume_id";
pub const ENDPOINT_ADMIN_WRITE_ENABLED: &str = "/admin/volumes/:volume_id/write_enabled";
pub const ENDPOINT_ADMIN_MAPPING: &str = "/admin/mappings/:photo_id/:alt_key";
pub const ENDPOINT_HEALTH: &str = "/health";

// Identifiers are signed on the wire so that negative values reach
// validation instead of failing deserialization with a less useful message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMappingRequest {
    pub photo_id: i64,
    pub alt_key: i64,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMappingResponse {
    pub cookie: String,
    pub logical_volume_id: VolumeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupMappingResponse {
    pub logical_volume_id: VolumeId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteMappingParams {
    pub cookie: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMappingResponse {
    pub already_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionVolumeRequest {
    pub volume_id: u32,
    pub capacity_bytes: u64,
    #[serde(default)]
    pub used_bytes: u64,
    #[serde(default = "default_write_enabled")]
    pub write_enabled: bool,
}

fn default_write_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWriteEnabledRequest {
    pub write_enabled: bool,
}

/// Operator view of a mapping row. The cookie is never returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InspectMappingResponse {
    pub photo_id: u64,
    pub alt_key: u64,
    pub logical_volume_id: VolumeId,
    pub state: MappingState,
}

impl From<PhotoMapping> for InspectMappingResponse {
    fn from(mapping: PhotoMapping) -> Self {
        Self {
            photo_id: mapping.photo_id,
            alt_key: mapping.alt_key,
            logical_volume_id: mapping.logical_volume_id,
            state: mapping.state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
