//! Directory Service
//!
//! The three public operations. Each one validates its input, then composes
//! the allocator and the mapping store; neither of those calls back into this
//! layer.

use crate::bootstrap::{mapping_table_ref, volume_table_ref};
use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::mapping::store::MappingStore;
use crate::mapping::types::{Cookie, PhotoKey, PhotoMapping, TombstoneOutcome};
use crate::storage::backend::TableBackend;
use crate::volume::allocator::VolumeAllocator;
use crate::volume::types::VolumeId;

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMapping {
    pub cookie: Cookie,
    pub logical_volume_id: VolumeId,
}

pub struct DirectoryService {
    mappings: MappingStore,
    allocator: VolumeAllocator,
    max_photo_bytes: u64,
}

impl DirectoryService {
    pub fn new(backend: Arc<dyn TableBackend>, config: &DirectoryConfig) -> Self {
        let keyspace = &config.store.keyspace;
        Self {
            mappings: MappingStore::new(backend.clone(), mapping_table_ref(keyspace), config.retry),
            allocator: VolumeAllocator::new(
                backend,
                volume_table_ref(keyspace),
                config.retry,
                config.allocator,
            ),
            max_photo_bytes: config.max_photo_bytes,
        }
    }

    pub fn allocator(&self) -> &VolumeAllocator {
        &self.allocator
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    /// Assigns a volume to a new photo and returns the cookie that authorizes
    /// its later deletion.
    ///
    /// Space is reserved before the mapping is written. If the write then
    /// loses to another creator of the same key, the reservation stays in
    /// place: over-counting `used_bytes` is safe, under-counting is not.
    pub async fn create_mapping(
        &self,
        photo_id: i64,
        alt_key: i64,
        size_bytes: i64,
    ) -> DirectoryResult<CreatedMapping> {
        let key = PhotoKey::parse(photo_id, alt_key)?;
        let size = self.validate_size(size_bytes)?;

        let cookie = Cookie::generate();
        let reservation = self.allocator.reserve(size).await?;
        let mapping = PhotoMapping::new_active(key, cookie.clone(), reservation.volume_id);

        match self.mappings.put(&mapping).await {
            Ok(()) => {
                tracing::info!(
                    "Created mapping for {} on volume {} ({} bytes)",
                    key,
                    reservation.volume_id,
                    size
                );
                Ok(CreatedMapping {
                    cookie,
                    logical_volume_id: reservation.volume_id,
                })
            }
            Err(e) => {
                tracing::warn!(
                    "Mapping for {} not written ({}); {} bytes stay reserved on volume {}",
                    key,
                    e,
                    size,
                    reservation.volume_id
                );
                Err(e)
            }
        }
    }

    pub async fn lookup_mapping(&self, photo_id: i64, alt_key: i64) -> DirectoryResult<VolumeId> {
        let key = PhotoKey::parse(photo_id, alt_key)?;
        let mapping = self.mappings.get(key).await?;
        tracing::debug!("Lookup {} -> volume {}", key, mapping.logical_volume_id);
        Ok(mapping.logical_volume_id)
    }

    /// Tombstones the mapping. Deleting an already-deleted mapping with the
    /// right cookie succeeds.
    pub async fn delete_mapping(
        &self,
        photo_id: i64,
        alt_key: i64,
        cookie: &str,
    ) -> DirectoryResult<TombstoneOutcome> {
        let key = PhotoKey::parse(photo_id, alt_key)?;
        let cookie = Cookie::parse(cookie)?;
        self.mappings.tombstone(key, &cookie).await
    }

    fn validate_size(&self, size_bytes: i64) -> DirectoryResult<u64> {
        if size_bytes <= 0 {
            return Err(DirectoryError::validation("size_bytes", "must be positive"));
        }
        let size = size_bytes as u64;
        if size > self.max_photo_bytes {
            return Err(DirectoryError::validation(
                "size_bytes",
                format!("{} exceeds the limit of {} bytes", size, self.max_photo_bytes),
            ));
        }
        Ok(size)
    }
}
