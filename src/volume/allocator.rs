//! Volume Allocator
//!
//! Chooses the logical volume for each new photo and reserves its bytes
//! before the mapping is written, so `used_bytes` never lags behind actual
//! assignments.
//!
//! ## Reservation loop
//! 1. Read every volume and keep those that are write-enabled and have room.
//! 2. None left: `VolumeExhausted`.
//! 3. Pick one at random, weighted by free space, so load spreads without a
//!    central sequencer and without herding on the emptiest volume.
//! 4. Compare-and-set the row against the version that was read. A lost race
//!    starts over from step 1, up to `cas_attempts` times.
//! 5. If the new usage reaches the high-water mark, the same write clears
//!    `write_enabled`. Only an operator turns it back on.

use super::types::*;
use crate::config::AllocatorConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::storage::backend::TableBackend;
use crate::storage::types::{OpId, TableRef, WriteOutcome};

use rand::distributions::{Distribution, WeightedIndex};
use std::sync::Arc;
use std::time::Duration;

pub struct VolumeAllocator {
    backend: Arc<dyn TableBackend>,
    table: TableRef,
    retry: RetryPolicy,
    config: AllocatorConfig,
}

/// A volume row together with the version it was read at.
#[derive(Debug, Clone)]
struct VersionedVolume {
    volume: LogicalVolume,
    version: u64,
}

impl VolumeAllocator {
    pub fn new(
        backend: Arc<dyn TableBackend>,
        table: TableRef,
        retry: RetryPolicy,
        config: AllocatorConfig,
    ) -> Self {
        Self {
            backend,
            table,
            retry,
            config,
        }
    }

    pub async fn reserve(&self, size: u64) -> DirectoryResult<Reservation> {
        if size == 0 {
            return Err(DirectoryError::validation("size_bytes", "must be positive"));
        }

        for attempt in 0..self.config.cas_attempts {
            let candidates: Vec<VersionedVolume> = self
                .scan()
                .await?
                .into_iter()
                .filter(|v| v.volume.can_fit(size))
                .collect();

            if candidates.is_empty() {
                tracing::warn!("No write-enabled volume can take {} bytes", size);
                return Err(DirectoryError::VolumeExhausted {
                    requested_bytes: size,
                });
            }

            let chosen = &candidates[pick_weighted(&candidates)?];
            let mut updated = chosen.volume.clone();
            updated.used_bytes += size;
            let sealed = updated.is_past_high_water(self.config.high_water_ratio);
            if sealed {
                updated.write_enabled = false;
            }

            let outcome = self.write_if_unchanged(chosen, &updated).await?;
            if outcome.is_applied() {
                if sealed {
                    tracing::info!(
                        "Volume {} reached high-water mark ({}/{} bytes), no longer write-enabled",
                        updated.volume_id,
                        updated.used_bytes,
                        updated.capacity_bytes
                    );
                }
                tracing::debug!(
                    "Reserved {} bytes on volume {} (attempt {})",
                    size,
                    updated.volume_id,
                    attempt + 1
                );
                return Ok(Reservation {
                    volume_id: updated.volume_id,
                    reserved_bytes: size,
                    used_bytes_after: updated.used_bytes,
                    sealed,
                });
            }

            tracing::debug!(
                "Reservation on volume {} lost a race (attempt {}/{})",
                chosen.volume.volume_id,
                attempt + 1,
                self.config.cas_attempts
            );
            let backoff = rand::random::<u64>() % (2 * (attempt as u64 + 1)) + 1;
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }

        Err(DirectoryError::unavailable(format!(
            "could not reserve {} bytes after {} contended attempts",
            size, self.config.cas_attempts
        )))
    }

    /// Adds a new volume row. Provisioning is an operator action.
    pub async fn provision(&self, volume: LogicalVolume) -> DirectoryResult<()> {
        if volume.capacity_bytes == 0 {
            return Err(DirectoryError::validation("capacity_bytes", "must be positive"));
        }
        if volume.used_bytes > volume.capacity_bytes {
            return Err(DirectoryError::validation(
                "used_bytes",
                "cannot exceed capacity_bytes",
            ));
        }

        let row_key = volume.volume_id.row_key();
        let value_json = serde_json::to_string(&volume)?;
        let op_id = OpId::new();
        let outcome = with_retry(&self.retry, "volume provision", || {
            self.backend
                .insert_if_absent(&self.table, &op_id, &row_key, value_json.clone())
        })
        .await?;

        match outcome {
            WriteOutcome::Applied { .. } => {
                tracing::info!(
                    "Provisioned volume {} with {} bytes",
                    volume.volume_id,
                    volume.capacity_bytes
                );
                Ok(())
            }
            WriteOutcome::Rejected { .. } => Err(DirectoryError::conflict(format!(
                "volume {}",
                volume.volume_id
            ))),
        }
    }

    /// Operator seal/unseal. This is the only way a sealed volume becomes
    /// writable again.
    pub async fn set_write_enabled(
        &self,
        volume_id: VolumeId,
        write_enabled: bool,
    ) -> DirectoryResult<LogicalVolume> {
        for _ in 0..self.config.cas_attempts {
            let current = self
                .read(volume_id)
                .await?
                .ok_or_else(|| DirectoryError::not_found(format!("volume {}", volume_id)))?;

            if current.volume.write_enabled == write_enabled {
                return Ok(current.volume);
            }

            let mut updated = current.volume.clone();
            updated.write_enabled = write_enabled;
            if self.write_if_unchanged(&current, &updated).await?.is_applied() {
                tracing::info!("Volume {} write_enabled set to {}", volume_id, write_enabled);
                return Ok(updated);
            }
        }

        Err(DirectoryError::unavailable(format!(
            "volume {} kept changing while updating write_enabled",
            volume_id
        )))
    }

    pub async fn list(&self) -> DirectoryResult<Vec<LogicalVolume>> {
        let mut volumes: Vec<LogicalVolume> =
            self.scan().await?.into_iter().map(|v| v.volume).collect();
        volumes.sort_by_key(|v| v.volume_id);
        Ok(volumes)
    }

    pub async fn get(&self, volume_id: VolumeId) -> DirectoryResult<LogicalVolume> {
        self.read(volume_id)
            .await?
            .map(|v| v.volume)
            .ok_or_else(|| DirectoryError::not_found(format!("volume {}", volume_id)))
    }

    async fn read(&self, volume_id: VolumeId) -> DirectoryResult<Option<VersionedVolume>> {
        let row_key = volume_id.row_key();
        let row = with_retry(&self.retry, "volume get", || {
            self.backend.get(&self.table, &row_key)
        })
        .await?;

        match row {
            Some(row) => Ok(Some(VersionedVolume {
                volume: serde_json::from_str(&row.value_json)?,
                version: row.version,
            })),
            None => Ok(None),
        }
    }

    async fn scan(&self) -> DirectoryResult<Vec<VersionedVolume>> {
        let rows = with_retry(&self.retry, "volume scan", || self.backend.scan(&self.table)).await?;

        rows.into_iter()
            .map(|(_, row)| {
                Ok(VersionedVolume {
                    volume: serde_json::from_str(&row.value_json)?,
                    version: row.version,
                })
            })
            .collect()
    }

    async fn write_if_unchanged(
        &self,
        current: &VersionedVolume,
        updated: &LogicalVolume,
    ) -> DirectoryResult<WriteOutcome> {
        let row_key = updated.volume_id.row_key();
        let value_json = serde_json::to_string(updated)?;
        let op_id = OpId::new();

        with_retry(&self.retry, "volume reserve", || {
            self.backend.compare_and_set(
                &self.table,
                &op_id,
                &row_key,
                current.version,
                value_json.clone(),
            )
        })
        .await
    }
}

/// Index of a candidate, drawn with probability proportional to free space.
///
/// Exact `u64` weights while their total fits; beyond that the free space of
/// very large volumes is weighted as `f64`.
fn pick_weighted(candidates: &[VersionedVolume]) -> DirectoryResult<usize> {
    let fits_u64 = candidates
        .iter()
        .try_fold(0u64, |total, c| total.checked_add(c.volume.free_bytes()))
        .is_some();

    let mut rng = rand::thread_rng();
    if fits_u64 {
        let index = WeightedIndex::new(candidates.iter().map(|c| c.volume.free_bytes()))
            .map_err(weighting_error)?;
        Ok(index.sample(&mut rng))
    } else {
        let index = WeightedIndex::new(candidates.iter().map(|c| c.volume.free_bytes() as f64))
            .map_err(weighting_error)?;
        Ok(index.sample(&mut rng))
    }
}

fn weighting_error(e: rand::distributions::WeightedError) -> DirectoryError {
    DirectoryError::internal(format!("Cannot weight volume candidates: {}", e))
}
