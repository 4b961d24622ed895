//! Volume Module Tests
//!
//! ## Test Scopes
//! - **Reservation**: capacity accounting, exhaustion, the high-water mark.
//! - **Contention**: many concurrent reservations never over-commit a volume.
//! - **Operator actions**: provisioning and write-enable toggles.

#[cfg(test)]
mod tests {
    use crate::bootstrap::volume_table_ref;
    use crate::config::DirectoryConfig;
    use crate::error::DirectoryError;
    use crate::test_support::{bootstrapped_memory, test_config};
    use crate::volume::allocator::VolumeAllocator;
    use crate::volume::types::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn allocator_with(config: &DirectoryConfig, volumes: &[(u32, u64)]) -> Arc<VolumeAllocator> {
        let backend = bootstrapped_memory(config).await;
        let allocator = Arc::new(VolumeAllocator::new(
            backend,
            volume_table_ref(&config.store.keyspace),
            config.retry,
            config.allocator,
        ));
        for &(id, capacity) in volumes {
            allocator
                .provision(LogicalVolume::new(VolumeId(id), capacity))
                .await
                .unwrap();
        }
        allocator
    }

    // ============================================================
    // RESERVATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_reserve_updates_used_bytes() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 1000)]).await;

        let reservation = allocator.reserve(100).await.unwrap();

        assert_eq!(reservation.volume_id, VolumeId(1));
        assert_eq!(reservation.reserved_bytes, 100);
        assert_eq!(reservation.used_bytes_after, 100);
        assert!(!reservation.sealed);
        assert_eq!(allocator.get(VolumeId(1)).await.unwrap().used_bytes, 100);
    }

    #[tokio::test]
    async fn test_reserve_skips_volumes_without_room() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 50), (2, 10_000)]).await;

        for _ in 0..10 {
            let reservation = allocator.reserve(100).await.unwrap();
            assert_eq!(reservation.volume_id, VolumeId(2));
        }
        assert_eq!(allocator.get(VolumeId(1)).await.unwrap().used_bytes, 0);
    }

    #[tokio::test]
    async fn test_reserve_exhausted() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 10)]).await;

        let result = allocator.reserve(11).await;

        assert_eq!(result, Err(DirectoryError::VolumeExhausted { requested_bytes: 11 }));
    }

    #[tokio::test]
    async fn test_reserve_with_no_volumes() {
        let config = test_config();
        let allocator = allocator_with(&config, &[]).await;

        let result = allocator.reserve(1).await;

        assert!(matches!(result, Err(DirectoryError::VolumeExhausted { .. })));
    }

    #[tokio::test]
    async fn test_reserve_zero_bytes_rejected() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 10)]).await;

        let result = allocator.reserve(0).await;

        assert!(matches!(result, Err(DirectoryError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_high_water_mark_seals_volume() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 1000)]).await;

        let first = allocator.reserve(900).await.unwrap();
        assert!(!first.sealed);

        // 950 of 1000 is exactly the 0.95 mark.
        let second = allocator.reserve(50).await.unwrap();
        assert!(second.sealed);

        let volume = allocator.get(VolumeId(1)).await.unwrap();
        assert!(!volume.write_enabled);
        assert_eq!(volume.used_bytes, 950);

        // Room remains, but the volume no longer takes writes.
        let result = allocator.reserve(10).await;
        assert!(matches!(result, Err(DirectoryError::VolumeExhausted { .. })));

        allocator.set_write_enabled(VolumeId(1), true).await.unwrap();
        let third = allocator.reserve(10).await.unwrap();
        assert_eq!(third.used_bytes_after, 960);
        assert!(third.sealed);
    }

    #[tokio::test]
    async fn test_reservations_spread_by_free_space() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 1_000_000), (2, 1_000_000), (3, 1_000_000)]).await;

        let mut counts: HashMap<VolumeId, usize> = HashMap::new();
        for _ in 0..300 {
            let reservation = allocator.reserve(10).await.unwrap();
            *counts.entry(reservation.volume_id).or_default() += 1;
        }

        assert_eq!(counts.len(), 3, "counts = {:?}", counts);
        for count in counts.values() {
            assert!(*count > 30, "counts = {:?}", counts);
        }
    }

    #[tokio::test]
    async fn test_reserve_on_volumes_whose_free_space_overflows_u64() {
        let config = test_config();
        let huge = u64::MAX / 2 + 1;
        let allocator = allocator_with(&config, &[(1, huge), (2, huge)]).await;

        let reservation = allocator.reserve(1024).await.unwrap();

        assert!(reservation.volume_id == VolumeId(1) || reservation.volume_id == VolumeId(2));
        assert_eq!(reservation.used_bytes_after, 1024);
        assert!(!reservation.sealed);
    }

    // ============================================================
    // CONTENTION TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_overcommit() {
        let mut config = test_config();
        config.allocator.cas_attempts = 1_000;
        config.allocator.high_water_ratio = 1.0;
        let allocator = allocator_with(&config, &[(1, 1000), (2, 1000)]).await;

        // 40 x 100 bytes against 2000 bytes of room: exactly 20 can succeed.
        let mut handles = Vec::new();
        for _ in 0..40 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move { allocator.reserve(100).await }));
        }

        let mut granted = 0u64;
        let mut exhausted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(reservation) => granted += reservation.reserved_bytes,
                Err(DirectoryError::VolumeExhausted { .. }) => exhausted += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        let volumes = allocator.list().await.unwrap();
        let used: u64 = volumes.iter().map(|v| v.used_bytes).sum();
        assert_eq!(granted, 2000);
        assert_eq!(exhausted, 20);
        assert_eq!(used, granted);
        for volume in volumes {
            assert!(volume.used_bytes <= volume.capacity_bytes);
        }
    }

    // ============================================================
    // OPERATOR TESTS
    // ============================================================

    #[tokio::test]
    async fn test_provision_duplicate_conflicts() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 1000)]).await;

        let result = allocator.provision(LogicalVolume::new(VolumeId(1), 5)).await;

        assert!(matches!(result, Err(DirectoryError::Conflict { .. })));
        assert_eq!(allocator.get(VolumeId(1)).await.unwrap().capacity_bytes, 1000);
    }

    #[tokio::test]
    async fn test_provision_validates_capacity() {
        let config = test_config();
        let allocator = allocator_with(&config, &[]).await;

        let zero = allocator.provision(LogicalVolume::new(VolumeId(1), 0)).await;
        assert!(matches!(zero, Err(DirectoryError::Validation { .. })));

        let mut overfull = LogicalVolume::new(VolumeId(2), 10);
        overfull.used_bytes = 11;
        let result = allocator.provision(overfull).await;
        assert!(matches!(result, Err(DirectoryError::Validation { .. })));

        assert!(allocator.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_write_enabled_unknown_volume() {
        let config = test_config();
        let allocator = allocator_with(&config, &[]).await;

        let result = allocator.set_write_enabled(VolumeId(9), false).await;

        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_disabled_volume_not_chosen() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(1, 1000), (2, 1000)]).await;

        let updated = allocator.set_write_enabled(VolumeId(1), false).await.unwrap();
        assert!(!updated.write_enabled);

        for _ in 0..20 {
            assert_eq!(allocator.reserve(10).await.unwrap().volume_id, VolumeId(2));
        }
    }

    #[tokio::test]
    async fn test_list_sorted_by_id() {
        let config = test_config();
        let allocator = allocator_with(&config, &[(3, 10), (1, 10), (2, 10)]).await;

        let ids: Vec<u32> = allocator.list().await.unwrap().iter().map(|v| v.volume_id.0).collect();

        assert_eq!(ids, vec![1, 2, 3]);
    }
}
