use sha2::{Digest, Sha256};

pub const DEFAULT_PARTITIONS: u32 = 256;

/// Maps row keys onto a fixed set of partitions, and partitions onto table
/// servers.
///
/// All operations on one key land in one partition on one server, which is
/// what makes single-key conditional writes linearizable.
///
/// The hash is the first eight bytes of the key's SHA-256, so every process
/// and every build agrees on a key's partition. Ownership still depends on
/// the ordered server list: changing it moves keys.
pub struct PartitionManager {
    num_partitions: u32,
}

impl PartitionManager {
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(num_partitions: u32) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn get_partition(&self, key: &str) -> u32 {
        let digest = Sha256::digest(key.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % u64::from(self.num_partitions)) as u32
    }

    /// Index of the server owning `key` among `server_count` servers.
    pub fn owner_index(&self, key: &str, server_count: usize) -> usize {
        if server_count == 0 {
            return 0;
        }
        (self.get_partition(key) as usize) % server_count
    }
}

impl Default for PartitionManager {
    fn default() -> Self {
        Self::new()
    }
}
