use super::backend::TableBackend;
use super::partitioner::PartitionManager;
use super::types::*;
use crate::error::{DirectoryError, DirectoryResult};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// How many recent mutation outcomes a table remembers for replay.
pub const MAX_REMEMBERED_OPS: usize = 10_000;
/// Outcomes older than this are evicted first once the limit is reached.
const OP_MEMORY_TTL_MS: u64 = 60_000;

/// A remembered mutation: when it ran, its arrival order, and its outcome.
struct ProcessedOp {
    at_ms: u64,
    seq: u64,
    outcome: WriteOutcome,
}

/// One table: rows sharded by partition, each partition a concurrent map.
///
/// Single-key atomicity comes from the partition map's entry lock, which is
/// held only for the synchronous body of one operation.
pub struct MemoryTable {
    spec: TableSpec,
    partitions: DashMap<u32, DashMap<String, Row>>,
    processed_ops: DashMap<String, ProcessedOp>,
    op_seq: AtomicU64,
    partitioner: Arc<PartitionManager>,
}

impl MemoryTable {
    pub fn new(spec: TableSpec, partitioner: Arc<PartitionManager>) -> Self {
        Self {
            spec,
            partitions: DashMap::new(),
            processed_ops: DashMap::new(),
            op_seq: AtomicU64::new(0),
            partitioner,
        }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    fn partition_for(&self, key: &str) -> Ref<'_, u32, DashMap<String, Row>> {
        let partition = self.partitioner.get_partition(key);
        self.partitions.entry(partition).or_default().downgrade()
    }

    /// Runs `apply` at most once per op id and returns its outcome, replaying
    /// the remembered one for a repeat.
    ///
    /// The op id's entry stays locked while `apply` runs, so two in-flight
    /// copies of one mutation serialize: the second sees the first's outcome.
    /// Lock order is always op entry, then partition.
    fn apply_once(
        &self,
        op_id: &OpId,
        kind: &str,
        apply: impl FnOnce() -> WriteOutcome,
    ) -> WriteOutcome {
        // Eviction walks every shard, so it must run before the entry is held.
        self.evict_processed_ops();

        match self.processed_ops.entry(op_id.0.clone()) {
            Entry::Occupied(done) => {
                tracing::debug!("Replaying {} {} on {}", kind, op_id.0, self.spec.name);
                done.get().outcome.clone()
            }
            Entry::Vacant(slot) => {
                let outcome = apply();
                slot.insert(ProcessedOp {
                    at_ms: now_ms(),
                    seq: self.op_seq.fetch_add(1, Ordering::Relaxed),
                    outcome: outcome.clone(),
                });
                outcome
            }
        }
    }

    /// Keeps the replay memory under its bound: expired entries go first,
    /// then the oldest by arrival until a tenth of the room is free again.
    fn evict_processed_ops(&self) {
        if self.processed_ops.len() < MAX_REMEMBERED_OPS {
            return;
        }

        let cutoff = now_ms().saturating_sub(OP_MEMORY_TTL_MS);
        self.processed_ops.retain(|_, op| op.at_ms >= cutoff);

        let target = MAX_REMEMBERED_OPS - MAX_REMEMBERED_OPS / 10;
        let len = self.processed_ops.len();
        if len <= target {
            return;
        }

        let mut by_age: Vec<(u64, String)> = self
            .processed_ops
            .iter()
            .map(|entry| (entry.value().seq, entry.key().clone()))
            .collect();
        by_age.sort_unstable();
        for (_, op_id) in by_age.into_iter().take(len - target) {
            self.processed_ops.remove(&op_id);
        }
        tracing::debug!(
            "Evicted {} unexpired op ids from {}",
            len - target,
            self.spec.name
        );
    }

    pub fn remembered_op_count(&self) -> usize {
        self.processed_ops.len()
    }

    pub fn get(&self, key: &str) -> Option<Row> {
        let partition = self.partitioner.get_partition(key);
        let partition_map = self.partitions.get(&partition)?;
        let row = partition_map.get(key)?;
        Some(row.clone())
    }

    pub fn scan(&self) -> Vec<(String, Row)> {
        let mut entries = Vec::new();
        for partition_map in self.partitions.iter() {
            for entry in partition_map.value().iter() {
                entries.push((entry.key().clone(), entry.value().clone()));
            }
        }
        entries
    }

    pub fn insert_if_absent(&self, op_id: &OpId, key: &str, value_json: String) -> WriteOutcome {
        self.apply_once(op_id, "insert", || {
            let partition_map = self.partition_for(key);
            match partition_map.entry(key.to_string()) {
                Entry::Occupied(existing) => WriteOutcome::Rejected {
                    current: Some(existing.get().clone()),
                },
                Entry::Vacant(slot) => {
                    slot.insert(Row {
                        value_json,
                        version: 1,
                    });
                    WriteOutcome::Applied { version: 1 }
                }
            }
        })
    }

    pub fn compare_and_set(
        &self,
        op_id: &OpId,
        key: &str,
        expected_version: u64,
        value_json: String,
    ) -> WriteOutcome {
        self.apply_once(op_id, "CAS", || {
            let partition_map = self.partition_for(key);
            match partition_map.get_mut(key) {
                Some(mut row) if row.version == expected_version => {
                    row.version += 1;
                    row.value_json = value_json;
                    WriteOutcome::Applied {
                        version: row.version,
                    }
                }
                Some(row) => WriteOutcome::Rejected {
                    current: Some(row.clone()),
                },
                None => WriteOutcome::Rejected { current: None },
            }
        })
    }

    pub fn upsert(&self, op_id: &OpId, key: &str, value_json: String) -> WriteOutcome {
        self.apply_once(op_id, "upsert", || {
            let partition_map = self.partition_for(key);
            let mut row = partition_map.entry(key.to_string()).or_insert(Row {
                value_json: String::new(),
                version: 0,
            });
            row.version += 1;
            row.value_json = value_json;
            WriteOutcome::Applied {
                version: row.version,
            }
        })
    }

    pub fn local_partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn local_entry_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }
}

struct Keyspace {
    replication_factor: usize,
    tables: DashMap<String, Arc<MemoryTable>>,
}

/// In-process [`TableBackend`]. Also the engine behind a table server.
pub struct MemoryBackend {
    keyspaces: DashMap<String, Keyspace>,
    partitioner: Arc<PartitionManager>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            keyspaces: DashMap::new(),
            partitioner: Arc::new(PartitionManager::new()),
        }
    }

    pub fn table(&self, table: &TableRef) -> DirectoryResult<Arc<MemoryTable>> {
        let keyspace = self
            .keyspaces
            .get(&table.keyspace)
            .ok_or_else(|| DirectoryError::schema(format!("keyspace {} does not exist", table.keyspace)))?;
        let found = keyspace
            .tables
            .get(&table.table)
            .ok_or_else(|| DirectoryError::schema(format!("table {} does not exist", table)))?;
        Ok(found.value().clone())
    }

    pub fn replication_factor(&self, keyspace: &str) -> Option<usize> {
        self.keyspaces
            .get(keyspace)
            .map(|entry| entry.value().replication_factor)
    }

    pub fn create_keyspace_local(&self, spec: &KeyspaceSpec) -> SchemaChange {
        match self.keyspaces.entry(spec.name.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().replication_factor != spec.replication_factor {
                    tracing::warn!(
                        "Keyspace {} exists with replication factor {} (requested {})",
                        spec.name,
                        existing.get().replication_factor,
                        spec.replication_factor
                    );
                }
                SchemaChange::AlreadyExists
            }
            Entry::Vacant(slot) => {
                slot.insert(Keyspace {
                    replication_factor: spec.replication_factor,
                    tables: DashMap::new(),
                });
                tracing::info!(
                    "Created keyspace {} (replication factor {})",
                    spec.name,
                    spec.replication_factor
                );
                SchemaChange::Created
            }
        }
    }

    pub fn create_table_local(&self, keyspace: &str, spec: &TableSpec) -> DirectoryResult<SchemaChange> {
        let ks = self
            .keyspaces
            .get(keyspace)
            .ok_or_else(|| DirectoryError::schema(format!("keyspace {} does not exist", keyspace)))?;

        let change = match ks.tables.entry(spec.name.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().spec() != spec {
                    tracing::warn!("Table {}.{} exists with a different schema", keyspace, spec.name);
                }
                SchemaChange::AlreadyExists
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(MemoryTable::new(spec.clone(), self.partitioner.clone())));
                tracing::info!("Created table {}.{}", keyspace, spec.name);
                SchemaChange::Created
            }
        };
        Ok(change)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn create_keyspace(&self, spec: &KeyspaceSpec) -> DirectoryResult<SchemaChange> {
        Ok(self.create_keyspace_local(spec))
    }

    async fn create_table(&self, keyspace: &str, spec: &TableSpec) -> DirectoryResult<SchemaChange> {
        self.create_table_local(keyspace, spec)
    }

    async fn get(&self, table: &TableRef, key: &str) -> DirectoryResult<Option<Row>> {
        Ok(self.table(table)?.get(key))
    }

    async fn scan(&self, table: &TableRef) -> DirectoryResult<Vec<(String, Row)>> {
        Ok(self.table(table)?.scan())
    }

    async fn insert_if_absent(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        Ok(self.table(table)?.insert_if_absent(op_id, key, value_json))
    }

    async fn compare_and_set(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        expected_version: u64,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        Ok(self
            .table(table)?
            .compare_and_set(op_id, key, expected_version, value_json))
    }

    async fn upsert(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        Ok(self.table(table)?.upsert(op_id, key, value_json))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
