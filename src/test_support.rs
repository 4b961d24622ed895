//! Fixtures shared by the module test suites.

use crate::bootstrap;
use crate::config::DirectoryConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::retry::RetryPolicy;
use crate::storage::backend::TableBackend;
use crate::storage::handlers::routes;
use crate::storage::memory::MemoryBackend;
use crate::storage::types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 4,
        base_delay_ms: 1,
        max_delay_ms: 5,
        call_timeout_ms: 2_000,
    }
}

pub fn test_config() -> DirectoryConfig {
    let mut config = DirectoryConfig::new();
    config.retry = fast_retry();
    config.allocator.cas_attempts = 64;
    config
}

/// In-process backend with the directory schema already provisioned.
pub async fn bootstrapped_memory(config: &DirectoryConfig) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    bootstrap::ensure_schema(backend.as_ref(), &config.store, &config.retry)
        .await
        .unwrap();
    backend
}

/// Starts a table server on an ephemeral port and returns its base URL.
pub async fn spawn_table_server() -> (String, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes(backend.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), backend)
}

/// Wraps a backend and loses the acknowledgement of the next `n` mutations:
/// the write is applied, but the caller sees `StoreUnavailable`.
pub struct LostAckBackend {
    pub inner: Arc<MemoryBackend>,
    pub lost_acks: AtomicUsize,
    pub mutation_calls: AtomicUsize,
}

impl LostAckBackend {
    pub fn new(inner: Arc<MemoryBackend>, lost_acks: usize) -> Self {
        Self {
            inner,
            lost_acks: AtomicUsize::new(lost_acks),
            mutation_calls: AtomicUsize::new(0),
        }
    }

    fn maybe_lose(&self, outcome: WriteOutcome) -> DirectoryResult<WriteOutcome> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let lose = self
            .lost_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lose {
            Err(DirectoryError::unavailable("acknowledgement lost"))
        } else {
            Ok(outcome)
        }
    }
}

#[async_trait]
impl TableBackend for LostAckBackend {
    async fn create_keyspace(&self, spec: &KeyspaceSpec) -> DirectoryResult<SchemaChange> {
        self.inner.create_keyspace(spec).await
    }

    async fn create_table(&self, keyspace: &str, spec: &TableSpec) -> DirectoryResult<SchemaChange> {
        self.inner.create_table(keyspace, spec).await
    }

    async fn get(&self, table: &TableRef, key: &str) -> DirectoryResult<Option<Row>> {
        self.inner.get(table, key).await
    }

    async fn scan(&self, table: &TableRef) -> DirectoryResult<Vec<(String, Row)>> {
        self.inner.scan(table).await
    }

    async fn insert_if_absent(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        let outcome = self.inner.insert_if_absent(table, op_id, key, value_json).await?;
        self.maybe_lose(outcome)
    }

    async fn compare_and_set(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        expected_version: u64,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        let outcome = self
            .inner
            .compare_and_set(table, op_id, key, expected_version, value_json)
            .await?;
        self.maybe_lose(outcome)
    }

    async fn upsert(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome> {
        let outcome = self.inner.upsert(table, op_id, key, value_json).await?;
        self.maybe_lose(outcome)
    }
}
