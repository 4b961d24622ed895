use super::types::*;
use crate::error::DirectoryResult;

use async_trait::async_trait;

/// Storage-client handle the directory runs against.
///
/// Every row operation touches exactly one key and is atomic for that key.
/// Mutations take an [`OpId`]; repeating a mutation with the same id returns
/// the first outcome without applying it again.
#[async_trait]
pub trait TableBackend: Send + Sync {
    async fn create_keyspace(&self, spec: &KeyspaceSpec) -> DirectoryResult<SchemaChange>;

    async fn create_table(&self, keyspace: &str, spec: &TableSpec)
    -> DirectoryResult<SchemaChange>;

    async fn get(&self, table: &TableRef, key: &str) -> DirectoryResult<Option<Row>>;

    async fn scan(&self, table: &TableRef) -> DirectoryResult<Vec<(String, Row)>>;

    /// Writes `value_json` only if no row exists under `key`.
    async fn insert_if_absent(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome>;

    /// Replaces the row only if its version still equals `expected_version`.
    async fn compare_and_set(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        expected_version: u64,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome>;

    /// Unconditional write, for operator provisioning paths only.
    async fn upsert(
        &self,
        table: &TableRef,
        op_id: &OpId,
        key: &str,
        value_json: String,
    ) -> DirectoryResult<WriteOutcome>;
}
