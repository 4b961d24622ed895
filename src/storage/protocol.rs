//! Table Server Network Protocol
//!
//! Endpoints and DTOs spoken between a `RemoteBackend` and a table server.
//! Every request is a JSON POST; every mutation carries the caller's
//! operation id so a retried request replays instead of re-applying.

use super::types::*;
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

pub const ENDPOINT_KEYSPACE: &str = "/internal/schema/keyspace";
pub const ENDPOINT_TABLE: &str = "/internal/schema/table";
pub const ENDPOINT_ROW_GET: &str = "/internal/row/get";
pub const ENDPOINT_ROW_SCAN: &str = "/internal/row/scan";
pub const ENDPOINT_ROW_INSERT: &str = "/internal/row/insert";
pub const ENDPOINT_ROW_CAS: &str = "/internal/row/cas";
pub const ENDPOINT_ROW_UPSERT: &str = "/internal/row/upsert";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKeyspaceRequest {
    pub spec: KeyspaceSpec,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub keyspace: String,
    pub spec: TableSpec,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub change: SchemaChange,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetRowRequest {
    pub table: TableRef,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetRowResponse {
    /// `None` when no row exists under the key.
    pub row: Option<Row>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanRequest {
    pub table: TableRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RowEntry {
    pub key: String,
    pub row: Row,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub entries: Vec<RowEntry>,
}

/// Used by both insert-if-absent and upsert.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRowRequest {
    pub table: TableRef,
    pub op_id: OpId,
    pub key: String,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CasRowRequest {
    pub table: TableRef,
    pub op_id: OpId,
    pub key: String,
    pub expected_version: u64,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRowResponse {
    pub outcome: WriteOutcome,
}
