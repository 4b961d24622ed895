use axum::{Extension, Json, Router, routing::post};
use std::sync::Arc;

use super::memory::MemoryBackend;
use super::protocol::*;
use crate::error::DirectoryResult;

/// Routes served by a table server process.
pub fn routes(backend: Arc<MemoryBackend>) -> Router {
    Router::new()
        .route(ENDPOINT_KEYSPACE, post(handle_create_keyspace))
        .route(ENDPOINT_TABLE, post(handle_create_table))
        .route(ENDPOINT_ROW_GET, post(handle_get_row))
        .route(ENDPOINT_ROW_SCAN, post(handle_scan))
        .route(ENDPOINT_ROW_INSERT, post(handle_insert))
        .route(ENDPOINT_ROW_CAS, post(handle_cas))
        .route(ENDPOINT_ROW_UPSERT, post(handle_upsert))
        .layer(Extension(backend))
}

pub async fn handle_create_keyspace(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<CreateKeyspaceRequest>,
) -> Json<SchemaResponse> {
    let change = backend.create_keyspace_local(&req.spec);
    Json(SchemaResponse { change })
}

pub async fn handle_create_table(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<CreateTableRequest>,
) -> DirectoryResult<Json<SchemaResponse>> {
    let change = backend.create_table_local(&req.keyspace, &req.spec)?;
    Ok(Json(SchemaResponse { change }))
}

pub async fn handle_get_row(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<GetRowRequest>,
) -> DirectoryResult<Json<GetRowResponse>> {
    let row = backend.table(&req.table)?.get(&req.key);
    Ok(Json(GetRowResponse { row }))
}

pub async fn handle_scan(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<ScanRequest>,
) -> DirectoryResult<Json<ScanResponse>> {
    let entries = backend
        .table(&req.table)?
        .scan()
        .into_iter()
        .map(|(key, row)| RowEntry { key, row })
        .collect();
    Ok(Json(ScanResponse { entries }))
}

pub async fn handle_insert(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<WriteRowRequest>,
) -> DirectoryResult<Json<WriteRowResponse>> {
    let outcome = backend
        .table(&req.table)?
        .insert_if_absent(&req.op_id, &req.key, req.value_json);
    tracing::debug!("Insert {} into {}: {:?}", req.key, req.table, outcome);
    Ok(Json(WriteRowResponse { outcome }))
}

pub async fn handle_cas(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<CasRowRequest>,
) -> DirectoryResult<Json<WriteRowResponse>> {
    let outcome = backend.table(&req.table)?.compare_and_set(
        &req.op_id,
        &req.key,
        req.expected_version,
        req.value_json,
    );
    tracing::debug!(
        "CAS {} in {} (expected v{}): {:?}",
        req.key,
        req.table,
        req.expected_version,
        outcome
    );
    Ok(Json(WriteRowResponse { outcome }))
}

pub async fn handle_upsert(
    Extension(backend): Extension<Arc<MemoryBackend>>,
    Json(req): Json<WriteRowRequest>,
) -> DirectoryResult<Json<WriteRowResponse>> {
    let outcome = backend
        .table(&req.table)?
        .upsert(&req.op_id, &req.key, req.value_json);
    Ok(Json(WriteRowResponse { outcome }))
}
