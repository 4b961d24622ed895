use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use std::sync::Arc;

use super::protocol::*;
use super::service::DirectoryService;
use crate::error::{DirectoryError, DirectoryResult};
use crate::mapping::types::{PhotoKey, TombstoneOutcome};
use crate::volume::types::{LogicalVolume, VolumeId};

/// Public mapping API, operator API and health check.
pub fn routes(service: Arc<DirectoryService>) -> Router {
    Router::new()
        .route(ENDPOINT_MAPPINGS, post(handle_create_mapping))
        .route(
            ENDPOINT_MAPPING,
            get(handle_lookup_mapping).delete(handle_delete_mapping),
        )
        .route(
            ENDPOINT_ADMIN_VOLUMES,
            get(handle_list_volumes).post(handle_provision_volume),
        )
        .route(ENDPOINT_ADMIN_VOLUME, get(handle_get_volume))
        .route(ENDPOINT_ADMIN_WRITE_ENABLED, put(handle_set_write_enabled))
        .route(ENDPOINT_ADMIN_MAPPING, get(handle_inspect_mapping))
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(service))
}

fn parse_path_id<T: std::str::FromStr>(field: &str, raw: &str) -> DirectoryResult<T> {
    raw.parse()
        .map_err(|_| DirectoryError::validation(field, format!("'{}' is not a valid integer", raw)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> DirectoryResult<T> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| DirectoryError::validation("body", rejection.body_text()))
}

pub async fn handle_create_mapping(
    Extension(service): Extension<Arc<DirectoryService>>,
    payload: Result<Json<CreateMappingRequest>, JsonRejection>,
) -> DirectoryResult<(StatusCode, Json<CreateMappingResponse>)> {
    let req = body(payload)?;
    let created = service
        .create_mapping(req.photo_id, req.alt_key, req.size_bytes)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateMappingResponse {
            cookie: created.cookie.as_str().to_string(),
            logical_volume_id: created.logical_volume_id,
        }),
    ))
}

pub async fn handle_lookup_mapping(
    Extension(service): Extension<Arc<DirectoryService>>,
    Path((photo_id, alt_key)): Path<(String, String)>,
) -> DirectoryResult<Json<LookupMappingResponse>> {
    let logical_volume_id = service
        .lookup_mapping(
            parse_path_id("photo_id", &photo_id)?,
            parse_path_id("alt_key", &alt_key)?,
        )
        .await?;
    Ok(Json(LookupMappingResponse { logical_volume_id }))
}

pub async fn handle_delete_mapping(
    Extension(service): Extension<Arc<DirectoryService>>,
    Path((photo_id, alt_key)): Path<(String, String)>,
    Query(params): Query<DeleteMappingParams>,
) -> DirectoryResult<Json<DeleteMappingResponse>> {
    let cookie = params
        .cookie
        .ok_or_else(|| DirectoryError::validation("cookie", "query parameter is required"))?;

    let outcome = service
        .delete_mapping(
            parse_path_id("photo_id", &photo_id)?,
            parse_path_id("alt_key", &alt_key)?,
            &cookie,
        )
        .await?;

    Ok(Json(DeleteMappingResponse {
        already_deleted: outcome == TombstoneOutcome::AlreadyTombstoned,
    }))
}

pub async fn handle_list_volumes(
    Extension(service): Extension<Arc<DirectoryService>>,
) -> DirectoryResult<Json<Vec<LogicalVolume>>> {
    Ok(Json(service.allocator().list().await?))
}

pub async fn handle_get_volume(
    Extension(service): Extension<Arc<DirectoryService>>,
    Path(volume_id): Path<String>,
) -> DirectoryResult<Json<LogicalVolume>> {
    let volume_id = VolumeId(parse_path_id("volume_id", &volume_id)?);
    Ok(Json(service.allocator().get(volume_id).await?))
}

pub async fn handle_provision_volume(
    Extension(service): Extension<Arc<DirectoryService>>,
    payload: Result<Json<ProvisionVolumeRequest>, JsonRejection>,
) -> DirectoryResult<(StatusCode, Json<LogicalVolume>)> {
    let req = body(payload)?;
    let volume = LogicalVolume {
        volume_id: VolumeId(req.volume_id),
        capacity_bytes: req.capacity_bytes,
        used_bytes: req.used_bytes,
        write_enabled: req.write_enabled,
    };
    service.allocator().provision(volume.clone()).await?;
    Ok((StatusCode::CREATED, Json(volume)))
}

pub async fn handle_set_write_enabled(
    Extension(service): Extension<Arc<DirectoryService>>,
    Path(volume_id): Path<String>,
    payload: Result<Json<SetWriteEnabledRequest>, JsonRejection>,
) -> DirectoryResult<Json<LogicalVolume>> {
    let volume_id = VolumeId(parse_path_id("volume_id", &volume_id)?);
    let req = body(payload)?;
    let volume = service
        .allocator()
        .set_write_enabled(volume_id, req.write_enabled)
        .await?;
    Ok(Json(volume))
}

pub async fn handle_inspect_mapping(
    Extension(service): Extension<Arc<DirectoryService>>,
    Path((photo_id, alt_key)): Path<(String, String)>,
) -> DirectoryResult<Json<InspectMappingResponse>> {
    let key = PhotoKey::parse(
        parse_path_id("photo_id", &photo_id)?,
        parse_path_id("alt_key", &alt_key)?,
    )?;
    let mapping = service
        .mappings()
        .inspect(key)
        .await?
        .ok_or_else(|| DirectoryError::not_found(key.to_string()))?;
    Ok(Json(mapping.into()))
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
