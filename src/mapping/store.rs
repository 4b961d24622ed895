//! Mapping Store
//!
//! Point read, insert and tombstone over the mapping table. Each operation
//! touches exactly one row and relies only on the backend's single-key
//! conditional writes, so concurrent callers on other processes are safe.

use super::types::*;
use crate::error::{DirectoryError, DirectoryResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::storage::backend::TableBackend;
use crate::storage::types::{OpId, Row, TableRef, WriteOutcome};

use std::sync::Arc;

pub struct MappingStore {
    backend: Arc<dyn TableBackend>,
    table: TableRef,
    retry: RetryPolicy,
}

impl MappingStore {
    pub fn new(backend: Arc<dyn TableBackend>, table: TableRef, retry: RetryPolicy) -> Self {
        Self {
            backend,
            table,
            retry,
        }
    }

    /// Inserts a new ACTIVE mapping.
    ///
    /// Any existing row under the key, active or tombstoned, makes this a
    /// `Conflict`: tombstones keep their key forever.
    pub async fn put(&self, mapping: &PhotoMapping) -> DirectoryResult<()> {
        if !mapping.is_active() {
            return Err(DirectoryError::internal(format!(
                "refusing to insert {} in state {:?}",
                mapping.key(),
                mapping.state
            )));
        }

        let key = mapping.key();
        let row_key = key.row_key();
        let value_json = serde_json::to_string(mapping)?;
        let op_id = OpId::new();

        let outcome = with_retry(&self.retry, "mapping put", || {
            self.backend
                .insert_if_absent(&self.table, &op_id, &row_key, value_json.clone())
        })
        .await?;

        match outcome {
            WriteOutcome::Applied { .. } => {
                tracing::debug!("Stored mapping for {} on volume {}", key, mapping.logical_volume_id);
                Ok(())
            }
            WriteOutcome::Rejected { .. } => Err(DirectoryError::conflict(key.to_string())),
        }
    }

    /// Returns the ACTIVE mapping for `key`. Tombstoned rows read as absent.
    pub async fn get(&self, key: PhotoKey) -> DirectoryResult<PhotoMapping> {
        match self.inspect(key).await? {
            Some(mapping) if mapping.is_active() => Ok(mapping),
            _ => Err(DirectoryError::not_found(key.to_string())),
        }
    }

    /// Raw read that also returns tombstoned rows.
    pub async fn inspect(&self, key: PhotoKey) -> DirectoryResult<Option<PhotoMapping>> {
        Ok(self.read_row(key).await?.map(|(mapping, _)| mapping))
    }

    /// Flips ACTIVE to TOMBSTONED when `cookie` matches.
    ///
    /// The cookie is checked before the state, so a wrong cookie is always a
    /// `CookieMismatch`, even on a row that is already tombstoned.
    pub async fn tombstone(&self, key: PhotoKey, cookie: &Cookie) -> DirectoryResult<TombstoneOutcome> {
        let row_key = key.row_key();

        for _ in 0..self.retry.attempts {
            let (mapping, version) = self
                .read_row(key)
                .await?
                .ok_or_else(|| DirectoryError::not_found(key.to_string()))?;

            if !mapping.cookie.matches(cookie) {
                return Err(DirectoryError::CookieMismatch {
                    key: key.to_string(),
                });
            }
            if !mapping.is_active() {
                return Ok(TombstoneOutcome::AlreadyTombstoned);
            }

            let tombstoned = PhotoMapping {
                state: MappingState::Tombstoned,
                ..mapping
            };
            let value_json = serde_json::to_string(&tombstoned)?;
            let op_id = OpId::new();

            let outcome = with_retry(&self.retry, "mapping tombstone", || {
                self.backend
                    .compare_and_set(&self.table, &op_id, &row_key, version, value_json.clone())
            })
            .await?;

            if outcome.is_applied() {
                tracing::info!("Tombstoned {}", key);
                return Ok(TombstoneOutcome::Tombstoned);
            }
            // Somebody else wrote the row in between; re-read and decide again.
            tracing::debug!("Tombstone of {} raced another writer, re-reading", key);
        }

        Err(DirectoryError::unavailable(format!(
            "tombstone of {} kept losing to concurrent writers",
            key
        )))
    }

    async fn read_row(&self, key: PhotoKey) -> DirectoryResult<Option<(PhotoMapping, u64)>> {
        let row_key = key.row_key();
        let row = with_retry(&self.retry, "mapping get", || {
            self.backend.get(&self.table, &row_key)
        })
        .await?;

        match row {
            Some(Row { value_json, version }) => {
                let mapping: PhotoMapping = serde_json::from_str(&value_json)?;
                Ok(Some((mapping, version)))
            }
            None => Ok(None),
        }
    }
}
