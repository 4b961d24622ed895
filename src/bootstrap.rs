//! Schema provisioning for the directory's two tables.
//!
//! Safe to run on every start: existing keyspaces and tables are reported as
//! `AlreadyExists` and left alone.

use crate::config::StoreConfig;
use crate::error::DirectoryResult;
use crate::retry::{RetryPolicy, with_retry};
use crate::storage::backend::TableBackend;
use crate::storage::types::{ColumnSpec, ColumnType, KeyspaceSpec, SchemaChange, TableRef, TableSpec};

use serde::Serialize;

pub const MAPPING_TABLE: &str = "photo_mappings";
pub const VOLUME_TABLE: &str = "logical_volumes";

pub fn mapping_table_spec() -> TableSpec {
    TableSpec {
        name: MAPPING_TABLE.to_string(),
        primary_key: vec!["photo_id".to_string(), "alt_key".to_string()],
        columns: vec![
            ColumnSpec::new("photo_id", ColumnType::BigInt),
            ColumnSpec::new("alt_key", ColumnType::BigInt),
            ColumnSpec::new("cookie", ColumnType::Text),
            ColumnSpec::new("logical_volume_id", ColumnType::BigInt),
            ColumnSpec::new("state", ColumnType::Text),
        ],
    }
}

pub fn volume_table_spec() -> TableSpec {
    TableSpec {
        name: VOLUME_TABLE.to_string(),
        primary_key: vec!["volume_id".to_string()],
        columns: vec![
            ColumnSpec::new("volume_id", ColumnType::BigInt),
            ColumnSpec::new("capacity_bytes", ColumnType::BigInt),
            ColumnSpec::new("used_bytes", ColumnType::BigInt),
            ColumnSpec::new("write_enabled", ColumnType::Boolean),
        ],
    }
}

pub fn mapping_table_ref(keyspace: &str) -> TableRef {
    TableRef::new(keyspace, MAPPING_TABLE)
}

pub fn volume_table_ref(keyspace: &str) -> TableRef {
    TableRef::new(keyspace, VOLUME_TABLE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub keyspace: SchemaChange,
    pub mapping_table: SchemaChange,
    pub volume_table: SchemaChange,
}

impl BootstrapReport {
    pub fn created_anything(&self) -> bool {
        [self.keyspace, self.mapping_table, self.volume_table]
            .iter()
            .any(|c| *c == SchemaChange::Created)
    }
}

/// Ensures the keyspace and both tables exist.
pub async fn ensure_schema(
    backend: &dyn TableBackend,
    store: &StoreConfig,
    retry: &RetryPolicy,
) -> DirectoryResult<BootstrapReport> {
    let keyspace_spec = KeyspaceSpec {
        name: store.keyspace.clone(),
        replication_factor: store.replication_factor,
    };
    let keyspace = with_retry(retry, "create keyspace", || backend.create_keyspace(&keyspace_spec)).await?;

    let mapping_spec = mapping_table_spec();
    let mapping_table = with_retry(retry, "create mapping table", || {
        backend.create_table(&store.keyspace, &mapping_spec)
    })
    .await?;

    let volume_spec = volume_table_spec();
    let volume_table = with_retry(retry, "create volume table", || {
        backend.create_table(&store.keyspace, &volume_spec)
    })
    .await?;

    let report = BootstrapReport {
        keyspace,
        mapping_table,
        volume_table,
    };

    if report.created_anything() {
        tracing::info!(
            "Bootstrapped keyspace '{}' (replication factor {}): {:?}",
            store.keyspace,
            store.replication_factor,
            report
        );
    } else {
        tracing::info!("Schema for keyspace '{}' already in place", store.keyspace);
    }

    Ok(report)
}
