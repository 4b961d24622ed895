//! Backing Table Store
//!
//! The durable key-value layer the directory runs on.
//!
//! ## Core Concepts
//! - **Partitioning**: Row keys hash into fixed partitions (`PartitionManager`); a partition
//!   is the unit of in-process sharding and of routing between table servers.
//! - **Conditional writes**: `insert_if_absent` and version `compare_and_set` are the only
//!   primitives the directory needs for per-key consistency. No cross-key transactions.
//! - **Replayable mutations**: each mutation carries an `OpId`; a repeat returns the first outcome.
//! - **Access**: `TableBackend` is the injected handle. `MemoryBackend` keeps tables in-process,
//!   `RemoteBackend` reaches table servers (a `MemoryBackend` behind `handlers::routes`).

pub mod backend;
pub mod handlers;
pub mod memory;
pub mod partitioner;
pub mod protocol;
pub mod remote;
pub mod types;


use crate::config::StoreConfig;
use crate::error::DirectoryResult;
use backend::TableBackend;
use memory::MemoryBackend;
use remote::RemoteBackend;

use std::sync::Arc;
use std::time::Duration;

/// Builds the process-wide storage handle from configuration.
pub fn connect(config: &StoreConfig, call_timeout: Duration) -> DirectoryResult<Arc<dyn TableBackend>> {
    if config.endpoints.is_empty() {
        tracing::info!("No table servers configured, using an in-process table");
        return Ok(Arc::new(MemoryBackend::new()));
    }

    let backend = RemoteBackend::new(&config.endpoints, call_timeout)?;
    tracing::info!("Using table servers: {:?}", backend.endpoints());
    Ok(Arc::new(backend))
}
