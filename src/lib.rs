//! Haystack Photo Directory Library
//!
//! This library crate defines the modules of the photo directory: the metadata
//! service that records which logical volume holds each stored photo, and the
//! table servers it keeps that metadata on. It serves as the foundation for the
//! binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`directory`**: The public operations (create, lookup, delete) and their HTTP
//!   surface, plus the operator API for volumes.
//! - **`mapping`**: `(photo_id, alt_key) -> volume` records with their cookies and the
//!   ACTIVE/TOMBSTONED lifecycle.
//! - **`volume`**: Logical volume capacity accounting and weighted-random placement
//!   with compare-and-set reservations.
//! - **`storage`**: The backing table store. A partitioned in-process table, a table
//!   server exposing it over HTTP, and a client that routes keys across servers.
//! - **`bootstrap`**: Idempotent keyspace and table provisioning.
//! - **`config`**, **`error`**, **`retry`**: Settings, the error taxonomy, and the
//!   deadline/backoff wrapper every store call goes through.

pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod error;
pub mod mapping;
pub mod retry;
pub mod storage;
pub mod volume;

#[cfg(test)]
mod test_support;
