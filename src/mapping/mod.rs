//! Photo Mapping Module
//!
//! One record per `(photo_id, alt_key)` naming the logical volume that holds
//! the bytes. Records move `ACTIVE -> TOMBSTONED` and are never erased.
//!
//! ## Submodules
//! - **`types`**: keys, cookies, the record and its state.
//! - **`store`**: `MappingStore`, the single-key put/get/tombstone contract.

pub mod store;
pub mod types;
