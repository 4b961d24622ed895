//! Directory Service Module
//!
//! Maps `(photo_id, alt_key)` to the logical volume holding the photo, hands
//! out the deletion cookie, and serves both over HTTP.
//!
//! ## Submodules
//! - **`service`**: `DirectoryService`, composing the allocator and the mapping store.
//! - **`protocol`**: request/response bodies and route paths.
//! - **`handlers`**: the axum router for the public and operator APIs.

pub mod handlers;
pub mod protocol;
pub mod service;
