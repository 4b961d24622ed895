//! Logical Volume Module
//!
//! Capacity accounting for the store tier's logical volumes. Volume rows are
//! provisioned by operators; the allocator only ever moves `used_bytes` up and
//! `write_enabled` from true to false.

pub mod allocator;
pub mod types;

#[cfg(test)]
mod tests;
