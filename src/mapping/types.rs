use crate::error::{DirectoryError, DirectoryResult};
use crate::volume::types::VolumeId;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const COOKIE_LEN: usize = 24;
pub const MAX_COOKIE_LEN: usize = 64;

/// Logical key of a mapping: the photo and which stored variant of it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PhotoKey {
    pub photo_id: u64,
    pub alt_key: u64,
}

impl PhotoKey {
    pub fn new(photo_id: u64, alt_key: u64) -> Self {
        Self { photo_id, alt_key }
    }

    /// Validates identifiers received from callers. Both must be
    /// non-negative integers.
    pub fn parse(photo_id: i64, alt_key: i64) -> DirectoryResult<Self> {
        let photo_id = u64::try_from(photo_id)
            .map_err(|_| DirectoryError::validation("photo_id", format!("{} is negative", photo_id)))?;
        let alt_key = u64::try_from(alt_key)
            .map_err(|_| DirectoryError::validation("alt_key", format!("{} is negative", alt_key)))?;
        Ok(Self { photo_id, alt_key })
    }

    /// Key of this mapping in the backing table.
    pub fn row_key(&self) -> String {
        format!("{}:{}", self.photo_id, self.alt_key)
    }
}

impl fmt::Display for PhotoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "photo {} (alt_key {})", self.photo_id, self.alt_key)
    }
}

/// Opaque token handed out at creation and required to delete.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Cookie(String);

impl Cookie {
    /// Fresh token from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(COOKIE_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Accepts a caller-supplied cookie as an opaque token.
    ///
    /// Only the length is checked here. Whether the token is right is for the
    /// stored row to decide, so a wrong token of any shape is a mismatch.
    pub fn parse(raw: &str) -> DirectoryResult<Self> {
        if raw.is_empty() || raw.len() > MAX_COOKIE_LEN {
            return Err(DirectoryError::validation(
                "cookie",
                format!("must be 1 to {} bytes", MAX_COOKIE_LEN),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison over the token bytes.
    pub fn matches(&self, other: &Cookie) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

// Never print the token itself.
impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cookie(<{} chars>)", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingState {
    Active,
    /// Terminal. Never transitions back to `Active`.
    Tombstoned,
}

/// One row of the mapping table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhotoMapping {
    pub photo_id: u64,
    pub alt_key: u64,
    pub cookie: Cookie,
    pub logical_volume_id: VolumeId,
    pub state: MappingState,
}

impl PhotoMapping {
    pub fn new_active(key: PhotoKey, cookie: Cookie, logical_volume_id: VolumeId) -> Self {
        Self {
            photo_id: key.photo_id,
            alt_key: key.alt_key,
            cookie,
            logical_volume_id,
            state: MappingState::Active,
        }
    }

    pub fn key(&self) -> PhotoKey {
        PhotoKey::new(self.photo_id, self.alt_key)
    }

    pub fn is_active(&self) -> bool {
        self.state == MappingState::Active
    }
}

/// What a successful tombstone call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstoneOutcome {
    Tombstoned,
    AlreadyTombstoned,
}
