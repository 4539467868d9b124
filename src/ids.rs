//! Sortable identifiers.
//!
//! Backup filenames, job ids and progress operation ids all need an
//! identifier that sorts lexicographically in creation order without a
//! round-trip to storage. [`SortableId`] wraps a ULID for that purpose; it
//! is interchangeable with a [`uuid::Uuid`] wherever only uniqueness
//! matters, but additionally orders by time of generation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A 128-bit, time-ordered identifier rendered as a 26-character
/// Crockford base32 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortableId(Ulid);

impl SortableId {
    /// Generate a new id from the current time.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// The all-zero id, used as an "unset" sentinel in places that predate
    /// assigning a real one (e.g. a `ScheduledJob` before it is enqueued).
    pub fn nil() -> Self {
        Self(Ulid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0 == Ulid::nil()
    }

    pub fn as_uuid(&self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.0.to_bytes())
    }
}

impl Default for SortableId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SortableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SortableId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

impl From<Ulid> for SortableId {
    fn from(u: Ulid) -> Self {
        Self(u)
    }
}
