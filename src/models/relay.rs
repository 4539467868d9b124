//! Relay Session entity (the durable-shaped description; the live ring
//! buffer and task handles live in [`crate::relay`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    DirectPlayable,
    Hls,
    MpegTs,
    NeedsTranscode,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelaySessionKey {
    pub channel_id: Uuid,
    pub profile_id: Option<Uuid>,
}

impl RelaySessionKey {
    pub fn new(channel_id: Uuid, profile_id: Option<Uuid>) -> Self {
        Self { channel_id, profile_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySessionDescriptor {
    pub session_id: Uuid,
    pub channel_id: Uuid,
    pub origin_url: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub client_count: usize,
}
