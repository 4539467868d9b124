//! Source and Channel entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    M3u,
    Xtream,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Idle,
    Ingesting,
    Success,
    Failed,
}

/// Summary of the most recent ingestion run for a [`Source`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastIngestionSummary {
    pub timestamp: DateTime<Utc>,
    pub status: IngestionStatus,
    pub channel_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub last_ingestion: Option<LastIngestionSummary>,
}

impl Source {
    pub fn needs_credentials(&self) -> bool {
        matches!(self.kind, SourceKind::Xtream)
    }

    /// The XMLTV URL an Xtream source implicitly exposes, used by the
    /// ingestion coordinator's auto-link side effect.
    pub fn derived_xmltv_url(&self) -> Option<String> {
        if self.kind != SourceKind::Xtream {
            return None;
        }
        let (username, password) = (self.username.as_ref()?, self.password.as_ref()?);
        Some(format!(
            "{}/xmltv.php?username={}&password={}",
            self.url.trim_end_matches('/'),
            urlencoding::encode(username),
            urlencoding::encode(password)
        ))
    }

    pub fn is_ingesting(&self) -> bool {
        matches!(
            self.last_ingestion.as_ref().map(|s| s.status),
            Some(IngestionStatus::Ingesting)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub source_id: Uuid,
    /// Identity key scoped to the owning source, used for collision
    /// detection and idempotent re-ingestion.
    pub external_key: String,
    pub name: String,
    pub stream_url: String,
    pub logo_url: Option<String>,
    pub channel_number: Option<u32>,
    pub group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xtream_source() -> Source {
        Source {
            id: Uuid::new_v4(),
            name: "test".into(),
            kind: SourceKind::Xtream,
            url: "http://provider.example/".into(),
            username: Some("u".into()),
            password: Some("p".into()),
            enabled: true,
            priority: 0,
            last_ingestion: None,
        }
    }

    #[test]
    fn derived_xmltv_url_requires_credentials() {
        let mut source = xtream_source();
        source.username = None;
        assert!(source.derived_xmltv_url().is_none());
    }

    #[test]
    fn derived_xmltv_url_trims_trailing_slash() {
        let source = xtream_source();
        assert_eq!(
            source.derived_xmltv_url().unwrap(),
            "http://provider.example/xmltv.php?username=u&password=p"
        );
    }

    #[test]
    fn manual_source_has_no_xmltv_url() {
        let mut source = xtream_source();
        source.kind = SourceKind::Manual;
        assert!(source.derived_xmltv_url().is_none());
    }
}
