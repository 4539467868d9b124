//! Backup Descriptor — the record describing an on-disk archive.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::errors::AppError;

static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^tvarr-backup-(\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2})(?:\.(\d{3}))?\.tar\.gz$")
        .expect("static backup filename regex is valid")
});

/// Metadata embedded as the archive's second tar entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub tvarr_version: String,
    pub database_size: u64,
    pub compressed_size: u64,
    /// `sha256:<64 lowercase hex>` of the first-pass archive bytes (tar+gz
    /// of `database.db` plus this metadata with an empty checksum field),
    /// computed before the archive is rebuilt with this field populated.
    /// Self-referential: the final archive's own hash differs from this
    /// value by construction (see the design notes).
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub table_counts: HashMap<String, u64>,
    pub protected: bool,
    pub imported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDescriptor {
    pub filename: String,
    pub archive_size: u64,
    pub metadata: BackupMetadata,
}

impl BackupDescriptor {
    pub fn checksum(&self) -> &str {
        &self.metadata.checksum
    }

    pub fn protected(&self) -> bool {
        self.metadata.protected
    }
}

/// Validate that a user-supplied filename is a bare filename (no path
/// separators or traversal) before it is ever joined to the backup
/// directory.
pub fn validate_backup_filename(filename: &str) -> Result<(), AppError> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(AppError::invalid_filename(filename));
    }
    Ok(())
}

/// Build the canonical filename for a backup taken at `when`, including
/// millisecond precision as the spec's regex requires.
pub fn backup_filename(when: DateTime<Utc>) -> String {
    format!("tvarr-backup-{}.tar.gz", when.format("%Y-%m-%dT%H-%M-%S%.3f"))
}

/// Parse the UTC timestamp embedded in a canonical backup filename,
/// used when metadata can't be read (legacy format, or directory-scan
/// fallback).
pub fn parse_backup_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    let caps = FILENAME_PATTERN.captures(filename)?;
    let date_part = &caps[1];
    let millis = caps.get(2).map(|m| m.as_str()).unwrap_or("000");
    let combined = format!("{date_part}.{millis}");
    chrono::NaiveDateTime::parse_from_str(&combined, "%Y-%m-%dT%H-%M-%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn is_canonical_backup_filename(filename: &str) -> bool {
    FILENAME_PATTERN.is_match(filename)
}
