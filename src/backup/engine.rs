//! Backup Engine: atomic, self-describing archive create/restore with
//! rollback, retention cleanup, import, and protection toggling.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::archive;
use super::snapshot::DatabaseSnapshotter;
use crate::config::BackupConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    backup_filename, is_canonical_backup_filename, parse_backup_timestamp, validate_backup_filename, BackupDescriptor,
    BackupMetadata,
};
use crate::repositories::SettingsRepository;

const MIN_FREE_BYTES: u64 = 100 * 1024 * 1024;
const RETENTION_SETTING_KEY: &str = "backup.retention_count";

pub struct BackupEngine {
    config: BackupConfig,
    snapshotter: Arc<dyn DatabaseSnapshotter>,
    settings: Arc<dyn SettingsRepository>,
}

impl BackupEngine {
    pub fn new(config: BackupConfig, snapshotter: Arc<dyn DatabaseSnapshotter>, settings: Arc<dyn SettingsRepository>) -> Self {
        Self { config, snapshotter, settings }
    }

    /// §4.5 create protocol: snapshot, archive, checksum-rewrite.
    pub async fn create(&self) -> AppResult<BackupDescriptor> {
        tokio::fs::create_dir_all(&self.config.directory).await?;

        let available = free_space_bytes(&self.config.directory);
        if available < MIN_FREE_BYTES {
            return Err(AppError::insufficient_disk_space(available, MIN_FREE_BYTES));
        }

        let filename = backup_filename(Utc::now());
        let dest = self.config.directory.join(&filename);
        if tokio::fs::metadata(&dest).await.is_ok() {
            return Err(AppError::backup_exists(&filename));
        }

        let snapshot_path = self.config.directory.join(format!("{filename}.snapshot.db"));
        self.snapshotter.snapshot_to(&snapshot_path).await?;
        let db_bytes = tokio::fs::read(&snapshot_path).await?;
        let table_counts = self.snapshotter.table_counts().await?;

        let mut metadata = BackupMetadata {
            tvarr_version: env!("CARGO_PKG_VERSION").to_string(),
            database_size: db_bytes.len() as u64,
            compressed_size: 0,
            checksum: String::new(),
            created_at: Utc::now(),
            table_counts,
            protected: false,
            imported: false,
        };

        let first_pass = archive::build_archive(&db_bytes, &metadata)?;
        let mut hasher = Sha256::new();
        hasher.update(&first_pass);
        metadata.checksum = format!("sha256:{}", hex::encode(hasher.finalize()));
        metadata.compressed_size = first_pass.len() as u64;

        let final_archive = archive::build_archive(&db_bytes, &metadata)?;
        tokio::fs::write(&dest, &final_archive).await?;
        tokio::fs::remove_file(&snapshot_path).await?;

        info!(filename = %filename, size = final_archive.len(), "backup created");
        Ok(BackupDescriptor { filename, archive_size: final_archive.len() as u64, metadata })
    }

    /// Newest-first listing, covering both archive formats.
    pub async fn list(&self) -> AppResult<Vec<BackupDescriptor>> {
        let mut descriptors = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.config.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(descriptors),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if is_canonical_backup_filename(&filename) {
                match self.read_descriptor(&entry.path(), &filename).await {
                    Ok(descriptor) => descriptors.push(descriptor),
                    Err(err) => warn!(filename = %filename, error = %err, "skipping unreadable backup"),
                }
            } else if let Some(stem) = filename.strip_suffix(".db.gz") {
                descriptors.push(self.legacy_descriptor(&entry, &filename, stem).await);
            }
        }

        descriptors.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        Ok(descriptors)
    }

    async fn read_descriptor(&self, path: &Path, filename: &str) -> AppResult<BackupDescriptor> {
        let bytes = tokio::fs::read(path).await?;
        let extracted = archive::read_archive(&bytes)?;
        Ok(BackupDescriptor { filename: filename.to_string(), archive_size: bytes.len() as u64, metadata: extracted.metadata })
    }

    async fn legacy_descriptor(&self, entry: &tokio::fs::DirEntry, filename: &str, stem: &str) -> BackupDescriptor {
        let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
        let sidecar = self.config.directory.join(format!("{stem}.meta.json"));
        let metadata = match tokio::fs::read(&sidecar).await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(_) => None,
        };
        let metadata = metadata.unwrap_or_else(|| BackupMetadata {
            tvarr_version: "unknown".to_string(),
            database_size: 0,
            compressed_size: size,
            checksum: String::new(),
            created_at: parse_backup_timestamp(filename).unwrap_or_else(Utc::now),
            table_counts: Default::default(),
            protected: false,
            imported: false,
        });
        BackupDescriptor { filename: filename.to_string(), archive_size: size, metadata }
    }

    /// §4.5 restore protocol: pre-restore backup, extract, integrity
    /// check, atomic swap with rollback.
    pub async fn restore(&self, filename: &str) -> AppResult<()> {
        validate_backup_filename(filename)?;
        let path = self.config.directory.join(filename);
        let bytes = tokio::fs::read(&path).await.map_err(|_| AppError::not_found("backup", filename))?;

        let database = if is_canonical_backup_filename(filename) {
            archive::read_archive(&bytes)?.database
        } else {
            self.extract_legacy(filename, &bytes).await?
        };

        // A failed pre-restore backup aborts the whole restore.
        self.create().await?;

        let temp_path = self.config.directory.join(format!("{filename}.restore.db"));
        tokio::fs::write(&temp_path, &database).await?;

        if !self.snapshotter.integrity_check(&temp_path).await? {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(AppError::integrity_check_failed("not ok"));
        }

        self.snapshotter.swap_in(&temp_path).await?;
        info!(filename, "database restored");
        Ok(())
    }

    async fn extract_legacy(&self, filename: &str, bytes: &[u8]) -> AppResult<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let stem = filename.strip_suffix(".db.gz").unwrap_or(filename);
        let sidecar = self.config.directory.join(format!("{stem}.meta.json"));
        if let Ok(meta_bytes) = tokio::fs::read(&sidecar).await {
            let metadata: BackupMetadata = serde_json::from_slice(&meta_bytes)?;
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let actual = format!("sha256:{}", hex::encode(hasher.finalize()));
            if !metadata.checksum.is_empty() && metadata.checksum != actual {
                return Err(AppError::checksum_mismatch());
            }
        }

        let mut decoder = GzDecoder::new(bytes);
        let mut database = Vec::new();
        decoder.read_to_end(&mut database)?;
        Ok(database)
    }

    /// Reads effective retention N (DB override, falling back to file
    /// config) and deletes all-but-the-newest-N unprotected backups.
    pub async fn cleanup_old_backups(&self) -> AppResult<usize> {
        let retention = match self.settings.get(RETENTION_SETTING_KEY).await? {
            Some(value) => value.parse().unwrap_or(self.config.schedule.retention_count),
            None => self.config.schedule.retention_count,
        };
        if retention == 0 {
            return Ok(0);
        }

        let mut backups = self.list().await?;
        backups.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));

        let mut kept_unprotected = 0usize;
        let mut deleted = 0usize;
        for backup in backups {
            if backup.protected() {
                continue;
            }
            if kept_unprotected < retention {
                kept_unprotected += 1;
                continue;
            }
            let path = self.config.directory.join(&backup.filename);
            if tokio::fs::remove_file(&path).await.is_ok() {
                deleted += 1;
            }
        }
        info!(deleted, retention, "backup retention cleanup complete");
        Ok(deleted)
    }

    /// Accepts an uploaded archive, validates its shape, and marks it
    /// `imported=true, protected=true`.
    pub async fn import(&self, filename: &str, bytes: Vec<u8>) -> AppResult<BackupDescriptor> {
        validate_backup_filename(filename)?;
        let dest = self.config.directory.join(filename);
        if tokio::fs::metadata(&dest).await.is_ok() {
            return Err(AppError::backup_exists(filename));
        }

        if is_canonical_backup_filename(filename) {
            let mut extracted = archive::read_archive(&bytes)?;
            extracted.metadata.imported = true;
            extracted.metadata.protected = true;
            let archive_bytes = archive::build_archive(&extracted.database, &extracted.metadata)?;
            tokio::fs::write(&dest, &archive_bytes).await?;
            Ok(BackupDescriptor { filename: filename.to_string(), archive_size: archive_bytes.len() as u64, metadata: extracted.metadata })
        } else if filename.ends_with(".db.gz") {
            let database = self.extract_legacy(filename, &bytes).await?;
            let temp = self.config.directory.join(format!("{filename}.check"));
            tokio::fs::write(&temp, &database).await?;
            let ok = self.snapshotter.integrity_check(&temp).await?;
            let _ = tokio::fs::remove_file(&temp).await;
            if !ok {
                return Err(AppError::integrity_check_failed("not ok"));
            }
            tokio::fs::write(&dest, &bytes).await?;
            let metadata = BackupMetadata {
                tvarr_version: "unknown".to_string(),
                database_size: database.len() as u64,
                compressed_size: bytes.len() as u64,
                checksum: String::new(),
                created_at: Utc::now(),
                table_counts: Default::default(),
                protected: true,
                imported: true,
            };
            Ok(BackupDescriptor { filename: filename.to_string(), archive_size: bytes.len() as u64, metadata })
        } else {
            Err(AppError::invalid_filename(filename))
        }
    }

    /// Toggle the `protected` flag on a new-format archive by
    /// regenerating it with updated metadata.
    pub async fn set_protected(&self, filename: &str, protected: bool) -> AppResult<BackupDescriptor> {
        validate_backup_filename(filename)?;
        if !is_canonical_backup_filename(filename) {
            return Err(AppError::invalid_argument("protection toggle requires a new-format archive"));
        }
        let path = self.config.directory.join(filename);
        let bytes = tokio::fs::read(&path).await?;
        let mut extracted = archive::read_archive(&bytes)?;
        extracted.metadata.protected = protected;

        let archive_bytes = archive::build_archive(&extracted.database, &extracted.metadata)?;
        let temp = path.with_extension("tar.gz.tmp");
        tokio::fs::write(&temp, &archive_bytes).await?;
        tokio::fs::rename(&temp, &path).await?;

        Ok(BackupDescriptor { filename: filename.to_string(), archive_size: archive_bytes.len() as u64, metadata: extracted.metadata })
    }
}

fn free_space_bytes(path: &Path) -> u64 {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackupScheduleConfig;
    use crate::repositories::InMemorySettingsRepository;

    async fn engine_with_tempdir() -> (tempfile::TempDir, BackupEngine) {
        let dir = tempfile::tempdir().unwrap();
        let live_db = dir.path().join("live.db");
        tokio::fs::write(&live_db, b"sqlite-bytes-stand-in").await.unwrap();

        let config = BackupConfig {
            directory: dir.path().join("backups"),
            schedule: BackupScheduleConfig { enabled: false, cron: "0 0 3 * * *".to_string(), retention_count: 2 },
        };
        let snapshotter = Arc::new(super::super::snapshot::FileDatabaseSnapshotter::new(live_db));
        let settings = Arc::new(InMemorySettingsRepository::default());
        (dir, BackupEngine::new(config, snapshotter, settings))
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let (_dir, engine) = engine_with_tempdir().await;
        let created = engine.create().await.unwrap();
        let listed = engine.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, created.filename);
        assert!(listed[0].metadata.checksum.starts_with("sha256:"));
    }

    #[tokio::test]
    async fn cleanup_retains_newest_n_unprotected() {
        let (_dir, engine) = engine_with_tempdir().await;
        for _ in 0..4 {
            engine.create().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let deleted = engine.cleanup_old_backups().await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(engine.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn protected_backups_survive_cleanup() {
        let (_dir, engine) = engine_with_tempdir().await;
        let first = engine.create().await.unwrap();
        engine.set_protected(&first.filename, true).await.unwrap();
        for _ in 0..3 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            engine.create().await.unwrap();
        }

        engine.cleanup_old_backups().await.unwrap();
        let remaining: Vec<_> = engine.list().await.unwrap();
        assert!(remaining.iter().any(|b| b.filename == first.filename));
    }

    #[tokio::test]
    async fn restore_rejects_path_traversal_filename() {
        let (_dir, engine) = engine_with_tempdir().await;
        let err = engine.restore("../../etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::InvalidArgument);
    }
}
