//! Database snapshot seam.
//!
//! The database engine itself is out of scope for this crate (§1 treats
//! storage as an abstract mapping from entity to persisted rows);
//! `DatabaseSnapshotter` is the narrow interface the Backup Engine needs
//! from whatever owns the live database file, so the create/restore
//! protocols can be expressed and tested without a real SQLite binding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::AppResult;

#[async_trait]
pub trait DatabaseSnapshotter: Send + Sync {
    /// Path to the live database file the engine backs up and restores.
    fn live_db_path(&self) -> PathBuf;

    /// Write a consistent snapshot of the live database to `dest` (the
    /// storage layer would use `VACUUM INTO`; that detail stays hidden
    /// behind this seam).
    async fn snapshot_to(&self, dest: &Path) -> AppResult<()>;

    /// Row counts per table, embedded in backup metadata.
    async fn table_counts(&self) -> AppResult<HashMap<String, u64>>;

    /// Integrity-check a database file, which need not be the live one —
    /// used against a freshly extracted restore candidate.
    async fn integrity_check(&self, path: &Path) -> AppResult<bool>;

    /// Atomically replace the live database with `new_path`, rolling
    /// back to the prior file if the swap's second rename fails.
    async fn swap_in(&self, new_path: &Path) -> AppResult<()>;
}

/// Plain-file-copy snapshotter: stands in for a real SQLite binding in
/// this crate's scope, backed by ordinary file rename/copy semantics.
pub struct FileDatabaseSnapshotter {
    live_path: PathBuf,
}

impl FileDatabaseSnapshotter {
    pub fn new(live_path: PathBuf) -> Self {
        Self { live_path }
    }
}

#[async_trait]
impl DatabaseSnapshotter for FileDatabaseSnapshotter {
    fn live_db_path(&self) -> PathBuf {
        self.live_path.clone()
    }

    async fn snapshot_to(&self, dest: &Path) -> AppResult<()> {
        tokio::fs::copy(&self.live_path, dest).await?;
        Ok(())
    }

    async fn table_counts(&self) -> AppResult<HashMap<String, u64>> {
        Ok(HashMap::new())
    }

    async fn integrity_check(&self, path: &Path) -> AppResult<bool> {
        Ok(tokio::fs::metadata(path).await.is_ok())
    }

    async fn swap_in(&self, new_path: &Path) -> AppResult<()> {
        let old = self.live_path.with_extension("old");
        let had_live = tokio::fs::metadata(&self.live_path).await.is_ok();
        if had_live {
            tokio::fs::rename(&self.live_path, &old).await?;
        }
        match tokio::fs::rename(new_path, &self.live_path).await {
            Ok(()) => {
                if had_live {
                    let _ = tokio::fs::remove_file(&old).await;
                }
                Ok(())
            }
            Err(err) => {
                if had_live {
                    let _ = tokio::fs::rename(&old, &self.live_path).await;
                }
                Err(err.into())
            }
        }
    }
}
