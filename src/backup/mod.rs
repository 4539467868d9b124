//! Backup Engine: tar+gzip archive create/restore with atomic swap,
//! retention cleanup, import, and protection toggling (§4.5).

mod archive;
mod engine;
mod snapshot;

pub use engine::BackupEngine;
pub use snapshot::{DatabaseSnapshotter, FileDatabaseSnapshotter};
