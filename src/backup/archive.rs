//! Archive format: gzip-compressed tar with exactly two entries,
//! `database.db` then `metadata.json`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, Header};

use crate::errors::{AppError, AppResult};
use crate::models::BackupMetadata;

pub fn build_archive(db_bytes: &[u8], metadata: &BackupMetadata) -> AppResult<Vec<u8>> {
    let metadata_json = serde_json::to_vec_pretty(metadata)?;

    let mut tar_bytes = Vec::new();
    {
        let mut builder = Builder::new(&mut tar_bytes);
        append_entry(&mut builder, "database.db", db_bytes)?;
        append_entry(&mut builder, "metadata.json", &metadata_json)?;
        builder.finish()?;
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes)?;
    Ok(encoder.finish()?)
}

fn append_entry<W: Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> AppResult<()> {
    let mut header = Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, bytes)?;
    Ok(())
}

pub struct ExtractedArchive {
    pub database: Vec<u8>,
    pub metadata: BackupMetadata,
}

/// Unpack a new-format archive, rejecting anything missing either entry.
pub fn read_archive(bytes: &[u8]) -> AppResult<ExtractedArchive> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = Archive::new(decoder);

    let mut database = None;
    let mut metadata = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        match path.as_str() {
            "database.db" => database = Some(buf),
            "metadata.json" => metadata = Some(serde_json::from_slice(&buf)?),
            _ => {}
        }
    }

    let database = database.ok_or_else(|| AppError::archive_corrupt("missing database.db entry"))?;
    let metadata = metadata.ok_or_else(|| AppError::archive_corrupt("missing metadata.json entry"))?;
    Ok(ExtractedArchive { database, metadata })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_metadata() -> BackupMetadata {
        BackupMetadata {
            tvarr_version: "0.1.0".to_string(),
            database_size: 4,
            compressed_size: 0,
            checksum: String::new(),
            created_at: Utc::now(),
            table_counts: HashMap::new(),
            protected: false,
            imported: false,
        }
    }

    #[test]
    fn round_trips_database_and_metadata() {
        let db = b"fake-sqlite-bytes".to_vec();
        let archive = build_archive(&db, &sample_metadata()).unwrap();
        let extracted = read_archive(&archive).unwrap();
        assert_eq!(extracted.database, db);
        assert_eq!(extracted.metadata.tvarr_version, "0.1.0");
    }

    #[test]
    fn rejects_archives_missing_an_entry() {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            append_entry(&mut builder, "database.db", b"only-one-entry").unwrap();
            builder.finish().unwrap();
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let archive = encoder.finish().unwrap();

        assert!(read_archive(&archive).is_err());
    }
}
