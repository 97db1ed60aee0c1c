//! Parquet file checks and scratch-space housekeeping

use std::fs::{self, File};
use std::io;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};

/// Prefix of per-shard scratch directories under the scratch root
pub const SCRATCH_PREFIX: &str = "shard-";

/// Check if a parquet file exists and has a valid footer
pub fn is_valid_parquet(path: &Path) -> bool {
    File::open(path)
        .ok()
        .is_some_and(|f| SerializedFileReader::new(f).is_ok())
}

/// Row count from the parquet footer, without reading data pages
pub fn parquet_row_count(path: &Path) -> io::Result<u64> {
    let reader = SerializedFileReader::new(File::open(path)?)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let rows = reader.metadata().file_metadata().num_rows();
    Ok(u64::try_from(rows).unwrap_or(0))
}

/// Remove shard scratch directories left behind by an interrupted run
pub fn remove_stale_scratch(scratch_root: &Path) -> io::Result<usize> {
    if !scratch_root.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(scratch_root)? {
        let entry = entry?;
        let path = entry.path();
        let stale = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SCRATCH_PREFIX));
        if stale {
            log::warn!("Removing stale scratch dir: {}", path.display());
            fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
