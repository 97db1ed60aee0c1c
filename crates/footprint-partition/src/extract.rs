//! Country extraction from the uploaded corpus

use std::path::Path;

use tempfile::TempPath;

use crate::PartitionError;
use crate::engine::{RowFilter, SpatialEngine};
use crate::naming;

/// A country's buildings in one columnar file, removed on drop
#[derive(Debug)]
pub struct MergedFile {
    pub path: TempPath,
    pub rows: u64,
}

/// Extract every corpus row intersecting `iso3`'s boundary into
/// `{out_dir}/{iso3}_buildings.parquet`.
///
/// Returns `Ok(None)` when no row intersects; nothing is left on disk then.
pub fn extract_country(
    engine: &dyn SpatialEngine,
    iso3: &str,
    corpus_glob: &str,
    out_dir: &Path,
) -> Result<Option<MergedFile>, PartitionError> {
    let country = engine
        .country_boundary(iso3)?
        .ok_or_else(|| PartitionError::CountryNotFound {
            iso3: iso3.to_string(),
        })?;

    let path = TempPath::from_path(
        out_dir.join(format!("{}.parquet", naming::country_stem(iso3))),
    );
    log::info!("{iso3}: extracting buildings from {corpus_glob}");
    let rows = engine.extract(corpus_glob, &RowFilter::within(&country.boundary), &path)?;
    if rows == 0 {
        log::info!("{iso3}: no buildings intersect the boundary");
        return Ok(None);
    }
    log::info!("{iso3}: {rows} buildings extracted");
    Ok(Some(MergedFile { path, rows }))
}
