//! Size-adaptive partitioning of a country into deliverables.
//!
//! The whole country is packaged first. When the archive is over the
//! ceiling it is discarded and the country is re-cut by admin-1 subregion:
//! region `i` takes the rows matching it and none of regions `0..i`, and a
//! final remainder takes rows matching no region, so every row lands in
//! exactly one deliverable. Any piece still over the ceiling (or a country
//! without subregions) is split into contiguous row ranges, recursively.

use std::fs;
use std::path::Path;

use tempfile::TempPath;

use crate::PartitionError;
use crate::boundary::{AdminSubregion, Boundary};
use crate::engine::{RowFilter, RowRange, SpatialEngine};
use crate::extract::MergedFile;
use crate::naming::{self, StemRegistry};
use crate::package::{DeliverableArtifact, Packager};

pub struct Partitioner<'a> {
    engine: &'a dyn SpatialEngine,
    packager: Packager<'a>,
    max_size: u64,
}

impl<'a> Partitioner<'a> {
    pub fn new(engine: &'a dyn SpatialEngine, packager: Packager<'a>, max_size: u64) -> Self {
        Self {
            engine,
            packager,
            max_size,
        }
    }

    /// Package a country's merged file into archives of at most `max_size` bytes
    pub fn partition(
        &self,
        iso3: &str,
        merged: &MergedFile,
        out_dir: &Path,
    ) -> Result<Vec<DeliverableArtifact>, PartitionError> {
        let base = naming::country_stem(iso3);
        let whole = self.packager.package(&merged.path, &base, out_dir)?;
        if whole.byte_size <= self.max_size {
            log::info!("{iso3}: single deliverable of {} bytes", whole.byte_size);
            return Ok(vec![whole]);
        }

        log::info!(
            "{iso3}: archive of {} bytes exceeds {}, splitting",
            whole.byte_size,
            self.max_size
        );
        fs::remove_file(&whole.local_path)?;

        let regions = self.engine.subregions(iso3)?;
        if regions.is_empty() {
            log::info!("{iso3}: no subregions, splitting by row count");
            return self.split_rows(&merged.path, merged.rows, &base, whole.byte_size, out_dir);
        }
        log::info!("{iso3}: splitting across {} subregions", regions.len());
        self.split_subregions(iso3, &merged.path, &regions, out_dir)
    }

    fn split_subregions(
        &self,
        iso3: &str,
        merged: &Path,
        regions: &[AdminSubregion],
        out_dir: &Path,
    ) -> Result<Vec<DeliverableArtifact>, PartitionError> {
        let mut names = StemRegistry::new(iso3);
        let mut claimed: Vec<&Boundary> = Vec::with_capacity(regions.len());
        let mut artifacts = Vec::new();

        for region in regions {
            let name = names.subregion_stem(region);
            let filter = RowFilter::within(&region.boundary).excluding(&claimed);
            artifacts.extend(self.package_filtered(merged, &filter, &name, out_dir)?);
            claimed.push(&region.boundary);
        }

        let remainder = RowFilter::outside(claimed);
        let name = naming::unassigned_stem(iso3);
        artifacts.extend(self.package_filtered(merged, &remainder, &name, out_dir)?);
        Ok(artifacts)
    }

    fn package_filtered(
        &self,
        source: &Path,
        filter: &RowFilter<'_>,
        name: &str,
        out_dir: &Path,
    ) -> Result<Vec<DeliverableArtifact>, PartitionError> {
        let columnar = TempPath::from_path(out_dir.join(format!("{name}.parquet")));
        let rows = self
            .engine
            .extract(&source.to_string_lossy(), filter, &columnar)?;
        if rows == 0 {
            log::debug!("{name}: no rows");
            return Ok(Vec::new());
        }
        log::debug!("{name}: {rows} rows");
        self.package_bounded(&columnar, rows, name, out_dir)
    }

    /// Package `columnar`, splitting by row count while the archive is too big
    fn package_bounded(
        &self,
        columnar: &Path,
        rows: u64,
        name: &str,
        out_dir: &Path,
    ) -> Result<Vec<DeliverableArtifact>, PartitionError> {
        let artifact = self.packager.package(columnar, name, out_dir)?;
        if artifact.byte_size <= self.max_size {
            return Ok(vec![artifact]);
        }
        fs::remove_file(&artifact.local_path)?;
        self.split_rows(columnar, rows, name, artifact.byte_size, out_dir)
    }

    fn split_rows(
        &self,
        columnar: &Path,
        rows: u64,
        base: &str,
        archive_size: u64,
        out_dir: &Path,
    ) -> Result<Vec<DeliverableArtifact>, PartitionError> {
        if rows <= 1 {
            return Err(PartitionError::SizeCeilingUnsatisfiable {
                name: base.to_string(),
                size: archive_size,
                max_size: self.max_size,
            });
        }

        let parts = part_count(archive_size, self.max_size);
        log::info!("{base}: {archive_size} bytes over {rows} rows, splitting into {parts} parts");

        let mut artifacts = Vec::new();
        for (i, range) in row_ranges(rows, parts).into_iter().enumerate() {
            let name = naming::part_stem(base, i + 1);
            let part = TempPath::from_path(out_dir.join(format!("{name}.parquet")));
            let copied = self.engine.copy_rows(columnar, range, &part)?;
            if copied == 0 {
                continue;
            }
            artifacts.extend(self.package_bounded(&part, copied, &name, out_dir)?);
        }
        Ok(artifacts)
    }
}

/// Parts needed for an archive of `archive_size` bytes, never fewer than two
pub fn part_count(archive_size: u64, max_size: u64) -> u64 {
    archive_size.div_ceil(max_size.max(1)).max(2)
}

/// Contiguous ranges of `ceil(total / parts)` rows covering `0..total`.
///
/// Trailing ranges that would start past the end are omitted.
pub fn row_ranges(total: u64, parts: u64) -> Vec<RowRange> {
    if total == 0 || parts == 0 {
        return Vec::new();
    }
    let per_part = total.div_ceil(parts);
    (0..parts)
        .map(|i| i * per_part)
        .take_while(|&offset| offset < total)
        .map(|offset| RowRange {
            offset,
            len: per_part.min(total - offset),
        })
        .collect()
}
