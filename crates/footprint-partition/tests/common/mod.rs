#![allow(dead_code)]

//! In-memory stand-ins for DuckDB, GDAL and zip.
//!
//! "Columnar" files are JSON lines padded to a fixed width, so a file's
//! size is proportional to its row count; the fake archiver copies the
//! rows behind an optional fixed-size header.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use footprint_core::convert::{ConversionError, Target};
use footprint_core::{ArchiveError, ArchivePackager, ConvertOptions, FormatConverter};
use footprint_partition::{
    AdminSubregion, Boundary, CountryBoundary, EngineError, Envelope, RowFilter, RowRange,
    SpatialEngine,
};
use geo::{BoundingRect, Geometry, Intersects};
use serde::{Deserialize, Serialize};
use wkt::TryFromWkt;

/// Bytes per stored row, newline included
pub const ROW_WIDTH: u64 = 160;

const LAYER_FILE: &str = "layer.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub wkt: String,
}

impl Row {
    /// Axis-aligned square of side `size` with its lower-left corner at (x, y)
    pub fn square(id: impl Into<String>, x: f64, y: f64, size: f64) -> Self {
        let (x2, y2) = (x + size, y + size);
        Self {
            id: id.into(),
            wkt: format!("POLYGON(({x} {y},{x2} {y},{x2} {y2},{x} {y2},{x} {y}))"),
        }
    }
}

pub fn write_rows(path: &Path, rows: &[Row]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut out = fs::File::create(path).unwrap();
    for row in rows {
        let json = serde_json::to_string(row).unwrap();
        assert!((json.len() as u64) < ROW_WIDTH, "row too wide: {json}");
        writeln!(out, "{json:<width$}", width = ROW_WIDTH as usize - 1).unwrap();
    }
}

/// Rows of a columnar file or archive, skipping padding lines
pub fn read_rows(path: &Path) -> Vec<Row> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

pub fn parse(wkt: &str) -> Geometry<f64> {
    Geometry::try_from_wkt_str(wkt).unwrap()
}

pub fn rect_boundary(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Boundary {
    Boundary {
        envelope: Envelope::new(xmin, ymin, xmax, ymax),
        wkt: format!(
            "POLYGON(({xmin} {ymin},{xmax} {ymin},{xmax} {ymax},{xmin} {ymax},{xmin} {ymin}))"
        ),
    }
}

pub fn region(id: &str, name: &str, boundary: Boundary) -> AdminSubregion {
    AdminSubregion {
        region_id: id.into(),
        source_name: Some("test".into()),
        display_name: Some(name.into()),
        boundary,
    }
}

/// [`SpatialEngine`] evaluating filters with `geo`
#[derive(Default)]
pub struct FakeEngine {
    countries: BTreeMap<String, Boundary>,
    subregions: HashMap<String, Vec<AdminSubregion>>,
    polygon_only: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(mut self, iso3: &str, boundary: Boundary) -> Self {
        self.countries.insert(iso3.to_string(), boundary);
        self
    }

    pub fn with_subregions(mut self, iso3: &str, regions: Vec<AdminSubregion>) -> Self {
        self.subregions.insert(iso3.to_string(), regions);
        self
    }

    /// Skip the bbox pre-filter and test polygons only
    pub fn without_bbox_prefilter(mut self) -> Self {
        self.polygon_only = true;
        self
    }

    pub fn matches(&self, geom: &Geometry<f64>, boundary: &Boundary) -> bool {
        if !self.polygon_only {
            let Some(rect) = geom.bounding_rect() else {
                return false;
            };
            let env = Envelope::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
            if !env.overlaps(&boundary.envelope) {
                return false;
            }
        }
        geom.intersects(&parse(&boundary.wkt))
    }

    pub fn keeps(&self, row: &Row, filter: &RowFilter<'_>) -> bool {
        let geom = parse(&row.wkt);
        filter.include.map_or(true, |b| self.matches(&geom, b))
            && !filter.exclude.iter().any(|b| self.matches(&geom, b))
    }
}

impl SpatialEngine for FakeEngine {
    fn countries(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.countries.keys().cloned().collect())
    }

    fn country_boundary(&self, iso3: &str) -> Result<Option<CountryBoundary>, EngineError> {
        Ok(self.countries.get(iso3).map(|b| CountryBoundary {
            iso3: iso3.to_string(),
            boundary: b.clone(),
        }))
    }

    fn subregions(&self, iso3: &str) -> Result<Vec<AdminSubregion>, EngineError> {
        Ok(self.subregions.get(iso3).cloned().unwrap_or_default())
    }

    fn extract(
        &self,
        source: &str,
        filter: &RowFilter<'_>,
        output: &Path,
    ) -> Result<u64, EngineError> {
        let files: Vec<_> = glob::glob(source)
            .map_err(|e| EngineError::query("globbing", e))?
            .filter_map(Result::ok)
            .collect();
        if files.is_empty() {
            return Err(EngineError::query("reading source", format!("no files match {source}")));
        }
        let kept: Vec<Row> = files
            .iter()
            .flat_map(|f| read_rows(f))
            .filter(|r| self.keeps(r, filter))
            .collect();
        write_rows(output, &kept);
        Ok(kept.len() as u64)
    }

    fn count_rows(&self, path: &Path) -> Result<u64, EngineError> {
        Ok(read_rows(path).len() as u64)
    }

    fn copy_rows(&self, source: &Path, range: RowRange, output: &Path) -> Result<u64, EngineError> {
        let rows: Vec<Row> = read_rows(source)
            .into_iter()
            .skip(range.offset as usize)
            .take(range.len as usize)
            .collect();
        write_rows(output, &rows);
        Ok(rows.len() as u64)
    }
}

/// Puts the columnar file inside the `.gdb` directory unchanged
#[derive(Default)]
pub struct FakeConverter {
    pub calls: AtomicUsize,
}

impl FormatConverter for FakeConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), ConversionError> {
        assert!(matches!(options.target, Target::FileGeodatabase { .. }));
        self.calls.fetch_add(1, Ordering::SeqCst);
        fs::create_dir_all(output).unwrap();
        fs::copy(input, output.join(LAYER_FILE)).unwrap();
        Ok(())
    }
}

/// Archive = `overhead` padding bytes followed by the layer's rows
#[derive(Default)]
pub struct FakeArchiver {
    pub overhead: u64,
}

impl ArchivePackager for FakeArchiver {
    fn pack_dir(&self, dir: &Path, archive: &Path) -> Result<u64, ArchiveError> {
        let rows = fs::read(dir.join(LAYER_FILE))?;
        let mut out = fs::File::create(archive)?;
        if self.overhead > 0 {
            let mut header = vec![b' '; self.overhead as usize - 1];
            header.push(b'\n');
            out.write_all(&header)?;
        }
        out.write_all(&rows)?;
        Ok(fs::metadata(archive)?.len())
    }
}

/// Archive size for `rows` rows
pub fn archive_size(rows: u64, overhead: u64) -> u64 {
    rows * ROW_WIDTH + overhead
}
