//! The spatial query engine seam

use std::error::Error;
use std::path::Path;

use footprint_core::FailureKind;

use crate::boundary::{AdminSubregion, Boundary, CountryBoundary};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("engine I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn query(context: impl Into<String>, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Query {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Query { .. } => FailureKind::Query,
            Self::Io(e) => footprint_core::error::io_kind(e),
        }
    }
}

/// Which rows an extraction keeps.
///
/// A row matches a boundary when its bbox overlaps the boundary's envelope
/// and its geometry intersects the polygon. Rows are kept when they match
/// `include` (or `include` is `None`) and match none of `exclude`.
#[derive(Debug, Clone, Default)]
pub struct RowFilter<'a> {
    pub include: Option<&'a Boundary>,
    pub exclude: Vec<&'a Boundary>,
}

impl<'a> RowFilter<'a> {
    /// Every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn within(boundary: &'a Boundary) -> Self {
        Self {
            include: Some(boundary),
            exclude: Vec::new(),
        }
    }

    /// Rows matching none of `boundaries`
    pub fn outside(boundaries: Vec<&'a Boundary>) -> Self {
        Self {
            include: None,
            exclude: boundaries,
        }
    }

    pub fn excluding(mut self, boundaries: &[&'a Boundary]) -> Self {
        self.exclude.extend_from_slice(boundaries);
        self
    }
}

/// Contiguous slice of a file's rows, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub offset: u64,
    pub len: u64,
}

/// Spatial queries over boundary reference data and columnar building files
pub trait SpatialEngine {
    /// ISO3 codes present in the admin-0 dataset, uppercase and sorted
    fn countries(&self) -> Result<Vec<String>, EngineError>;

    /// Union of a country's admin-0 polygons; `None` when the code is unknown
    fn country_boundary(&self, iso3: &str) -> Result<Option<CountryBoundary>, EngineError>;

    /// A country's admin-1 regions ordered by region id
    fn subregions(&self, iso3: &str) -> Result<Vec<AdminSubregion>, EngineError>;

    /// Write the rows of `source` (a file or glob) matching `filter` to
    /// `output`, returning how many were written.
    fn extract(&self, source: &str, filter: &RowFilter<'_>, output: &Path)
        -> Result<u64, EngineError>;

    fn count_rows(&self, path: &Path) -> Result<u64, EngineError>;

    /// Write `range` of `source`'s rows to `output`, returning how many were written
    fn copy_rows(&self, source: &Path, range: RowRange, output: &Path) -> Result<u64, EngineError>;
}
