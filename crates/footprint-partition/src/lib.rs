//! Footprint Partition - Cut the uploaded corpus into per-country deliverables
//!
//! For each country the matching buildings are extracted into one columnar
//! file, packaged as a zipped File Geodatabase and, when that archive is
//! too large, split by admin-1 subregion and then by row count until every
//! deliverable fits under the size ceiling.

pub mod boundary;
pub mod catalog;
pub mod duck;
pub mod engine;
pub mod extract;
pub mod naming;
pub mod package;
pub mod partition;
pub mod runner;
pub mod sql;

use footprint_core::{ArchiveError, ConversionError, FailureKind};

pub use boundary::{AdminSubregion, Boundary, CountryBoundary, Envelope};
pub use catalog::{CatalogError, CatalogPublisher, JsonCatalog};
pub use duck::DuckDbEngine;
pub use engine::{EngineError, RowFilter, RowRange, SpatialEngine};
pub use extract::{MergedFile, extract_country};
pub use package::{DeliverableArtifact, Packager};
pub use partition::{Partitioner, part_count, row_ranges};
pub use runner::{CountryFailure, CountryRunner, PartitionSummary};

/// Error from delivering a single country
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("{iso3} is not in the boundary reference data")]
    CountryNotFound { iso3: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("{name}: a single row packs to {size} bytes, above the {max_size} byte ceiling")]
    SizeCeilingUnsatisfiable {
        name: String,
        size: u64,
        max_size: u64,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl PartitionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::CountryNotFound { .. } => FailureKind::CountryNotFound,
            Self::Engine(e) => e.kind(),
            Self::Conversion(_) => FailureKind::Conversion,
            Self::Archive(_) => FailureKind::Archive,
            Self::SizeCeilingUnsatisfiable { .. } => FailureKind::SizeCeilingUnsatisfiable,
            Self::Catalog(_) => FailureKind::Catalog,
            Self::Io(e) => footprint_core::error::io_kind(e),
        }
    }
}
