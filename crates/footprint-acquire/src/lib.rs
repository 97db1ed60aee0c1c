//! Footprint Acquire - Download provider shards into the object store
//!
//! Lists a provider's shards, then runs each through download, gunzip,
//! GeoParquet conversion and upload on a bounded worker pool.

pub mod manifest;
pub mod runner;
pub mod shard;
pub mod worker;

use footprint_core::{ConversionError, FailureKind, Provider, StoreError, StreamError};

pub use manifest::{fetch_manifest, parse_manifest};
pub use runner::{AcquireSummary, Acquisition};
pub use shard::{ShardDescriptor, ShardStage};
pub use worker::{ShardContext, ShardFailure, ShardOutcome, ShardStats, process_shard};

/// Error from processing a single shard
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl ShardError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Stream(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Conversion(_) => FailureKind::Conversion,
            Self::Io(e) => footprint_core::error::io_kind(e),
        }
    }
}

/// Error that stops a provider's whole acquisition run
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("{provider} manifest unavailable: {reason}")]
    ManifestUnavailable { provider: Provider, reason: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquireError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ManifestUnavailable { .. } => FailureKind::ManifestUnavailable,
            Self::Io(e) => footprint_core::error::io_kind(e),
        }
    }
}
