//! Failure classification shared by the acquisition and partitioning reports

use std::fmt;

/// What went wrong, independent of which layer raised it.
///
/// Each layer's error type maps itself onto one of these so the
/// end-of-run report can group failures by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network operation failed after exhausting retries
    TransientNetwork,
    /// External format conversion failed or produced no usable output
    Conversion,
    /// Provider shard listing could not be fetched or parsed
    ManifestUnavailable,
    /// Requested country is absent from the boundary reference data
    CountryNotFound,
    /// A single row still produces an archive above the size ceiling
    SizeCeilingUnsatisfiable,
    /// Spatial query engine error
    Query,
    /// Archive packaging failed
    Archive,
    /// Object store rejected an operation for a non-network reason
    Storage,
    /// Catalog publication failed
    Catalog,
    /// Local filesystem error
    Io,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::TransientNetwork => "network",
            Self::Conversion => "conversion",
            Self::ManifestUnavailable => "manifest unavailable",
            Self::CountryNotFound => "country not found",
            Self::SizeCeilingUnsatisfiable => "size ceiling unsatisfiable",
            Self::Query => "query",
            Self::Archive => "archive",
            Self::Storage => "storage",
            Self::Catalog => "catalog",
            Self::Io => "io",
        }
    }

    /// Fatal kinds abort the run instead of being isolated to one item.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ManifestUnavailable)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a local I/O error
pub fn io_kind(e: &std::io::Error) -> FailureKind {
    match e.kind() {
        std::io::ErrorKind::TimedOut
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::ConnectionRefused => FailureKind::TransientNetwork,
        _ => FailureKind::Io,
    }
}
