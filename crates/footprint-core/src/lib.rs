//! Footprint Core - Common infrastructure for building-footprint pipelines
//!
//! This crate provides the pieces shared by acquisition and partitioning:
//! configuration, error classification, retry, HTTP streaming, object
//! storage, and the external format/archive tools.

pub mod archive;
pub mod columnar;
pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod store;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use archive::{ArchiveError, ArchivePackager, ZipCommand};
pub use columnar::{is_valid_parquet, parquet_row_count, remove_stale_scratch};
pub use config::{ConfigError, Encoding, Provider, RunConfig};
pub use convert::{ConversionError, ConvertOptions, FormatConverter, GdalConverter};
pub use error::FailureKind;
pub use logging::init_logging;
pub use progress::{ProgressContext, SharedProgress};
pub use retry::{RetryPolicy, Retryable, retry_fixed};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown};
pub use store::{BlobStore, ObjectStoreBackend, StoreError};
pub use stream::{HttpClient, SHARED_RUNTIME, StreamError, download_to_file, gunzip_file};
pub use work_queue::WorkQueue;
