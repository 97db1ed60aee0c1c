//! HTTP streaming downloads with read-stall detection, and gzip decoding.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync interface for the rayon workers.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use futures_util::StreamExt;
use indicatif::ProgressBar;

use crate::config::HttpConfig;
use crate::error::{FailureKind, io_kind};
use crate::progress::upgrade_to_bar;
use crate::retry::Retryable;

/// Error types for stream operations
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// HTTP error with optional status code
    #[error("HTTP {}: {message}", fmt_status(.status))]
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Body arrived complete but held no bytes
    #[error("empty response body from {url}")]
    Empty { url: String },
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "error".to_string(), |s| s.to_string())
}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Http { .. } | Self::Empty { .. } => FailureKind::TransientNetwork,
            Self::Io(e) => io_kind(e),
        }
    }
}

impl Retryable for StreamError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http {
                status: Some(status),
                ..
            } => {
                // Client errors won't change on retry, except timeouts and throttling
                !(400..500).contains(status) || matches!(status, 408 | 429)
            }
            Self::Http { status: None, .. } | Self::Empty { .. } => true,
            Self::Io(e) => {
                // Disk full is not retryable, timeout IS retryable
                e.kind() != io::ErrorKind::StorageFull
            }
        }
    }
}

/// Shared tokio runtime for async I/O driven from sync workers.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// HTTP client with connection pooling and the run's timeouts.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    read_timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, StreamError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| StreamError::from_reqwest(&e))?;
        Ok(Self {
            inner,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        })
    }

    /// GET a small document and return it as text
    pub fn fetch_text(&self, url: &str) -> Result<String, StreamError> {
        SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .inner
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StreamError::from_reqwest(&e))?;
            response
                .text()
                .await
                .map_err(|e| StreamError::from_reqwest(&e))
        })
    }
}

/// Buffer size for file writers and the gzip reader (256KB)
const IO_BUF_SIZE: usize = 256 * 1024;

/// HTTP GET streamed to `dest`, returning the bytes written.
///
/// Each body chunk must arrive within the client's read timeout or the
/// download fails with `TimedOut` (which triggers retry). A zero-byte
/// body is an error so a truncated response never reaches conversion.
pub fn download_to_file(
    client: &HttpClient,
    url: &str,
    dest: &Path,
    pb: &ProgressBar,
) -> Result<u64, StreamError> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = client
            .inner
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::from_reqwest(&e))?;

        if let Some(total) = response.content_length() {
            upgrade_to_bar(pb, total);
        }

        let mut writer = BufWriter::with_capacity(IO_BUF_SIZE, File::create(dest)?);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        loop {
            match tokio::time::timeout(client.read_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    writer.write_all(&chunk)?;
                    written += chunk.len() as u64;
                    pb.set_position(written);
                }
                Ok(Some(Err(e))) => return Err(StreamError::from_reqwest(&e)),
                Ok(None) => break,
                Err(_) => {
                    return Err(StreamError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("read timeout ({:?} with no data)", client.read_timeout),
                    )));
                }
            }
        }
        writer.flush()?;

        if written == 0 {
            return Err(StreamError::Empty {
                url: url.to_string(),
            });
        }
        Ok(written)
    })
}

/// Decompress a (possibly multi-member) gzip file into `dest`.
///
/// Returns the decompressed size.
pub fn gunzip_file(src: &Path, dest: &Path) -> io::Result<u64> {
    let reader = BufReader::with_capacity(IO_BUF_SIZE, File::open(src)?);
    let mut decoder = MultiGzDecoder::new(reader);
    let mut writer = BufWriter::with_capacity(IO_BUF_SIZE, File::create(dest)?);
    let n = io::copy(&mut decoder, &mut writer)?;
    writer.flush()?;
    Ok(n)
}
