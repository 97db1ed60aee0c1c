//! Object storage for converted shards
//!
//! [`BlobStore`] is the seam workers talk to; [`ObjectStoreBackend`]
//! implements it over any `object_store` backend (S3, local disk, memory).

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, WriteMultipart};
use url::Url;

use crate::config::StoreConfig;
use crate::error::FailureKind;
use crate::retry::Retryable;
use crate::stream::SHARED_RUNTIME;

/// Multipart chunk size (10 MiB, above the S3 5 MiB part minimum)
const UPLOAD_CHUNK: usize = 10 * 1024 * 1024;

/// Parts in flight per upload
const UPLOAD_CONCURRENCY: usize = 4;

const READ_BUF_SIZE: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store url {url}: {message}")]
    Config { url: String, message: String },
    #[error("object store {op} {key}: {source}")]
    Backend {
        op: &'static str,
        key: String,
        #[source]
        source: object_store::Error,
    },
    #[error("reading {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Backend { .. } if self.is_retryable() => FailureKind::TransientNetwork,
            Self::Backend { .. } | Self::Config { .. } => FailureKind::Storage,
            Self::Io { .. } => FailureKind::Io,
        }
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { source, .. } => !matches!(
                source,
                object_store::Error::NotFound { .. }
                    | object_store::Error::InvalidPath { .. }
                    | object_store::Error::NotSupported { .. }
                    | object_store::Error::NotImplemented
                    | object_store::Error::UnknownConfigurationKey { .. }
            ),
            Self::Config { .. } | Self::Io { .. } => false,
        }
    }
}

/// Destination for converted shards, addressed by key
pub trait BlobStore: Send + Sync {
    /// Upload a local file to `key`, replacing any existing object
    fn put(&self, key: &str, local: &Path) -> Result<(), StoreError>;

    /// Whether an object exists at `key`
    fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// [`BlobStore`] over an `object_store` backend with a key prefix
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    inner: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl ObjectStoreBackend {
    pub fn new(inner: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        Self {
            inner,
            prefix: ObjectPath::from(prefix),
        }
    }

    /// Build the backend named by `store.url` (`s3://`, `file://`, `memory://`)
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = Url::parse(&config.url).map_err(|e| StoreError::Config {
            url: config.url.clone(),
            message: e.to_string(),
        })?;
        let (store, prefix) =
            object_store::parse_url_opts(&url, config.options.iter()).map_err(|e| {
                StoreError::Config {
                    url: config.url.clone(),
                    message: e.to_string(),
                }
            })?;
        log::debug!("object store {} (prefix {prefix})", url.scheme());
        Ok(Self {
            inner: Arc::from(store),
            prefix,
        })
    }

    fn location(&self, key: &str) -> ObjectPath {
        if self.prefix.as_ref().is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{key}", self.prefix))
        }
    }

    async fn upload(&self, key: &str, location: &ObjectPath, local: &Path) -> Result<(), StoreError> {
        let backend = |op, source| StoreError::Backend {
            op,
            key: key.to_string(),
            source,
        };
        let io_err = |source| StoreError::Io {
            path: local.to_path_buf(),
            source,
        };

        let mut file = File::open(local).map_err(io_err)?;
        let upload = self
            .inner
            .put_multipart(location)
            .await
            .map_err(|e| backend("put", e))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, UPLOAD_CHUNK);
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(io_err(e));
                }
            };
            if let Err(e) = writer.wait_for_capacity(UPLOAD_CONCURRENCY).await {
                let _ = writer.abort().await;
                return Err(backend("put", e));
            }
            writer.write(&buf[..n]);
        }
        writer.finish().await.map_err(|e| backend("put", e))?;
        Ok(())
    }
}

impl BlobStore for ObjectStoreBackend {
    fn put(&self, key: &str, local: &Path) -> Result<(), StoreError> {
        let location = self.location(key);
        SHARED_RUNTIME
            .handle()
            .block_on(self.upload(key, &location, local))
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let location = self.location(key);
        SHARED_RUNTIME.handle().block_on(async {
            match self.inner.head(&location).await {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(source) => Err(StoreError::Backend {
                    op: "head",
                    key: key.to_string(),
                    source,
                }),
            }
        })
    }
}
