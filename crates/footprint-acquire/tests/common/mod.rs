#![allow(dead_code)]

//! Shared doubles for the acquisition tests.
//!
//! Shards are served by wiremock; the object stores are in-process
//! recorders and the converter copies bytes instead of running GDAL.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use footprint_acquire::ShardDescriptor;
use footprint_core::config::RetryConfig;
use footprint_core::convert::ConversionError;
use footprint_core::{
    BlobStore, ConvertOptions, FormatConverter, HttpClient, Provider, RunConfig, StoreError,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ATTEMPTS: u32 = 4;

pub struct Harness {
    rt: tokio::runtime::Runtime,
    server: MockServer,
}

impl Harness {
    pub fn new() -> Self {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        Self { rt, server }
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    pub fn url(&self, p: &str) -> String {
        format!("{}{p}", self.server.uri())
    }

    pub fn serve_tile(&self, name: &str, body: &[u8]) {
        self.mount(
            Mock::given(method("GET"))
                .and(path(format!("/tiles/{name}.csv.gz")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(body))),
        );
    }

    pub fn requests_to(&self, p: &str) -> usize {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == p)
            .count()
    }

    pub fn google_shard(&self, name: &str) -> ShardDescriptor {
        ShardDescriptor {
            provider: Provider::Google,
            source_url: self.url(&format!("/tiles/{name}.csv.gz")),
            target_key: format!("{name}.parquet"),
        }
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Object store double recording every put in order
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn put_order(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }
}

impl BlobStore for RecordingStore {
    fn put(&self, key: &str, local: &Path) -> Result<(), StoreError> {
        let data = std::fs::read(local).map_err(|source| StoreError::Io {
            path: local.to_path_buf(),
            source,
        })?;
        self.insert(key, &data);
        self.puts.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

/// Object store double whose puts to keys containing `fragment` fail with
/// a retryable backend error until `failures` of them have been refused
pub struct FlakyStore {
    pub inner: RecordingStore,
    fragment: &'static str,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(fragment: &'static str, failures: usize) -> Self {
        Self {
            inner: RecordingStore::default(),
            fragment,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl BlobStore for FlakyStore {
    fn put(&self, key: &str, local: &Path) -> Result<(), StoreError> {
        if key.contains(self.fragment) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(StoreError::Backend {
                    op: "put",
                    key: key.to_string(),
                    source: object_store::Error::Generic {
                        store: "S3",
                        source: "connection reset by peer".into(),
                    },
                });
            }
        }
        self.inner.put(key, local)
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key)
    }
}

/// Converter double: copies input to output, rejects inputs containing
/// `BROKEN`, and records how many conversions ran at once.
#[derive(Default)]
pub struct CopyConverter {
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FormatConverter for CopyConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        _options: &ConvertOptions,
    ) -> Result<(), ConversionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);

        let data = std::fs::read(input).unwrap();
        let result = if data.windows(6).any(|w| w == b"BROKEN") {
            Err(ConversionError::Failed {
                tool: "fake".into(),
                status: Some(1),
                stderr: "unparseable geometry".into(),
            })
        } else {
            std::fs::write(output, &data).unwrap();
            Ok(())
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn config(work: &TempDir, concurrency: usize) -> RunConfig {
    RunConfig {
        work_dir: work.path().to_path_buf(),
        concurrency,
        retry: RetryConfig {
            attempts: ATTEMPTS,
            wait_secs: 0,
        },
        ..Default::default()
    }
}

pub fn http() -> HttpClient {
    HttpClient::new(&RunConfig::default().http).unwrap()
}

pub fn scratch_entries(config: &RunConfig) -> usize {
    std::fs::read_dir(config.scratch_dir())
        .map(|d| d.count())
        .unwrap_or(0)
}

pub const TILE: &[u8] = b"area_in_meters,confidence,geometry\n12.5,0.81,\"POLYGON((0 0,1 0,1 1,0 0))\"\n";
