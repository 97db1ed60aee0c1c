//! Bounded-concurrency acquisition of a provider's shards

use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use footprint_core::{
    BlobStore, FormatConverter, HttpClient, ProgressContext, Provider, RunConfig, WorkQueue,
    is_shutdown_requested, remove_stale_scratch,
};

use crate::AcquireError;
use crate::manifest::fetch_manifest;
use crate::shard::ShardDescriptor;
use crate::worker::{ShardContext, ShardFailure, ShardOutcome, ShardStats, process_shard};

/// Collaborators for one acquisition run
pub struct Acquisition<'a> {
    pub config: &'a RunConfig,
    pub http: &'a HttpClient,
    pub store: &'a dyn BlobStore,
    pub converter: &'a dyn FormatConverter,
    pub progress: &'a ProgressContext,
}

impl Acquisition<'_> {
    /// List a provider's shards and process them all.
    ///
    /// Only an unavailable manifest (or an unusable scratch directory)
    /// fails the run; shard failures are collected in the summary.
    pub fn run(&self, provider: Provider) -> Result<AcquireSummary, AcquireError> {
        let manifest_url = &self.config.providers.get(provider).manifest_url;
        let shards = fetch_manifest(
            self.http,
            self.config.retry_policy(),
            provider,
            manifest_url,
        )?;
        self.run_shards(provider, shards)
    }

    /// Process already-listed shards on at most `config.concurrency` workers
    pub fn run_shards(
        &self,
        provider: Provider,
        shards: Vec<ShardDescriptor>,
    ) -> Result<AcquireSummary, AcquireError> {
        let start = Instant::now();
        if shards.is_empty() {
            log::warn!("No {provider} shards to process");
            return Ok(AcquireSummary::empty(provider));
        }

        let scratch_root = self.config.scratch_dir();
        fs::create_dir_all(&scratch_root)?;
        remove_stale_scratch(&scratch_root)?;

        let workers = self.config.concurrency.clamp(1, shards.len());
        log::info!(
            "Processing {} {provider} shards with {workers} workers",
            shards.len()
        );

        let encodings = self.config.encodings();
        let ctx = ShardContext {
            http: self.http,
            store: self.store,
            converter: self.converter,
            retry: self.config.retry_policy(),
            encodings: &encodings,
            scratch_root: &scratch_root,
        };

        let queue = WorkQueue::new(shards);
        let overall = self.progress.provider_bar(provider, queue.total() as u64);
        let skipped = AtomicUsize::new(0);
        let stats: Mutex<Vec<ShardStats>> = Mutex::new(Vec::new());
        let failures: Mutex<Vec<ShardFailure>> = Mutex::new(Vec::new());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("acquire-{i}"))
            .build()
            .map_err(std::io::Error::other)?;

        pool.install(|| {
            rayon::scope(|s| {
                for _ in 0..workers {
                    s.spawn(|_| {
                        loop {
                            if is_shutdown_requested() {
                                break;
                            }
                            let Some(shard) = queue.claim() else {
                                break;
                            };

                            let pb = self.progress.shard_bar(&shard.target_key);
                            let result = process_shard(shard, &ctx, &pb);
                            pb.finish_and_clear();

                            match result {
                                Ok(ShardOutcome::Completed(shard_stats)) => {
                                    if !self.progress.is_tty() {
                                        shard_stats.log();
                                    }
                                    stats
                                        .lock()
                                        .expect("worker thread panicked")
                                        .push(shard_stats);
                                }
                                Ok(ShardOutcome::Skipped) => {
                                    skipped.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(f) => {
                                    let mut failures =
                                        failures.lock().expect("worker thread panicked");
                                    failures.push(f);
                                    overall.set_message(format!("{} failed", failures.len()));
                                }
                            }
                            overall.inc(1);
                        }
                    });
                }
            });
        });
        overall.finish_and_clear();

        let stats = stats.into_inner().expect("worker thread panicked");
        let summary = AcquireSummary {
            provider,
            total: queue.total(),
            completed: stats.len(),
            skipped: skipped.into_inner(),
            cancelled: queue.unclaimed(),
            failures: failures.into_inner().expect("worker thread panicked"),
            bytes_downloaded: stats.iter().map(|s| s.downloaded_bytes).sum(),
            rows: stats.iter().map(|s| s.rows).sum(),
            elapsed: start.elapsed(),
        };
        summary.log();
        Ok(summary)
    }
}

/// Summary of one provider's acquisition run
#[derive(Debug)]
pub struct AcquireSummary {
    pub provider: Provider,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    /// Never started because shutdown was requested
    pub cancelled: usize,
    pub failures: Vec<ShardFailure>,
    pub bytes_downloaded: u64,
    pub rows: u64,
    pub elapsed: Duration,
}

impl AcquireSummary {
    pub fn empty(provider: Provider) -> Self {
        Self {
            provider,
            total: 0,
            completed: 0,
            skipped: 0,
            cancelled: 0,
            failures: Vec::new(),
            bytes_downloaded: 0,
            rows: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn log(&self) {
        log::info!("=== {} acquisition summary ===", self.provider);
        log::info!(
            "Shards: {}/{} completed, {} already present, {} failed, {} cancelled",
            self.completed,
            self.total,
            self.skipped,
            self.failures.len(),
            self.cancelled
        );
        log::info!(
            "Downloaded {} bytes, {} rows converted",
            self.bytes_downloaded,
            self.rows
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        for f in &self.failures {
            log::warn!("  {} [{} while {}]: {}", f.source_url, f.kind, f.stage, f.message);
        }
    }
}
