//! Shard processing: download, decompress, convert, upload

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use footprint_core::columnar::SCRATCH_PREFIX;
use footprint_core::convert::SourceLayout;
use footprint_core::progress::downgrade_to_pending;
use footprint_core::{
    BlobStore, ConvertOptions, Encoding, FailureKind, FormatConverter, HttpClient, RetryPolicy,
    download_to_file, gunzip_file, parquet_row_count, retry_fixed,
};
use indicatif::ProgressBar;

use crate::ShardError;
use crate::shard::{ShardDescriptor, ShardStage};

/// Everything a worker needs besides the shard itself
pub struct ShardContext<'a> {
    pub http: &'a HttpClient,
    pub store: &'a dyn BlobStore,
    pub converter: &'a dyn FormatConverter,
    pub retry: RetryPolicy,
    /// Upload order, primary first
    pub encodings: &'a [Encoding],
    pub scratch_root: &'a Path,
}

/// Statistics from processing a single shard
#[derive(Debug)]
pub struct ShardStats {
    pub target_key: String,
    pub downloaded_bytes: u64,
    pub raw_bytes: u64,
    pub rows: u64,
    pub uploads: usize,
    pub elapsed: Duration,
}

impl ShardStats {
    /// Log stats for non-TTY output
    pub fn log(&self) {
        log::info!(
            "{}: {} rows, {} bytes downloaded ({} raw), {} objects uploaded in {:.1}s",
            self.target_key,
            self.rows,
            self.downloaded_bytes,
            self.raw_bytes,
            self.uploads,
            self.elapsed.as_secs_f64()
        );
    }
}

#[derive(Debug)]
pub enum ShardOutcome {
    Completed(ShardStats),
    /// Completion key already present; nothing fetched
    Skipped,
}

/// A shard that could not be processed, and the stage it died in
#[derive(Debug, Clone)]
pub struct ShardFailure {
    pub source_url: String,
    pub target_key: String,
    pub stage: ShardStage,
    pub kind: FailureKind,
    pub message: String,
}

/// Tracks the current stage and mirrors it onto the progress bar
struct StageTracker<'a> {
    label: &'a str,
    stage: ShardStage,
    pb: &'a ProgressBar,
}

impl StageTracker<'_> {
    fn enter(&mut self, stage: ShardStage) {
        self.stage = stage;
        self.pb.set_message(stage.to_string());
        log::debug!("{}: {stage}", self.label);
    }
}

/// Process a single shard end to end.
///
/// Failures are returned, never propagated, so siblings keep running.
pub fn process_shard(
    shard: &ShardDescriptor,
    ctx: &ShardContext<'_>,
    pb: &ProgressBar,
) -> Result<ShardOutcome, ShardFailure> {
    let mut tracker = StageTracker {
        label: &shard.target_key,
        stage: ShardStage::Pending,
        pb,
    };
    match run_pipeline(shard, ctx, &mut tracker) {
        Ok(outcome) => {
            tracker.enter(ShardStage::Done);
            Ok(outcome)
        }
        Err(e) => {
            let stage = tracker.stage;
            tracker.enter(ShardStage::Failed);
            log::error!("{}: failed while {stage}: {e}", shard.target_key);
            Err(ShardFailure {
                source_url: shard.source_url.clone(),
                target_key: shard.target_key.clone(),
                stage,
                kind: e.kind(),
                message: e.to_string(),
            })
        }
    }
}

fn run_pipeline(
    shard: &ShardDescriptor,
    ctx: &ShardContext<'_>,
    tracker: &mut StageTracker<'_>,
) -> Result<ShardOutcome, ShardError> {
    let start = Instant::now();
    let label = shard.target_key.as_str();

    let completion_key = shard.completion_key(ctx.encodings);
    let done = retry_fixed(label, ctx.retry, tracker.pb, || {
        ctx.store.exists(&completion_key)
    })?;
    if done {
        log::debug!("{label}: {completion_key} exists, skipping");
        return Ok(ShardOutcome::Skipped);
    }

    // Removed on drop, on success and failure alike
    fs::create_dir_all(ctx.scratch_root)?;
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(ctx.scratch_root)?;

    tracker.enter(ShardStage::Downloading);
    let gz_path = scratch.path().join("shard.gz");
    let downloaded_bytes = retry_fixed(label, ctx.retry, tracker.pb, || {
        download_to_file(ctx.http, &shard.source_url, &gz_path, tracker.pb)
    })?;
    downgrade_to_pending(tracker.pb);

    tracker.enter(ShardStage::Decompressing);
    let raw_path = scratch.path().join(shard.raw_file_name());
    let raw_bytes = gunzip_file(&gz_path, &raw_path)?;
    fs::remove_file(&gz_path)?;

    tracker.enter(ShardStage::Converting);
    let primary_path = scratch.path().join(format!("{}.parquet", Encoding::PRIMARY));
    let options = ConvertOptions::for_encoding(Encoding::PRIMARY, shard.source_layout());
    ctx.converter.convert(&raw_path, &primary_path, &options)?;
    fs::remove_file(&raw_path)?;
    let rows = parquet_row_count(&primary_path).unwrap_or_else(|e| {
        log::debug!("{label}: row count unavailable: {e}");
        0
    });

    tracker.enter(ShardStage::Uploading);
    let primary_key = shard.key(Encoding::PRIMARY);
    retry_fixed(label, ctx.retry, tracker.pb, || {
        ctx.store.put(&primary_key, &primary_path)
    })?;
    let mut uploads = 1;

    for &encoding in ctx.encodings.iter().filter(|e| **e != Encoding::PRIMARY) {
        tracker.enter(ShardStage::Converting);
        let path = scratch.path().join(format!("{encoding}.parquet"));
        let options = ConvertOptions::for_encoding(encoding, SourceLayout::Vector);
        ctx.converter.convert(&primary_path, &path, &options)?;

        tracker.enter(ShardStage::Uploading);
        let key = shard.key(encoding);
        retry_fixed(label, ctx.retry, tracker.pb, || ctx.store.put(&key, &path))?;
        fs::remove_file(&path)?;
        uploads += 1;
    }

    Ok(ShardOutcome::Completed(ShardStats {
        target_key: shard.target_key.clone(),
        downloaded_bytes,
        raw_bytes,
        rows,
        uploads,
        elapsed: start.elapsed(),
    }))
}
