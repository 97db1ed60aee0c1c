//! End-to-end acquisition against a local HTTP server

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    ATTEMPTS, CopyConverter, FlakyStore, Harness, RecordingStore, TILE, config, http,
    scratch_entries,
};
use footprint_acquire::{AcquireError, Acquisition, ShardStage};
use footprint_core::{FailureKind, ProgressContext, Provider};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[test]
fn google_manifest_end_to_end() {
    let h = Harness::new();
    let manifest = format!(
        r#"{{"type":"FeatureCollection","features":[
            {{"properties":{{"tile_url":"{a}"}}}},
            {{"properties":{{"tile_url":"{b}"}}}},
            {{"properties":{{"tile_url":"{a}"}}}}
        ]}}"#,
        a = h.url("/tiles/0a1_buildings.csv.gz"),
        b = h.url("/tiles/0a3_buildings.csv.gz"),
    );
    h.mount(
        Mock::given(method("GET"))
            .and(path("/tiles.geojson"))
            .respond_with(ResponseTemplate::new(200).set_body_string(manifest)),
    );
    h.serve_tile("0a1_buildings", TILE);
    h.serve_tile("0a3_buildings", TILE);

    let work = TempDir::new().unwrap();
    let mut config = config(&work, 2);
    config.providers.google.manifest_url = h.url("/tiles.geojson");
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run(Provider::Google)
    .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);
    assert!(summary.failures.is_empty());
    for encoding in ["geoparquet-2.0", "geoparquet-1.1", "parquet"] {
        let key = format!("google-open-buildings/{encoding}/0a1_buildings.parquet");
        assert_eq!(store.get(&key).as_deref(), Some(TILE), "{key}");
    }
    assert_eq!(store.put_order().len(), 6);
    assert_eq!(scratch_entries(&config), 0);
}

#[test]
fn primary_is_uploaded_first_and_completion_key_last() {
    let h = Harness::new();
    h.serve_tile("solo", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 1);
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();
    let shard = h.google_shard("solo");

    Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(Provider::Google, vec![shard.clone()])
    .unwrap();

    let order = store.put_order();
    assert_eq!(order.first().unwrap(), "google-open-buildings/geoparquet-2.0/solo.parquet");
    assert_eq!(
        order.last().unwrap(),
        &shard.completion_key(&config.encodings())
    );
}

#[test]
fn existing_completion_key_skips_fetch() {
    let h = Harness::new();
    h.serve_tile("done", TILE);
    h.serve_tile("todo", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 2);
    let store = RecordingStore::default();
    let done = h.google_shard("done");
    store.insert(&done.completion_key(&config.encodings()), b"already here");
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(Provider::Google, vec![done, h.google_shard("todo")])
    .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(h.requests_to("/tiles/done.csv.gz"), 0);
    assert_eq!(h.requests_to("/tiles/todo.csv.gz"), 1);
    assert!(store.put_order().iter().all(|k| !k.contains("done")));
}

#[test]
fn transient_failures_below_limit_eventually_succeed() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path("/tiles/flaky.csv.gz"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(ATTEMPTS as u64 - 1),
    );
    h.serve_tile("flaky", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 1);
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(Provider::Google, vec![h.google_shard("flaky")])
    .unwrap();

    assert_eq!(summary.completed, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(h.requests_to("/tiles/flaky.csv.gz"), ATTEMPTS as usize);
}

#[test]
fn exhausted_retries_fail_only_that_shard() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path("/tiles/down.csv.gz"))
            .respond_with(ResponseTemplate::new(500)),
    );
    h.serve_tile("up", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 2);
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(
        Provider::Google,
        vec![h.google_shard("down"), h.google_shard("up")],
    )
    .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.target_key, "down.parquet");
    assert_eq!(failure.stage, ShardStage::Downloading);
    assert_eq!(failure.kind, FailureKind::TransientNetwork);
    assert_eq!(h.requests_to("/tiles/down.csv.gz"), ATTEMPTS as usize);
    assert!(store.get("google-open-buildings/parquet/up.parquet").is_some());
    assert!(store.get("google-open-buildings/geoparquet-2.0/down.parquet").is_none());
    assert_eq!(scratch_entries(&config), 0);
}

#[test]
fn not_found_is_not_retried() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path("/tiles/gone.csv.gz"))
            .respond_with(ResponseTemplate::new(404)),
    );

    let work = TempDir::new().unwrap();
    let config = config(&work, 1);
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(Provider::Google, vec![h.google_shard("gone")])
    .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(h.requests_to("/tiles/gone.csv.gz"), 1);
}

#[test]
fn conversion_failure_is_isolated_and_not_retried() {
    let h = Harness::new();
    h.serve_tile("bad", b"area_in_meters,confidence,geometry\n1,1,BROKEN\n");
    h.serve_tile("good", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 2);
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(
        Provider::Google,
        vec![h.google_shard("bad"), h.google_shard("good")],
    )
    .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, FailureKind::Conversion);
    assert_eq!(summary.failures[0].stage, ShardStage::Converting);
    assert_eq!(h.requests_to("/tiles/bad.csv.gz"), 1);
    assert!(store.put_order().iter().all(|k| !k.ends_with("bad.parquet")));
}

#[test]
fn corrupt_gzip_fails_while_decompressing() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path("/tiles/corrupt.csv.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not gzip".to_vec())),
    );

    let work = TempDir::new().unwrap();
    let config = config(&work, 1);
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(Provider::Google, vec![h.google_shard("corrupt")])
    .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, ShardStage::Decompressing);
    assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrency_ceiling_is_respected() {
    let h = Harness::new();
    let names: Vec<String> = (0..8).map(|i| format!("t{i}")).collect();
    for name in &names {
        h.serve_tile(name, TILE);
    }

    let work = TempDir::new().unwrap();
    let config = config(&work, 2);
    let store = RecordingStore::default();
    let converter = CopyConverter {
        delay: Duration::from_millis(40),
        ..Default::default()
    };
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(
        Provider::Google,
        names.iter().map(|n| h.google_shard(n)).collect(),
    )
    .unwrap();

    assert_eq!(summary.completed, 8);
    let peak = converter.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak in-flight conversions: {peak}");
}

#[test]
fn unavailable_manifest_is_fatal() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path("/dataset-links.csv"))
            .respond_with(ResponseTemplate::new(502)),
    );

    let work = TempDir::new().unwrap();
    let mut config = config(&work, 1);
    config.providers.microsoft.manifest_url = h.url("/dataset-links.csv");
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let err = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run(Provider::Microsoft)
    .unwrap_err();

    assert!(matches!(
        err,
        AcquireError::ManifestUnavailable {
            provider: Provider::Microsoft,
            ..
        }
    ));
    assert!(err.kind().is_fatal());
    assert_eq!(h.requests_to("/dataset-links.csv"), ATTEMPTS as usize);
}

#[test]
fn empty_manifest_is_unavailable() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("GET"))
            .and(path("/tiles.geojson"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"type":"FeatureCollection","features":[]}"#),
            ),
    );

    let work = TempDir::new().unwrap();
    let mut config = config(&work, 1);
    config.providers.google.manifest_url = h.url("/tiles.geojson");
    let store = RecordingStore::default();
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let result = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run(Provider::Google);

    assert!(matches!(result, Err(AcquireError::ManifestUnavailable { .. })));
}

#[test]
fn upload_failures_below_limit_eventually_succeed() {
    let h = Harness::new();
    h.serve_tile("wobbly", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 1);
    let store = FlakyStore::new("geoparquet-2.0/wobbly", ATTEMPTS as usize - 1);
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(Provider::Google, vec![h.google_shard("wobbly")])
    .unwrap();

    assert_eq!(summary.completed, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(store.attempts(), ATTEMPTS as usize);
    assert_eq!(
        store
            .inner
            .get("google-open-buildings/geoparquet-2.0/wobbly.parquet")
            .as_deref(),
        Some(TILE)
    );
    assert_eq!(h.requests_to("/tiles/wobbly.csv.gz"), 1);
    assert_eq!(converter.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn exhausted_upload_retries_fail_only_that_shard() {
    let h = Harness::new();
    h.serve_tile("refused", TILE);
    h.serve_tile("accepted", TILE);

    let work = TempDir::new().unwrap();
    let config = config(&work, 2);
    let store = FlakyStore::new("refused", usize::MAX);
    let converter = CopyConverter::default();
    let progress = ProgressContext::hidden();
    let http = http();

    let summary = Acquisition {
        config: &config,
        http: &http,
        store: &store,
        converter: &converter,
        progress: &progress,
    }
    .run_shards(
        Provider::Google,
        vec![h.google_shard("refused"), h.google_shard("accepted")],
    )
    .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.target_key, "refused.parquet");
    assert_eq!(failure.stage, ShardStage::Uploading);
    assert_eq!(failure.kind, FailureKind::TransientNetwork);
    // Primary upload exhausts its attempts; later encodings are never tried
    assert_eq!(store.attempts(), ATTEMPTS as usize);
    assert!(
        store
            .inner
            .put_order()
            .iter()
            .all(|k| !k.contains("refused"))
    );
    assert!(store.inner.get("google-open-buildings/parquet/accepted.parquet").is_some());
    assert_eq!(scratch_entries(&config), 0);
}
