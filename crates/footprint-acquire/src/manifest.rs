//! Provider shard listings
//!
//! Google publishes a GeoJSON FeatureCollection of tiles with a
//! `tile_url` property; Microsoft publishes a CSV of links with a `Url`
//! column. Both become an ordered, duplicate-free list of shards.

use std::collections::HashSet;

use footprint_core::{HttpClient, Provider, RetryPolicy, retry_fixed};
use indicatif::ProgressBar;
use serde::Deserialize;

use crate::AcquireError;
use crate::shard::ShardDescriptor;

/// Path segment after which Microsoft's shard paths are kept verbatim
const MICROSOFT_ROOT: &str = "/global-buildings.geojsonl/";

#[derive(Debug, Deserialize)]
struct TileCollection {
    features: Vec<TileFeature>,
}

#[derive(Debug, Deserialize)]
struct TileFeature {
    properties: TileProperties,
}

#[derive(Debug, Deserialize)]
struct TileProperties {
    tile_url: Option<String>,
}

/// Fetch and parse a provider's shard listing.
///
/// The fetch retries per `retry`. Exhausted retries, an unparseable body
/// or an empty listing all make the provider's run impossible.
pub fn fetch_manifest(
    http: &HttpClient,
    retry: RetryPolicy,
    provider: Provider,
    url: &str,
) -> Result<Vec<ShardDescriptor>, AcquireError> {
    let unavailable = |reason: String| AcquireError::ManifestUnavailable { provider, reason };

    log::info!("Fetching {provider} manifest from {url}");
    let label = format!("{provider} manifest");
    let body = retry_fixed(&label, retry, &ProgressBar::hidden(), || http.fetch_text(url))
        .map_err(|e| unavailable(e.to_string()))?;

    let shards = parse_manifest(provider, &body).map_err(unavailable)?;
    if shards.is_empty() {
        return Err(unavailable("manifest lists no shards".into()));
    }
    log::info!("{provider} manifest contains {} shards", shards.len());
    Ok(shards)
}

/// Parse a manifest body into shards, in listing order, deduplicated.
pub fn parse_manifest(provider: Provider, body: &str) -> Result<Vec<ShardDescriptor>, String> {
    let urls = match provider {
        Provider::Google => parse_tile_collection(body)?,
        Provider::Microsoft => parse_link_table(body)?,
    };

    let mut seen_urls = HashSet::new();
    let mut seen_keys = HashSet::new();
    let mut shards = Vec::with_capacity(urls.len());
    for url in urls {
        if !seen_urls.insert(url.clone()) {
            continue;
        }
        let Some(target_key) = target_key(provider, &url) else {
            log::warn!("Skipping {provider} shard with unusable URL: {url}");
            continue;
        };
        if !seen_keys.insert(target_key.clone()) {
            log::warn!("Skipping {url}: target key {target_key} already claimed");
            continue;
        }
        shards.push(ShardDescriptor {
            provider,
            source_url: url,
            target_key,
        });
    }
    Ok(shards)
}

fn parse_tile_collection(body: &str) -> Result<Vec<String>, String> {
    let collection: TileCollection =
        serde_json::from_str(body).map_err(|e| format!("invalid tile GeoJSON: {e}"))?;
    Ok(collection
        .features
        .into_iter()
        .filter_map(|f| f.properties.tile_url)
        .filter(|u| !u.is_empty())
        .collect())
}

fn parse_link_table(body: &str) -> Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let url_col = reader
        .headers()
        .map_err(|e| format!("invalid link table header: {e}"))?
        .iter()
        .position(|h| h == "Url")
        .ok_or("link table has no Url column")?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("invalid link table: {e}"))?;
        match record.get(url_col) {
            Some(url) if !url.is_empty() => urls.push(url.to_string()),
            _ => {
                let line = record.position().map_or(0, |p| p.line());
                return Err(format!("link table line {line} has no Url"));
            }
        }
    }
    Ok(urls)
}

/// Object key for a shard URL: provider-relative path, `.parquet` extension
fn target_key(provider: Provider, url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let rel = match provider {
        Provider::Microsoft => path
            .split_once(MICROSOFT_ROOT)
            .map(|(_, rest)| rest)
            .or_else(|| path.rsplit('/').next())?,
        Provider::Google => path.rsplit('/').next()?,
    };
    if rel.is_empty() || rel.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return None;
    }
    let stem = rel.strip_suffix(".gz").unwrap_or(rel);
    let stem = [".csv", ".geojsonl", ".geojson"]
        .iter()
        .find_map(|ext| stem.strip_suffix(ext))
        .unwrap_or(stem);
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(format!("{stem}.parquet"))
}
