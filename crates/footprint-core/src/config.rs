//! Run configuration, read once at startup and passed by reference
//!
//! Every section is `#[serde(default)]`, so a TOML file only has to name
//! what it changes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// 1.5 GiB, the largest archive a catalog resource may hold.
pub const DEFAULT_MAX_SIZE: u64 = 1_610_612_736;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Building-footprint data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Microsoft,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Microsoft];

    pub fn name(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    /// Human-readable name used in catalog titles
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Microsoft => "Microsoft",
        }
    }

    /// Top-level object-store prefix for this provider's corpus
    pub fn dataset_prefix(self) -> String {
        format!("{}-open-buildings", self.name())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Columnar encoding of an uploaded shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Encoding {
    /// Native parquet geometry types, rows sorted by bbox
    #[serde(rename = "geoparquet-2.0")]
    GeoParquet2,
    /// WKB geometry with covering bbox column
    #[serde(rename = "geoparquet-1.1")]
    GeoParquet11,
    /// Native parquet geometry types without GeoParquet metadata
    #[serde(rename = "parquet")]
    Parquet,
}

impl Encoding {
    /// Every shard is converted to this first; the others derive from it.
    pub const PRIMARY: Encoding = Encoding::GeoParquet2;

    pub fn name(self) -> &'static str {
        match self {
            Self::GeoParquet2 => "geoparquet-2.0",
            Self::GeoParquet11 => "geoparquet-1.1",
            Self::Parquet => "parquet",
        }
    }

    /// Object key for a shard in this encoding
    pub fn object_key(self, provider: Provider, target_key: &str) -> String {
        format!("{}/{}/{}", provider.dataset_prefix(), self.name(), target_key)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Global configuration for a footprint run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Scratch space for shards and per-country outputs
    pub work_dir: PathBuf,
    /// Maximum shards processed at once
    pub concurrency: usize,
    /// Largest allowed deliverable archive, in bytes
    pub max_size: u64,
    /// Encodings derived from the primary after it is uploaded
    pub extra_encodings: Vec<Encoding>,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub countries: CountryFilter,
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub reference: ReferenceConfig,
    pub providers: ProvidersConfig,
    pub tools: ToolsConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./saved_data"),
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_size: DEFAULT_MAX_SIZE,
            extra_encodings: vec![Encoding::GeoParquet11, Encoding::Parquet],
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            countries: CountryFilter::default(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            reference: ReferenceConfig::default(),
            providers: ProvidersConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per network operation, first try included
    pub attempts: u32,
    pub wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 24,
            wait_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    /// No bytes for this long while streaming a body counts as a stall
    pub read_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 3600,
            read_timeout_secs: 60,
            connect_timeout_secs: 30,
        }
    }
}

/// ISO3 include/exclude lists
///
/// Codes compare case-insensitively; entries that are not three letters
/// are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CountryFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl CountryFilter {
    /// Explicitly requested countries, uppercased and deduplicated in order
    pub fn included(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for code in normalize_codes(&self.include) {
            if !out.contains(&code) {
                out.push(code);
            }
        }
        out
    }

    pub fn admits(&self, iso3: &str) -> bool {
        let iso3 = iso3.to_ascii_uppercase();
        let included = self.included();
        if !included.is_empty() && !included.contains(&iso3) {
            return false;
        }
        !normalize_codes(&self.exclude).any(|c| c == iso3)
    }
}

fn normalize_codes(codes: &[String]) -> impl Iterator<Item = String> + '_ {
    codes
        .iter()
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where shards are uploaded, e.g. `s3://bucket/prefix` or `file:///data`
    pub url: String,
    /// Where the query engine reads the corpus back, when it differs from `url`
    pub query_url: Option<String>,
    /// Backend options passed to `object_store`, `${VAR}` values expanded
    #[serde(deserialize_with = "deserialize_env_map")]
    pub options: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "file:///tmp/footprint-store".to_string(),
            query_url: None,
            options: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Root the query engine should read from, with `file://` stripped
    pub fn query_root(&self) -> String {
        let root = self.query_url.as_deref().unwrap_or(&self.url);
        let root = root.strip_prefix("file://").unwrap_or(root);
        root.trim_end_matches('/').to_string()
    }

    /// Glob over a provider's primary-encoding corpus
    pub fn corpus_glob(&self, provider: Provider) -> String {
        format!(
            "{}/{}/{}/**/*.parquet",
            self.query_root(),
            provider.dataset_prefix(),
            Encoding::PRIMARY.name()
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub memory_limit: Option<String>,
    pub threads: Option<usize>,
    /// Load the spatial extension (required for boundary queries)
    pub spatial: bool,
    /// S3-compatible endpoint for reading the corpus back, e.g. `data.source.coop`
    pub s3_endpoint: Option<String>,
    pub s3_url_style: Option<String>,
    /// Covering bbox struct column; `None` computes envelopes from geometry
    pub bbox_column: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            threads: None,
            spatial: true,
            s3_endpoint: None,
            s3_url_style: None,
            bbox_column: Some("geometry_bbox".to_string()),
        }
    }
}

/// Boundary datasets used to cut the corpus into countries
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub admin0: String,
    /// ISO3 column present in both admin-0 and admin-1 datasets
    pub iso3_column: String,
    pub admin1: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            admin0: "https://data.fieldmaps.io/adm0/osm/intl/adm0_polygons.parquet".to_string(),
            iso3_column: "iso_3".to_string(),
            admin1: "https://data.fieldmaps.io/edge-matched/humanitarian/intl/adm1_polygons.parquet"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub manifest_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google: ProviderConfig,
    pub microsoft: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            google: ProviderConfig {
                enabled: true,
                manifest_url: "https://researchsites.withgoogle.com/tiles.geojson".to_string(),
            },
            microsoft: ProviderConfig {
                enabled: true,
                manifest_url:
                    "https://minedbuildings.z5.web.core.windows.net/global-buildings/dataset-links.csv"
                        .to_string(),
            },
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manifest_url: String::new(),
        }
    }
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Google => &self.google,
            Provider::Microsoft => &self.microsoft,
        }
    }

    pub fn enabled(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.get(*p).enabled)
            .collect()
    }
}

/// External binaries
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub gdal: PathBuf,
    pub zip: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            gdal: PathBuf::from("gdal"),
            zip: PathBuf::from("zip"),
        }
    }
}

impl RunConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be at least 1".into()));
        }
        if self.max_size == 0 {
            return Err(ConfigError::Invalid("max_size must be positive".into()));
        }
        if self.extra_encodings.contains(&Encoding::PRIMARY) {
            return Err(ConfigError::Invalid(format!(
                "extra_encodings must not repeat the primary encoding {}",
                Encoding::PRIMARY
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.attempts, Duration::from_secs(self.retry.wait_secs))
    }

    /// Encodings in upload order, primary first
    pub fn encodings(&self) -> Vec<Encoding> {
        std::iter::once(Encoding::PRIMARY)
            .chain(self.extra_encodings.iter().copied())
            .collect()
    }

    /// Local scratch root for in-flight shards
    pub fn scratch_dir(&self) -> PathBuf {
        self.work_dir.join("scratch")
    }

    /// Local output directory for one country's deliverables
    pub fn country_output_dir(&self, provider: Provider, iso3: &str) -> PathBuf {
        self.work_dir
            .join(provider.name())
            .join("outputs")
            .join(iso3.to_ascii_lowercase())
    }

    /// Directory the JSON catalog entries are written to
    pub fn catalog_dir(&self) -> PathBuf {
        self.work_dir.join("catalog")
    }
}

/// Deserialize a string map whose values may reference `${VAR}`
fn deserialize_env_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| expand_env_var(&v).map(|v| (k, v)))
        .collect())
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}
