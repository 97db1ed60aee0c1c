//! Catalog entries for delivered countries

use std::fs;
use std::io;
use std::path::PathBuf;

use footprint_core::Provider;
use serde::Serialize;

use crate::package::DeliverableArtifact;

const TAGS: &[&str] = &["facilities-infrastructure"];
const RESOURCE_FORMAT: &str = "Geodatabase";
const RESOURCE_DESCRIPTION: &str = "Building footprint data as File Geodatabase.";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("writing catalog entry {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("encoding catalog entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishes one catalog dataset per delivered country
pub trait CatalogPublisher {
    fn publish(
        &self,
        provider: Provider,
        iso3: &str,
        artifacts: &[DeliverableArtifact],
    ) -> Result<(), CatalogError>;
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub title: String,
    pub tags: Vec<String>,
    pub subnational: bool,
    pub location: String,
    pub generated_at: String,
    pub resources: Vec<CatalogResource>,
}

#[derive(Debug, Serialize)]
pub struct CatalogResource {
    pub name: String,
    pub description: String,
    pub format: String,
    pub size: u64,
    pub path: PathBuf,
}

impl CatalogEntry {
    pub fn new(provider: Provider, iso3: &str, artifacts: &[DeliverableArtifact]) -> Self {
        Self {
            name: dataset_name(provider, iso3),
            title: format!(
                "{}: {} Building Footprints",
                iso3.to_ascii_uppercase(),
                provider.display_name()
            ),
            tags: TAGS.iter().map(|t| t.to_string()).collect(),
            subnational: true,
            location: iso3.to_ascii_lowercase(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            resources: artifacts
                .iter()
                .map(|a| CatalogResource {
                    name: a.file_name(),
                    description: RESOURCE_DESCRIPTION.to_string(),
                    format: RESOURCE_FORMAT.to_string(),
                    size: a.byte_size,
                    path: a.local_path.clone(),
                })
                .collect(),
        }
    }
}

/// `buildings-{provider}-{iso3}`
pub fn dataset_name(provider: Provider, iso3: &str) -> String {
    format!("buildings-{}-{}", provider.name(), iso3.to_ascii_lowercase())
}

/// [`CatalogPublisher`] writing `{dir}/buildings-{provider}-{iso3}.json`
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    dir: PathBuf,
}

impl JsonCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn entry_path(&self, provider: Provider, iso3: &str) -> PathBuf {
        self.dir.join(format!("{}.json", dataset_name(provider, iso3)))
    }
}

impl CatalogPublisher for JsonCatalog {
    fn publish(
        &self,
        provider: Provider,
        iso3: &str,
        artifacts: &[DeliverableArtifact],
    ) -> Result<(), CatalogError> {
        let path = self.entry_path(provider, iso3);
        let io_err = |source| CatalogError::Io {
            path: path.clone(),
            source,
        };
        let entry = CatalogEntry::new(provider, iso3, artifacts);
        let json = serde_json::to_vec_pretty(&entry)?;

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        // write-then-rename so readers never see a partial entry
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        log::info!("Catalog entry written to {}", path.display());
        Ok(())
    }
}
