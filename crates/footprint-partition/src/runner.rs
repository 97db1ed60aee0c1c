//! Sequential per-country delivery for one provider

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use footprint_core::progress::fmt_bytes;
use footprint_core::{
    ArchivePackager, FailureKind, FormatConverter, ProgressContext, Provider, RunConfig,
    is_shutdown_requested,
};

use crate::PartitionError;
use crate::catalog::CatalogPublisher;
use crate::engine::SpatialEngine;
use crate::extract::extract_country;
use crate::package::{DeliverableArtifact, Packager};
use crate::partition::Partitioner;

/// Collaborators for one partitioning run
pub struct CountryRunner<'a> {
    pub config: &'a RunConfig,
    pub engine: &'a dyn SpatialEngine,
    pub converter: &'a dyn FormatConverter,
    pub archiver: &'a dyn ArchivePackager,
    pub catalog: &'a dyn CatalogPublisher,
    pub progress: &'a ProgressContext,
}

/// A country that produced no deliverables because of an error
#[derive(Debug, Clone)]
pub struct CountryFailure {
    pub iso3: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug)]
pub struct PartitionSummary {
    pub provider: Provider,
    /// Countries with at least one deliverable, and their artifacts
    pub delivered: Vec<(String, Vec<DeliverableArtifact>)>,
    /// Countries with no intersecting buildings
    pub empty: Vec<String>,
    pub failures: Vec<CountryFailure>,
    /// Never started because shutdown was requested
    pub cancelled: usize,
    pub elapsed: Duration,
}

impl PartitionSummary {
    pub fn artifact_count(&self) -> usize {
        self.delivered.iter().map(|(_, a)| a.len()).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.delivered
            .iter()
            .flat_map(|(_, a)| a.iter())
            .map(|a| a.byte_size)
            .sum()
    }

    pub fn log(&self) {
        log::info!("=== {} partition summary ===", self.provider);
        log::info!(
            "Countries: {} delivered, {} empty, {} failed, {} cancelled",
            self.delivered.len(),
            self.empty.len(),
            self.failures.len(),
            self.cancelled
        );
        log::info!(
            "Artifacts: {} ({})",
            self.artifact_count(),
            fmt_bytes(self.total_bytes())
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        for f in &self.failures {
            log::warn!("  {} [{}]: {}", f.iso3, f.kind, f.message);
        }
    }
}

impl CountryRunner<'_> {
    /// Countries to deliver: the include list when given, otherwise every
    /// admin-0 code, minus the exclude list.
    pub fn countries(&self) -> Result<Vec<String>, PartitionError> {
        let filter = &self.config.countries;
        let candidates = match filter.included() {
            included if !included.is_empty() => included,
            _ => self.engine.countries()?,
        };
        Ok(candidates
            .into_iter()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| filter.admits(c))
            .collect())
    }

    /// Deliver every selected country for `provider`.
    ///
    /// Only failing to list countries fails the run; each country's own
    /// failure is recorded in the summary.
    pub fn run(&self, provider: Provider) -> Result<PartitionSummary, PartitionError> {
        let start = Instant::now();
        let countries = self.countries()?;
        log::info!("Partitioning {} {provider} countries", countries.len());

        let corpus_glob = self.config.store.corpus_glob(provider);
        let mut summary = PartitionSummary {
            provider,
            delivered: Vec::new(),
            empty: Vec::new(),
            failures: Vec::new(),
            cancelled: 0,
            elapsed: Duration::ZERO,
        };

        let total = countries.len();
        for (i, iso3) in countries.iter().enumerate() {
            if is_shutdown_requested() {
                summary.cancelled = total - i;
                log::warn!("Shutdown requested, skipping {} countries", summary.cancelled);
                break;
            }

            let line = self.progress.country_line(provider, iso3);
            line.set_message(format!("{}/{total}", i + 1));
            let result = self.run_country(provider, iso3, &corpus_glob);
            line.finish_and_clear();

            match result {
                Ok(Some(artifacts)) => summary.delivered.push((iso3.clone(), artifacts)),
                Ok(None) => summary.empty.push(iso3.clone()),
                Err(e) => {
                    match e.kind() {
                        FailureKind::CountryNotFound => log::warn!("{iso3}: {e}"),
                        _ => log::error!("{iso3}: {e}"),
                    }
                    summary.failures.push(CountryFailure {
                        iso3: iso3.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        summary.elapsed = start.elapsed();
        summary.log();
        Ok(summary)
    }

    /// Deliver one country into a fresh output directory.
    ///
    /// The directory is removed unless the country produced deliverables.
    pub fn run_country(
        &self,
        provider: Provider,
        iso3: &str,
        corpus_glob: &str,
    ) -> Result<Option<Vec<DeliverableArtifact>>, PartitionError> {
        let out_dir = self.config.country_output_dir(provider, iso3);
        if out_dir.exists() {
            fs::remove_dir_all(&out_dir)?;
        }
        fs::create_dir_all(&out_dir)?;

        let result = self.deliver(provider, iso3, corpus_glob, &out_dir);
        if !matches!(result, Ok(Some(_))) {
            if let Err(e) = fs::remove_dir_all(&out_dir) {
                log::warn!("Failed to remove {}: {e}", out_dir.display());
            }
        }
        result
    }

    fn deliver(
        &self,
        provider: Provider,
        iso3: &str,
        corpus_glob: &str,
        out_dir: &Path,
    ) -> Result<Option<Vec<DeliverableArtifact>>, PartitionError> {
        let Some(merged) = extract_country(self.engine, iso3, corpus_glob, out_dir)? else {
            return Ok(None);
        };

        let packager = Packager::new(self.converter, self.archiver);
        let partitioner = Partitioner::new(self.engine, packager, self.config.max_size);
        let artifacts = partitioner.partition(iso3, &merged, out_dir)?;
        drop(merged);

        self.catalog.publish(provider, iso3, &artifacts)?;
        log::info!(
            "{iso3}: {} deliverable(s) in {}",
            artifacts.len(),
            out_dir.display()
        );
        Ok(Some(artifacts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_totals() {
        let artifact = |name: &str, size| DeliverableArtifact {
            local_path: format!("/out/{name}.gdb.zip").into(),
            byte_size: size,
            logical_name: name.into(),
        };
        let summary = PartitionSummary {
            provider: Provider::Google,
            delivered: vec![
                ("AAA".into(), vec![artifact("aaa_buildings", 10)]),
                (
                    "BBB".into(),
                    vec![artifact("bbb_buildings_part1", 5), artifact("bbb_buildings_part2", 6)],
                ),
            ],
            empty: vec!["CCC".into()],
            failures: Vec::new(),
            cancelled: 0,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(summary.artifact_count(), 3);
        assert_eq!(summary.total_bytes(), 21);
        summary.log();
    }
}
