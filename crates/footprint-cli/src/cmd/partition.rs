//! `footprint partition` - cut the stored corpus into per-country deliverables

use anyhow::{Context, Result};
use clap::Args;
use footprint_core::{
    GdalConverter, Provider, RunConfig, SharedProgress, ZipCommand, is_shutdown_requested,
};
use footprint_partition::{CountryRunner, DuckDbEngine, JsonCatalog, PartitionSummary};

use super::{ProviderArg, report};

#[derive(Args, Debug)]
pub struct PartitionArgs {
    /// Provider whose corpus to partition
    #[arg(short, long, value_enum, default_value_t)]
    pub provider: ProviderArg,
}

pub fn run(args: PartitionArgs, config: &RunConfig, progress: &SharedProgress) -> Result<()> {
    let providers = args.provider.resolve(config);
    partition(&providers, config, progress)?;
    Ok(())
}

pub fn partition(
    providers: &[Provider],
    config: &RunConfig,
    progress: &SharedProgress,
) -> Result<Vec<PartitionSummary>> {
    let engine = DuckDbEngine::open(config).context("Failed to start the spatial engine")?;
    let converter = GdalConverter::new(config.tools.gdal.clone());
    let archiver = ZipCommand::new(config.tools.zip.clone());
    let catalog = JsonCatalog::new(config.catalog_dir());

    let runner = CountryRunner {
        config,
        engine: &engine,
        converter: &converter,
        archiver: &archiver,
        catalog: &catalog,
        progress,
    };

    log::info!("Partitioning {} provider(s)", providers.len());
    log::info!("  Corpus: {}", config.store.query_root());
    log::info!("  Output: {}", config.work_dir.display());
    log::info!("  Max size: {} bytes", config.max_size);

    let mut summaries = Vec::new();
    for &provider in providers {
        if is_shutdown_requested() {
            break;
        }
        let summary = runner
            .run(provider)
            .with_context(|| format!("Failed to partition {provider}"))?;
        report::partition(&summary);
        summaries.push(summary);
    }
    Ok(summaries)
}
