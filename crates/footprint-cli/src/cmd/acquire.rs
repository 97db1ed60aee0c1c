//! `footprint acquire` - mirror provider shards into the object store

use anyhow::{Context, Result};
use clap::Args;
use footprint_acquire::{AcquireError, AcquireSummary, Acquisition};
use footprint_core::{
    GdalConverter, HttpClient, ObjectStoreBackend, Provider, RunConfig, SharedProgress,
    is_shutdown_requested,
};

use super::{ProviderArg, report};

#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Provider to acquire
    #[arg(short, long, value_enum, default_value_t)]
    pub provider: ProviderArg,
}

/// One provider's acquisition result
pub type ProviderOutcome = (Provider, Result<AcquireSummary, AcquireError>);

pub fn run(args: AcquireArgs, config: &RunConfig, progress: &SharedProgress) -> Result<()> {
    let providers = args.provider.resolve(config);
    let (_, unavailable) = split_outcomes(acquire_each(&providers, config, progress)?);
    ensure_available(&unavailable)
}

/// Acquire each provider in turn.
///
/// Only setting up the shared HTTP client or object store fails the whole
/// call. A provider whose manifest is unavailable gets an `Err` outcome and
/// the remaining providers still run.
pub fn acquire_each(
    providers: &[Provider],
    config: &RunConfig,
    progress: &SharedProgress,
) -> Result<Vec<ProviderOutcome>> {
    let http = HttpClient::new(&config.http).context("Failed to build HTTP client")?;
    let store = ObjectStoreBackend::from_config(&config.store)
        .with_context(|| format!("Failed to open object store {}", config.store.url))?;
    let converter = GdalConverter::new(config.tools.gdal.clone());

    let acquisition = Acquisition {
        config,
        http: &http,
        store: &store,
        converter: &converter,
        progress,
    };

    log::info!("Acquiring {} provider(s)", providers.len());
    log::info!("  Store: {}", config.store.url);
    log::info!("  Concurrency: {}", config.concurrency);

    let mut outcomes = Vec::new();
    for &provider in providers {
        if is_shutdown_requested() {
            break;
        }
        let result = acquisition.run(provider);
        match &result {
            Ok(summary) => report::acquisition(summary),
            Err(e) => log::error!("{e}"),
        }
        outcomes.push((provider, result));
    }
    Ok(outcomes)
}

/// Providers whose shards were listed and processed, and the errors of
/// those that could not be
pub fn split_outcomes(outcomes: Vec<ProviderOutcome>) -> (Vec<Provider>, Vec<AcquireError>) {
    let mut acquired = Vec::new();
    let mut unavailable = Vec::new();
    for (provider, result) in outcomes {
        match result {
            Ok(_) => acquired.push(provider),
            Err(e) => unavailable.push(e),
        }
    }
    (acquired, unavailable)
}

pub fn ensure_available(unavailable: &[AcquireError]) -> Result<()> {
    if unavailable.is_empty() {
        return Ok(());
    }
    let reasons: Vec<_> = unavailable.iter().map(|e| e.to_string()).collect();
    anyhow::bail!("Acquisition aborted: {}", reasons.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_down(provider: Provider) -> AcquireError {
        AcquireError::ManifestUnavailable {
            provider,
            reason: "HTTP 503".into(),
        }
    }

    #[test]
    fn unavailable_provider_does_not_drop_the_others() {
        let outcomes = vec![
            (Provider::Google, Err(manifest_down(Provider::Google))),
            (
                Provider::Microsoft,
                Ok(AcquireSummary::empty(Provider::Microsoft)),
            ),
        ];

        let (acquired, unavailable) = split_outcomes(outcomes);
        assert_eq!(acquired, [Provider::Microsoft]);
        assert_eq!(unavailable.len(), 1);

        let err = ensure_available(&unavailable).unwrap_err();
        assert!(err.to_string().contains("google manifest unavailable"));
    }

    #[test]
    fn all_available_is_ok() {
        let (acquired, unavailable) =
            split_outcomes(vec![(Provider::Google, Ok(AcquireSummary::empty(Provider::Google)))]);
        assert_eq!(acquired, [Provider::Google]);
        assert!(ensure_available(&unavailable).is_ok());
    }
}
