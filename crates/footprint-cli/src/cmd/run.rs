//! `footprint run` - acquire then partition every enabled provider

use anyhow::Result;
use clap::Args;
use footprint_core::{RunConfig, SharedProgress, is_shutdown_requested};

use super::acquire::{acquire_each, ensure_available, split_outcomes};
use super::partition::partition;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip acquisition and partition what the store already holds
    #[arg(long)]
    pub skip_acquire: bool,
}

/// Providers whose manifest was unavailable are not partitioned; the others
/// are, and the acquisition error is returned afterwards.
pub fn run(args: RunArgs, config: &RunConfig, progress: &SharedProgress) -> Result<()> {
    let providers = config.providers.enabled();
    if providers.is_empty() {
        anyhow::bail!("No providers enabled");
    }

    let (acquired, unavailable) = if args.skip_acquire {
        (providers, Vec::new())
    } else {
        split_outcomes(acquire_each(&providers, config, progress)?)
    };

    if !acquired.is_empty() && !is_shutdown_requested() {
        partition(&acquired, config, progress)?;
    }
    ensure_available(&unavailable)
}
