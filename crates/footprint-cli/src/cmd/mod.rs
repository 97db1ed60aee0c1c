pub mod acquire;
pub mod partition;
pub mod report;
pub mod run;

use clap::ValueEnum;
use footprint_core::{Provider, RunConfig};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ProviderArg {
    Google,
    Microsoft,
    /// Every provider enabled in the configuration
    #[default]
    All,
}

impl ProviderArg {
    pub fn resolve(self, config: &RunConfig) -> Vec<Provider> {
        match self {
            Self::Google => vec![Provider::Google],
            Self::Microsoft => vec![Provider::Microsoft],
            Self::All => config.providers.enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_follows_enabled_providers() {
        let mut config = RunConfig::default();
        assert_eq!(ProviderArg::All.resolve(&config), Provider::ALL);

        config.providers.google.enabled = false;
        assert_eq!(ProviderArg::All.resolve(&config), [Provider::Microsoft]);
        assert_eq!(ProviderArg::Google.resolve(&config), [Provider::Google]);
    }

    #[test]
    fn provider_values_match_config_names() {
        for provider in Provider::ALL {
            let arg = ProviderArg::from_str(provider.name(), true).unwrap();
            assert_eq!(arg.resolve(&RunConfig::default()), [provider]);
        }
        assert!(ProviderArg::from_str("bing", true).is_err());
    }
}
