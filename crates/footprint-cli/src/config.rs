//! Locating the configuration file and applying command-line overrides

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use footprint_core::RunConfig;

/// Settings given on the command line, applied over the file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    pub max_size: Option<u64>,
    pub countries: Vec<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(size) = self.max_size {
            config.max_size = size;
        }
        if !self.countries.is_empty() {
            config.countries.include = self.countries.clone();
        }
    }
}

/// Load configuration from `explicit`, or from default locations.
///
/// Search order:
/// 1. ./footprint.toml (current directory)
/// 2. ~/.config/footprint/config.toml
///
/// If no config file is found, defaults are used. Overrides are applied
/// and the result validated either way.
pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<RunConfig> {
    let mut config = match explicit.map(Path::to_path_buf).or_else(find_config) {
        Some(path) => {
            let config = RunConfig::from_file(&path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None => {
            log::debug!("No config file found, using defaults");
            RunConfig::default()
        }
    };

    overrides.apply(&mut config);
    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

fn find_config() -> Option<PathBuf> {
    let local_config = PathBuf::from("footprint.toml");
    if local_config.exists() {
        return Some(local_config);
    }

    let dirs = directories::ProjectDirs::from("", "", "footprint")?;
    let user_config = dirs.config_dir().join("config.toml");
    user_config.exists().then_some(user_config)
}
