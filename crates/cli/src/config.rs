//! Configuration loading: optional TOML file, then `PHOTOSYNC_` environment
//! overrides (`PHOTOSYNC_REMOTE__BASE_URL=...`).

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use photosync_core::config::AppConfig;
use std::path::Path;

pub const ENV_PREFIX: &str = "PHOTOSYNC_";

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        tracing::debug!(config_path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("no config file found at {}", path.display());
    }

    let config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}
