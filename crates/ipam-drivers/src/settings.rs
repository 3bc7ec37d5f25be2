//! Application settings
//!
//! Loaded from an optional TOML file and `LABIPAM_*` environment variables.
//! Nested keys use a double underscore, e.g. `LABIPAM_STORE__BACKEND=file`.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use labipam_types::{IpamError, SiteId, StoreConfig};

pub const ENV_PREFIX: &str = "LABIPAM";

/// Searched in order when no file is given explicitly.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["./labipam.toml", "/etc/labipam/labipam.toml"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] IpamError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreConfig,
    /// Site used when a command does not name one
    #[serde(default = "default_site")]
    pub site: SiteId,
    /// Suggest the first usable address as gateway when none is given
    #[serde(default = "default_smart_gateway")]
    pub smart_gateway: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Listen address of the API server
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_site() -> SiteId {
    1
}

fn default_smart_gateway() -> bool {
    true
}

fn default_page_size() -> u32 {
    256
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            site: default_site(),
            smart_gateway: default_smart_gateway(),
            page_size: default_page_size(),
            listen: default_listen(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the first default location that exists)
    /// with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_environment(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_environment(
        path: Option<&Path>,
        environment: Environment,
    ) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if let Some(found) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| candidate.exists())
                {
                    log::debug!("Using configuration file {}", found.display());
                    builder = builder.add_source(File::from(found.as_path()));
                }
            }
        }

        let settings: Settings = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), IpamError> {
        if self.page_size == 0 {
            return Err(IpamError::validation(
                "page_size",
                "page size must be at least 1",
            ));
        }
        self.store.validate()
    }
}
