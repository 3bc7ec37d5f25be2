use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IpamError, IpamResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Http,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::File => write!(f, "file"),
            StoreBackend::Http => write!(f, "http"),
        }
    }
}

/// Where inventory records are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_name")]
    pub name: String,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "timeout-secs", alias = "timeout_secs")]
    pub timeout_secs: Option<u64>,
}

fn default_store_name() -> String {
    "default".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(StoreBackend::Memory)
    }
}

impl StoreConfig {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend,
            name: default_store_name(),
            path: None,
            url: None,
            token: None,
            timeout_secs: None,
        }
    }

    pub fn validate(&self) -> IpamResult<()> {
        if self.name.is_empty() {
            return Err(IpamError::validation("store.name", "store name cannot be empty"));
        }

        match self.backend {
            StoreBackend::Memory => {}
            StoreBackend::File => {
                if self.path.is_none() {
                    return Err(IpamError::validation(
                        "store.path",
                        "file store requires a data path",
                    ));
                }
            }
            StoreBackend::Http => match &self.url {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(IpamError::validation(
                        "store.url",
                        format!("'{url}' is not an http(s) URL"),
                    ));
                }
                None => {
                    return Err(IpamError::validation(
                        "store.url",
                        "http store requires a base URL",
                    ));
                }
            },
        }

        Ok(())
    }
}
