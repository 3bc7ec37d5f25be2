//! Store factory

use std::sync::Arc;

use labipam_core::IpamStore;
use labipam_types::{IpamError, IpamResult, StoreBackend, StoreConfig};

use crate::{HttpStore, MemoryStore};

/// Builds stores from configuration
pub struct StoreFactory;

impl StoreFactory {
    /// Create a store from configuration. File stores are loaded before
    /// they are returned.
    pub async fn create_store(config: &StoreConfig) -> IpamResult<Arc<dyn IpamStore>> {
        config.validate()?;

        let store: Arc<dyn IpamStore> = match config.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new(&config.name)),
            StoreBackend::File => {
                let path = config.path.as_ref().ok_or_else(|| {
                    IpamError::validation("store.path", "file store requires a data path")
                })?;
                let store = MemoryStore::with_storage(&config.name, path);
                store.load_from_storage().await?;
                Arc::new(store)
            }
            StoreBackend::Http => Arc::new(HttpStore::new(config)?),
        };

        log::info!(
            "Using {} store '{}'",
            store.backend(),
            config.name
        );
        Ok(store)
    }
}
