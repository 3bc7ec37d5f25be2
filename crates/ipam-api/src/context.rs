use std::sync::Arc;

use labipam_core::{
    AllocationEngine, IpamStore, RangeSchemeEngine, SubnetService, SubnetTemplateEngine,
};
use labipam_drivers::{Settings, StoreFactory};
use labipam_types::IpamResult;

/// Shared state of the API handlers
pub struct AppContext {
    pub store: Arc<dyn IpamStore>,
    pub subnets: SubnetService,
    pub allocation: AllocationEngine,
    pub schemes: RangeSchemeEngine,
    pub templates: SubnetTemplateEngine,
    pub smart_gateway: bool,
    pub page_size: u32,
}

impl AppContext {
    pub fn new(store: Arc<dyn IpamStore>, smart_gateway: bool, page_size: u32) -> Arc<Self> {
        Arc::new(Self {
            subnets: SubnetService::new(store.clone()),
            allocation: AllocationEngine::new(store.clone()),
            schemes: RangeSchemeEngine::new(store.clone()),
            templates: SubnetTemplateEngine::new(store.clone(), smart_gateway),
            store,
            smart_gateway,
            page_size,
        })
    }

    pub async fn bootstrap(settings: &Settings) -> IpamResult<Arc<Self>> {
        let store = StoreFactory::create_store(&settings.store).await?;
        Ok(Self::new(store, settings.smart_gateway, settings.page_size))
    }
}
