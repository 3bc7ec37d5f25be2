//! In-memory store
//!
//! Keeps every entity in process memory. Given a storage path, the whole
//! state is loaded from and written back to a single JSON document.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use labipam_core::IpamStore;
use labipam_types::{
    Device, DeviceId, IpAddressRecord, IpRange, IpamError, IpamResult, RangeId, RangeScheme,
    RecordId, SchemeId, SiteId, StoreBackend, Subnet, SubnetId, SubnetTemplate, TemplateId,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    next_id: u64,
    subnets: IndexMap<SubnetId, Subnet>,
    addresses: IndexMap<RecordId, IpAddressRecord>,
    devices: IndexMap<DeviceId, Device>,
    ranges: IndexMap<RangeId, IpRange>,
    schemes: IndexMap<SchemeId, RangeScheme>,
    templates: IndexMap<TemplateId, SubnetTemplate>,
}

impl StoreState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn require_subnet(&self, id: SubnetId) -> IpamResult<&Subnet> {
        self.subnets
            .get(&id)
            .ok_or_else(|| IpamError::not_found("subnet", id))
    }

    fn address_taken(&self, record: &IpAddressRecord) -> bool {
        self.addresses.values().any(|existing| {
            existing.id != record.id
                && existing.subnet_id == record.subnet_id
                && existing.address == record.address
        })
    }
}

/// Store keeping inventory in memory, optionally persisted as JSON
pub struct MemoryStore {
    name: String,
    storage_path: Option<PathBuf>,
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    /// Create a volatile store
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            storage_path: None,
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Create a store that writes its state to `path` after every change
    pub fn with_storage(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: Some(path.into()),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    /// Load state from the storage file, if one is configured and exists
    pub async fn load_from_storage(&self) -> IpamResult<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let data: StoreState = serde_json::from_str(&content)?;
                let mut state = self.state.write().await;
                *state = data;

                log::info!(
                    "Loaded store '{}' from {} ({} subnets, {} records, {} devices)",
                    self.name,
                    path.display(),
                    state.subnets.len(),
                    state.addresses.len(),
                    state.devices.len()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "No existing data found at {}, starting fresh",
                    path.display()
                );
            }
            Err(e) => {
                log::warn!("Failed to load store data from {}: {}", path.display(), e);
                return Err(e.into());
            }
        }

        Ok(())
    }

    async fn save_to_storage(&self, state: &StoreState) -> IpamResult<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let content = serde_json::to_string_pretty(state)?;

        // Write atomically using temporary file
        let mut temp_path = path.clone().into_os_string();
        temp_path.push(".tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;

        log::debug!("Saved store '{}' to {}", self.name, path.display());
        Ok(())
    }

    /// Run a mutation under the write lock and persist the result
    ///
    /// The change is applied to a copy of the state, which replaces the live
    /// state only after it has been saved.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut StoreState) -> IpamResult<T>,
    ) -> IpamResult<T> {
        let mut state = self.state.write().await;
        let mut draft = state.clone();
        let value = change(&mut draft)?;
        self.save_to_storage(&draft).await?;
        *state = draft;
        Ok(value)
    }
}

#[async_trait]
impl IpamStore for MemoryStore {
    fn backend(&self) -> StoreBackend {
        if self.storage_path.is_some() {
            StoreBackend::File
        } else {
            StoreBackend::Memory
        }
    }

    async fn list_subnets(&self, site: SiteId) -> IpamResult<Vec<Subnet>> {
        let state = self.state.read().await;
        let mut subnets: Vec<Subnet> = state
            .subnets
            .values()
            .filter(|subnet| subnet.site_id == site)
            .cloned()
            .collect();
        subnets.sort_by_key(|subnet| (subnet.prefix, subnet.mask));
        Ok(subnets)
    }

    async fn list_all_subnets(&self) -> IpamResult<Vec<Subnet>> {
        let state = self.state.read().await;
        let mut subnets: Vec<Subnet> = state.subnets.values().cloned().collect();
        subnets.sort_by_key(|subnet| (subnet.site_id, subnet.prefix, subnet.mask));
        Ok(subnets)
    }

    async fn get_subnet(&self, id: SubnetId) -> IpamResult<Option<Subnet>> {
        Ok(self.state.read().await.subnets.get(&id).cloned())
    }

    async fn create_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet> {
        self.mutate(|state| {
            let mut subnet = subnet.clone();
            subnet.id = state.allocate_id();
            state.subnets.insert(subnet.id, subnet.clone());
            Ok(subnet)
        })
        .await
    }

    async fn update_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet> {
        self.mutate(|state| {
            let slot = state
                .subnets
                .get_mut(&subnet.id)
                .ok_or_else(|| IpamError::not_found("subnet", subnet.id))?;
            *slot = subnet.clone();
            Ok(subnet.clone())
        })
        .await
    }

    async fn delete_subnet(&self, id: SubnetId) -> IpamResult<()> {
        self.mutate(|state| {
            state
                .subnets
                .shift_remove(&id)
                .map(|_| ())
                .ok_or_else(|| IpamError::not_found("subnet", id))
        })
        .await
    }

    async fn list_addresses(&self, subnet: SubnetId) -> IpamResult<Vec<IpAddressRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<IpAddressRecord> = state
            .addresses
            .values()
            .filter(|record| record.subnet_id == subnet)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.address);
        Ok(records)
    }

    async fn get_address(&self, id: RecordId) -> IpamResult<Option<IpAddressRecord>> {
        Ok(self.state.read().await.addresses.get(&id).cloned())
    }

    async fn create_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord> {
        self.mutate(|state| {
            state.require_subnet(record.subnet_id)?;

            let mut record = record.clone();
            record.id = 0;
            if state.address_taken(&record) {
                return Err(IpamError::conflict(
                    "address",
                    format!(
                        "{} already has a record in subnet {}",
                        record.address, record.subnet_id
                    ),
                ));
            }

            record.id = state.allocate_id();
            record.updated_at = Some(chrono::Utc::now());
            state.addresses.insert(record.id, record.clone());
            Ok(record)
        })
        .await
    }

    async fn update_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord> {
        self.mutate(|state| {
            if !state.addresses.contains_key(&record.id) {
                return Err(IpamError::not_found("address", record.id));
            }
            state.require_subnet(record.subnet_id)?;
            if state.address_taken(record) {
                return Err(IpamError::conflict(
                    "address",
                    format!(
                        "{} already has a record in subnet {}",
                        record.address, record.subnet_id
                    ),
                ));
            }

            let mut record = record.clone();
            record.updated_at = Some(chrono::Utc::now());
            state.addresses.insert(record.id, record.clone());
            Ok(record)
        })
        .await
    }

    async fn delete_address(&self, id: RecordId) -> IpamResult<()> {
        self.mutate(|state| {
            state
                .addresses
                .shift_remove(&id)
                .map(|_| ())
                .ok_or_else(|| IpamError::not_found("address", id))
        })
        .await
    }

    async fn list_devices(&self, site: SiteId) -> IpamResult<Vec<Device>> {
        let state = self.state.read().await;
        Ok(state
            .devices
            .values()
            .filter(|device| device.site_id == site)
            .cloned()
            .collect())
    }

    async fn get_device(&self, id: DeviceId) -> IpamResult<Option<Device>> {
        Ok(self.state.read().await.devices.get(&id).cloned())
    }

    async fn create_device(&self, device: &Device) -> IpamResult<Device> {
        self.mutate(|state| {
            let mut device = device.clone();
            device.id = state.allocate_id();
            state.devices.insert(device.id, device.clone());
            Ok(device)
        })
        .await
    }

    async fn update_device(&self, device: &Device) -> IpamResult<Device> {
        self.mutate(|state| {
            let slot = state
                .devices
                .get_mut(&device.id)
                .ok_or_else(|| IpamError::not_found("device", device.id))?;
            *slot = device.clone();
            Ok(device.clone())
        })
        .await
    }

    async fn delete_device(&self, id: DeviceId) -> IpamResult<()> {
        self.mutate(|state| {
            state
                .devices
                .shift_remove(&id)
                .map(|_| ())
                .ok_or_else(|| IpamError::not_found("device", id))
        })
        .await
    }

    async fn list_ranges(&self, subnet: SubnetId) -> IpamResult<Vec<IpRange>> {
        let state = self.state.read().await;
        let mut ranges: Vec<IpRange> = state
            .ranges
            .values()
            .filter(|range| range.subnet_id == subnet)
            .cloned()
            .collect();
        ranges.sort_by_key(|range| (range.start_addr, range.end_addr));
        Ok(ranges)
    }

    async fn get_range(&self, id: RangeId) -> IpamResult<Option<IpRange>> {
        Ok(self.state.read().await.ranges.get(&id).cloned())
    }

    async fn create_range(&self, range: &IpRange) -> IpamResult<IpRange> {
        self.mutate(|state| {
            state.require_subnet(range.subnet_id)?;
            let mut range = range.clone();
            range.id = state.allocate_id();
            state.ranges.insert(range.id, range.clone());
            Ok(range)
        })
        .await
    }

    async fn update_range(&self, range: &IpRange) -> IpamResult<IpRange> {
        self.mutate(|state| {
            let slot = state
                .ranges
                .get_mut(&range.id)
                .ok_or_else(|| IpamError::not_found("range", range.id))?;
            *slot = range.clone();
            Ok(range.clone())
        })
        .await
    }

    async fn delete_range(&self, id: RangeId) -> IpamResult<()> {
        self.mutate(|state| {
            state
                .ranges
                .shift_remove(&id)
                .map(|_| ())
                .ok_or_else(|| IpamError::not_found("range", id))
        })
        .await
    }

    async fn list_schemes(&self) -> IpamResult<Vec<RangeScheme>> {
        Ok(self.state.read().await.schemes.values().cloned().collect())
    }

    async fn get_scheme(&self, id: SchemeId) -> IpamResult<Option<RangeScheme>> {
        Ok(self.state.read().await.schemes.get(&id).cloned())
    }

    async fn create_scheme(&self, scheme: &RangeScheme) -> IpamResult<RangeScheme> {
        self.mutate(|state| {
            if state.schemes.values().any(|existing| existing.name == scheme.name) {
                return Err(IpamError::conflict(
                    "scheme",
                    format!("a scheme named '{}' already exists", scheme.name),
                ));
            }
            let mut scheme = scheme.clone();
            scheme.id = state.allocate_id();
            state.schemes.insert(scheme.id, scheme.clone());
            Ok(scheme)
        })
        .await
    }

    async fn delete_scheme(&self, id: SchemeId) -> IpamResult<()> {
        self.mutate(|state| {
            state
                .schemes
                .shift_remove(&id)
                .map(|_| ())
                .ok_or_else(|| IpamError::not_found("scheme", id))
        })
        .await
    }

    async fn list_templates(&self) -> IpamResult<Vec<SubnetTemplate>> {
        Ok(self.state.read().await.templates.values().cloned().collect())
    }

    async fn get_template(&self, id: TemplateId) -> IpamResult<Option<SubnetTemplate>> {
        Ok(self.state.read().await.templates.get(&id).cloned())
    }

    async fn create_template(&self, template: &SubnetTemplate) -> IpamResult<SubnetTemplate> {
        self.mutate(|state| {
            if state
                .templates
                .values()
                .any(|existing| existing.name == template.name)
            {
                return Err(IpamError::conflict(
                    "template",
                    format!("a template named '{}' already exists", template.name),
                ));
            }
            let mut template = template.clone();
            template.id = state.allocate_id();
            state.templates.insert(template.id, template.clone());
            Ok(template)
        })
        .await
    }

    async fn delete_template(&self, id: TemplateId) -> IpamResult<()> {
        self.mutate(|state| {
            state
                .templates
                .shift_remove(&id)
                .map(|_| ())
                .ok_or_else(|| IpamError::not_found("template", id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_ids_are_assigned_by_store() {
        let store = MemoryStore::new("test");
        let mut draft = Subnet::new(1, Ipv4Addr::new(10, 0, 0, 0), 24);
        draft.id = 99;

        let first = store.create_subnet(&draft).await.unwrap();
        let second = store.create_subnet(&draft).await.unwrap();
        assert_ne!(first.id, 99);
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_duplicate_address_conflicts() {
        let store = MemoryStore::new("test");
        let subnet = store
            .create_subnet(&Subnet::new(1, Ipv4Addr::new(10, 0, 0, 0), 24))
            .await
            .unwrap();

        let record = IpAddressRecord::new(subnet.id, Ipv4Addr::new(10, 0, 0, 5), 24);
        store.create_address(&record).await.unwrap();
        let err = store.create_address(&record).await.unwrap_err();
        assert!(matches!(err, IpamError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_missing_entities() {
        let store = MemoryStore::new("test");
        assert!(store.get_device(42).await.unwrap().is_none());
        assert!(matches!(
            store.delete_range(42).await,
            Err(IpamError::NotFound { .. })
        ));
        assert!(matches!(
            store.update_device(&Device::new(1, "ghost")).await,
            Err(IpamError::NotFound { .. })
        ));

        // Records and ranges need an existing subnet
        let record = IpAddressRecord::new(7, Ipv4Addr::new(10, 0, 0, 5), 24);
        assert!(matches!(
            store.create_address(&record).await,
            Err(IpamError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory").join("lab.json");

        let store = MemoryStore::with_storage("lab", &path);
        assert_eq!(store.backend(), StoreBackend::File);
        let subnet = store
            .create_subnet(&Subnet::new(1, Ipv4Addr::new(192, 168, 1, 0), 24))
            .await
            .unwrap();
        store
            .create_device(&Device::new(1, "nas").with_address(Ipv4Addr::new(192, 168, 1, 10)))
            .await
            .unwrap();
        assert!(path.exists());

        let reloaded = MemoryStore::with_storage("lab", &path);
        reloaded.load_from_storage().await.unwrap();
        assert_eq!(
            reloaded.get_subnet(subnet.id).await.unwrap(),
            Some(subnet.clone())
        );
        assert_eq!(reloaded.list_devices(1).await.unwrap().len(), 1);

        // Ids keep increasing after a reload
        let next = reloaded.create_device(&Device::new(1, "tv")).await.unwrap();
        assert!(next.id > subnet.id + 1);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        // The parent of the storage file is a regular file
        let store = MemoryStore::with_storage("lab", blocker.join("state.json"));
        let result = store
            .create_subnet(&Subnet::new(1, Ipv4Addr::new(10, 0, 0, 0), 24))
            .await;
        assert!(result.is_err());
        assert!(store.list_subnets(1).await.unwrap().is_empty());

        // The id handed out by the failed write is not consumed
        assert_eq!(store.state.read().await.next_id, 0);
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::with_storage("lab", dir.path().join("absent.json"));
        store.load_from_storage().await.unwrap();
        assert!(store.list_subnets(1).await.unwrap().is_empty());
    }
}
