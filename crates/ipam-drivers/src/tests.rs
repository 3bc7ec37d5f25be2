//! Engine scenarios against real stores

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use labipam_core::{
    AllocationEngine, BindingRequest, CellStatus, IpamStore, RangeSchemeEngine, SubnetService,
    SubnetTemplateEngine, TemplateRef,
};
use labipam_types::{
    Device, DeviceId, FollowUpStep, IpAddressRecord, IpRange, IpamError, IpamResult, RangeId,
    RangeScheme, RecordId, SchemeId, SiteId, StoreBackend, Subnet, SubnetId, SubnetTemplate,
    TemplateId,
};

use crate::MemoryStore;

const SITE: SiteId = 1;

/// Store wrapper that fails chosen operations
struct FailingStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FailingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new("failing"),
            failing: Mutex::new(HashSet::new()),
        }
    }

    fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, operation: &'static str) -> IpamResult<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(IpamError::store(format!("{operation} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl IpamStore for FailingStore {
    fn backend(&self) -> StoreBackend {
        self.inner.backend()
    }

    async fn list_subnets(&self, site: SiteId) -> IpamResult<Vec<Subnet>> {
        self.check("list_subnets")?;
        self.inner.list_subnets(site).await
    }

    async fn list_all_subnets(&self) -> IpamResult<Vec<Subnet>> {
        self.check("list_all_subnets")?;
        self.inner.list_all_subnets().await
    }

    async fn get_subnet(&self, id: SubnetId) -> IpamResult<Option<Subnet>> {
        self.inner.get_subnet(id).await
    }

    async fn create_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet> {
        self.inner.create_subnet(subnet).await
    }

    async fn update_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet> {
        self.inner.update_subnet(subnet).await
    }

    async fn delete_subnet(&self, id: SubnetId) -> IpamResult<()> {
        self.inner.delete_subnet(id).await
    }

    async fn list_addresses(&self, subnet: SubnetId) -> IpamResult<Vec<IpAddressRecord>> {
        self.inner.list_addresses(subnet).await
    }

    async fn get_address(&self, id: RecordId) -> IpamResult<Option<IpAddressRecord>> {
        self.inner.get_address(id).await
    }

    async fn create_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord> {
        self.check("create_address")?;
        self.inner.create_address(record).await
    }

    async fn update_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord> {
        self.check("update_address")?;
        self.inner.update_address(record).await
    }

    async fn delete_address(&self, id: RecordId) -> IpamResult<()> {
        self.check("delete_address")?;
        self.inner.delete_address(id).await
    }

    async fn list_devices(&self, site: SiteId) -> IpamResult<Vec<Device>> {
        self.inner.list_devices(site).await
    }

    async fn get_device(&self, id: DeviceId) -> IpamResult<Option<Device>> {
        self.inner.get_device(id).await
    }

    async fn create_device(&self, device: &Device) -> IpamResult<Device> {
        self.inner.create_device(device).await
    }

    async fn update_device(&self, device: &Device) -> IpamResult<Device> {
        if device.ip_address.is_none() {
            self.check("clear_device")?;
        } else {
            self.check("point_device")?;
        }
        self.inner.update_device(device).await
    }

    async fn delete_device(&self, id: DeviceId) -> IpamResult<()> {
        self.inner.delete_device(id).await
    }

    async fn list_ranges(&self, subnet: SubnetId) -> IpamResult<Vec<IpRange>> {
        self.inner.list_ranges(subnet).await
    }

    async fn get_range(&self, id: RangeId) -> IpamResult<Option<IpRange>> {
        self.inner.get_range(id).await
    }

    async fn create_range(&self, range: &IpRange) -> IpamResult<IpRange> {
        self.check("create_range")?;
        self.inner.create_range(range).await
    }

    async fn update_range(&self, range: &IpRange) -> IpamResult<IpRange> {
        self.inner.update_range(range).await
    }

    async fn delete_range(&self, id: RangeId) -> IpamResult<()> {
        self.check("delete_range")?;
        self.inner.delete_range(id).await
    }

    async fn list_schemes(&self) -> IpamResult<Vec<RangeScheme>> {
        self.inner.list_schemes().await
    }

    async fn get_scheme(&self, id: SchemeId) -> IpamResult<Option<RangeScheme>> {
        self.inner.get_scheme(id).await
    }

    async fn create_scheme(&self, scheme: &RangeScheme) -> IpamResult<RangeScheme> {
        self.inner.create_scheme(scheme).await
    }

    async fn delete_scheme(&self, id: SchemeId) -> IpamResult<()> {
        self.inner.delete_scheme(id).await
    }

    async fn list_templates(&self) -> IpamResult<Vec<SubnetTemplate>> {
        self.inner.list_templates().await
    }

    async fn get_template(&self, id: TemplateId) -> IpamResult<Option<SubnetTemplate>> {
        self.inner.get_template(id).await
    }

    async fn create_template(&self, template: &SubnetTemplate) -> IpamResult<SubnetTemplate> {
        self.inner.create_template(template).await
    }

    async fn delete_template(&self, id: TemplateId) -> IpamResult<()> {
        self.inner.delete_template(id).await
    }
}

/// Create test subnet
async fn create_test_subnet(store: &dyn IpamStore, prefix: [u8; 4], mask: u8) -> Subnet {
    store
        .create_subnet(&Subnet::new(SITE, Ipv4Addr::from(prefix), mask))
        .await
        .unwrap()
}

async fn create_test_device(store: &dyn IpamStore, name: &str, address: Option<[u8; 4]>) -> Device {
    let mut device = Device::new(SITE, name);
    device.ip_address = address.map(Ipv4Addr::from);
    store.create_device(&device).await.unwrap()
}

async fn holders(store: &dyn IpamStore, address: Ipv4Addr) -> Vec<DeviceId> {
    store
        .list_devices(SITE)
        .await
        .unwrap()
        .into_iter()
        .filter(|device| device.ip_address == Some(address))
        .map(|device| device.id)
        .collect()
}

async fn records_for(store: &dyn IpamStore, address: Ipv4Addr) -> Vec<IpAddressRecord> {
    let mut found = Vec::new();
    for subnet in store.list_subnets(SITE).await.unwrap() {
        for record in store.list_addresses(subnet.id).await.unwrap() {
            if record.address == address {
                found.push(record);
            }
        }
    }
    found
}

#[tokio::test]
async fn test_rebind_moves_device_and_removes_old_record() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let device = create_test_device(store.as_ref(), "nas", None).await;

    let old = Ipv4Addr::new(10, 0, 0, 20);
    let new = Ipv4Addr::new(10, 0, 0, 30);

    let first = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.20").for_device(device.id))
        .await
        .unwrap();
    assert_eq!(first.record.assigned_to, "nas");

    let second = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.30").for_device(device.id))
        .await
        .unwrap();

    let device = store.get_device(device.id).await.unwrap().unwrap();
    assert_eq!(device.ip_address, Some(new));
    assert!(records_for(store.as_ref(), old).await.is_empty());
    assert_eq!(second.removed_records, vec![first.record.id]);
    assert_eq!(holders(store.as_ref(), new).await, vec![device.id]);
    assert_eq!(records_for(store.as_ref(), new).await.len(), 1);
}

#[tokio::test]
async fn test_second_assignment_vacates_first_holder() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [192, 168, 1, 0], 24).await;
    let laptop = create_test_device(store.as_ref(), "laptop", None).await;
    let phone = create_test_device(store.as_ref(), "phone", None).await;
    let address = Ipv4Addr::new(192, 168, 1, 50);

    engine
        .assign(&BindingRequest::new(lan.id, "192.168.1.50").for_device(laptop.id))
        .await
        .unwrap();
    let outcome = engine
        .assign(&BindingRequest::new(lan.id, "192.168.1.50").for_device(phone.id))
        .await
        .unwrap();

    assert_eq!(outcome.vacated_device, Some(laptop.id));
    assert_eq!(holders(store.as_ref(), address).await, vec![phone.id]);

    let records = records_for(store.as_ref(), address).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].assigned_to, "phone");
}

#[tokio::test]
async fn test_old_address_kept_when_reused_by_another_device() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;

    let old = Ipv4Addr::new(10, 0, 0, 40);
    let mover = create_test_device(store.as_ref(), "mover", Some([10, 0, 0, 40])).await;
    let _twin = create_test_device(store.as_ref(), "twin", Some([10, 0, 0, 40])).await;
    store
        .create_address(&IpAddressRecord::new(lan.id, old, 24))
        .await
        .unwrap();

    let outcome = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.41").for_device(mover.id))
        .await
        .unwrap();

    assert!(outcome.removed_records.is_empty());
    assert_eq!(records_for(store.as_ref(), old).await.len(), 1);
}

#[tokio::test]
async fn test_edit_without_device_vacates_holder() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let printer = create_test_device(store.as_ref(), "printer", None).await;
    let address = Ipv4Addr::new(10, 0, 0, 9);

    engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.9").for_device(printer.id))
        .await
        .unwrap();

    let mut edit = BindingRequest::new(lan.id, " 10.0.0.9 ");
    edit.dns_name = Some("printer.lan".to_string());
    let outcome = engine.assign(&edit).await.unwrap();

    // The record keeps its fields, the device no longer holds the address
    assert_eq!(outcome.record.dns_name, "printer.lan");
    assert_eq!(outcome.record.assigned_to, "printer");
    assert_eq!(outcome.vacated_device, Some(printer.id));
    assert!(outcome.device.is_none());
    assert!(holders(store.as_ref(), address).await.is_empty());

    let printer = store.get_device(printer.id).await.unwrap().unwrap();
    assert_eq!(printer.ip_address, None);
    assert_eq!(records_for(store.as_ref(), address).await.len(), 1);
}

#[tokio::test]
async fn test_device_only_holder_vacated_by_plain_record() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let camera = create_test_device(store.as_ref(), "camera", Some([10, 0, 0, 9])).await;

    let outcome = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.9"))
        .await
        .unwrap();

    assert_eq!(outcome.vacated_device, Some(camera.id));
    assert!(holders(store.as_ref(), Ipv4Addr::new(10, 0, 0, 9)).await.is_empty());
    assert!(engine.device_only_bindings(SITE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_orphans_removed_in_other_sites() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let device = create_test_device(store.as_ref(), "nas", Some([172, 16, 0, 5])).await;

    // A subnet of another site still carries a record for the old address
    let remote = store
        .create_subnet(&Subnet::new(SITE + 1, Ipv4Addr::new(172, 16, 0, 0), 24))
        .await
        .unwrap();
    let stale = store
        .create_address(&IpAddressRecord::new(remote.id, Ipv4Addr::new(172, 16, 0, 5), 24))
        .await
        .unwrap();

    let outcome = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.5").for_device(device.id))
        .await
        .unwrap();

    assert_eq!(outcome.removed_records, vec![stale.id]);
    assert!(store.list_addresses(remote.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_requests_have_no_side_effects() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let device = create_test_device(store.as_ref(), "nas", Some([10, 0, 0, 5])).await;

    let cases = [
        (BindingRequest::new(lan.id, "10.0.0.256"), "validation"),
        (BindingRequest::new(lan.id, "10.0.0"), "validation"),
        (BindingRequest::new(lan.id, "10.0.1.7"), "validation"),
        (BindingRequest::new(lan.id, "10.0.0.0"), "validation"),
        (BindingRequest::new(lan.id, "10.0.0.255"), "validation"),
        (BindingRequest::new(999, "10.0.0.7"), "not-found"),
        (BindingRequest::new(lan.id, "10.0.0.7").for_device(999), "not-found"),
    ];

    for (request, kind) in &cases {
        let err = engine.assign(request).await.unwrap_err();
        assert_eq!(err.kind().as_str(), *kind, "{}", request.address);
    }

    assert!(store.list_addresses(lan.id).await.unwrap().is_empty());
    let device = store.get_device(device.id).await.unwrap().unwrap();
    assert_eq!(device.ip_address, Some(Ipv4Addr::new(10, 0, 0, 5)));
}

#[tokio::test]
async fn test_primary_write_failure_touches_nothing() {
    let store = Arc::new(FailingStore::new());
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let holder = create_test_device(store.as_ref(), "holder", Some([10, 0, 0, 7])).await;
    let target = create_test_device(store.as_ref(), "target", None).await;

    store.fail("create_address");
    let err = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.7").for_device(target.id))
        .await
        .unwrap_err();

    assert!(matches!(err, IpamError::Store { .. }));
    assert!(err.failed_step().is_none());
    assert_eq!(
        holders(store.as_ref(), Ipv4Addr::new(10, 0, 0, 7)).await,
        vec![holder.id]
    );
}

#[tokio::test]
async fn test_vacate_failure_is_partial() {
    let store = Arc::new(FailingStore::new());
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let holder = create_test_device(store.as_ref(), "holder", Some([10, 0, 0, 7])).await;
    let target = create_test_device(store.as_ref(), "target", None).await;

    store.fail("clear_device");
    let err = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.7").for_device(target.id))
        .await
        .unwrap_err();

    assert_eq!(
        err.failed_step(),
        Some(FollowUpStep::VacatePreviousHolder {
            device_id: holder.id
        })
    );
    // The record stays, and later steps never ran
    assert_eq!(records_for(store.as_ref(), Ipv4Addr::new(10, 0, 0, 7)).await.len(), 1);
    let target_now = store.get_device(target.id).await.unwrap().unwrap();
    assert_eq!(target_now.ip_address, None);
}

#[tokio::test]
async fn test_orphan_removal_failure_is_partial() {
    let store = Arc::new(FailingStore::new());
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let device = create_test_device(store.as_ref(), "nas", None).await;

    engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.20").for_device(device.id))
        .await
        .unwrap();

    store.fail("delete_address");
    let err = engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.21").for_device(device.id))
        .await
        .unwrap_err();

    match &err {
        IpamError::PartialFailure {
            step, address, ..
        } => {
            assert_eq!(
                *step,
                FollowUpStep::RemoveOrphanedRecord {
                    address: Ipv4Addr::new(10, 0, 0, 20)
                }
            );
            assert_eq!(*address, Ipv4Addr::new(10, 0, 0, 21));
        }
        other => panic!("expected partial failure, got {other}"),
    }
    assert_eq!(err.kind().as_str(), "partial-failure");
}

#[tokio::test]
async fn test_rerun_completes_partial_binding() {
    let store = Arc::new(FailingStore::new());
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let device = create_test_device(store.as_ref(), "camera", None).await;
    let request = BindingRequest::new(lan.id, "10.0.0.60").for_device(device.id);

    store.fail("point_device");
    let err = engine.assign(&request).await.unwrap_err();
    assert_eq!(
        err.failed_step(),
        Some(FollowUpStep::PointDeviceAtAddress {
            device_id: device.id
        })
    );
    assert_eq!(records_for(store.as_ref(), Ipv4Addr::new(10, 0, 0, 60)).await.len(), 1);

    store.recover();
    let outcome = engine.assign(&request).await.unwrap();
    assert_eq!(
        outcome.device.and_then(|device| device.ip_address),
        Some(Ipv4Addr::new(10, 0, 0, 60))
    );
    assert_eq!(records_for(store.as_ref(), Ipv4Addr::new(10, 0, 0, 60)).await.len(), 1);
}

#[tokio::test]
async fn test_release_reveals_device_only_binding() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [192, 168, 1, 0], 24).await;
    let device = create_test_device(store.as_ref(), "tv", None).await;

    let outcome = engine
        .assign(&BindingRequest::new(lan.id, "192.168.1.80").for_device(device.id))
        .await
        .unwrap();
    assert!(engine.device_only_bindings(SITE).await.unwrap().is_empty());

    engine.release(outcome.record.id).await.unwrap();
    let device = store.get_device(device.id).await.unwrap().unwrap();
    assert_eq!(device.ip_address, Some(Ipv4Addr::new(192, 168, 1, 80)));

    let bindings = engine.device_only_bindings(SITE).await.unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].device, device.id);
    assert_eq!(bindings[0].subnet, Some(lan.id));

    // Promote turns it back into a record
    let record = engine.promote(device.id).await.unwrap();
    assert_eq!(record.assigned_to, "tv");
    assert_eq!(record.subnet_id, lan.id);
    assert!(engine.device_only_bindings(SITE).await.unwrap().is_empty());
    assert!(matches!(
        engine.promote(device.id).await,
        Err(IpamError::Conflict { .. })
    ));
}

#[tokio::test]
async fn test_promote_picks_most_specific_subnet() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let _wide = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 16).await;
    let narrow = create_test_subnet(store.as_ref(), [10, 0, 5, 0], 24).await;
    let device = create_test_device(store.as_ref(), "sensor", Some([10, 0, 5, 9])).await;
    let homeless = create_test_device(store.as_ref(), "roamer", Some([172, 16, 0, 9])).await;
    let empty = create_test_device(store.as_ref(), "spare", None).await;

    let record = engine.promote(device.id).await.unwrap();
    assert_eq!(record.subnet_id, narrow.id);
    assert_eq!(record.mask, 24);

    assert!(matches!(
        engine.promote(homeless.id).await,
        Err(IpamError::Validation { .. })
    ));
    assert!(matches!(
        engine.promote(empty.id).await,
        Err(IpamError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_unbind_leaves_records() {
    let store = Arc::new(MemoryStore::new("test"));
    let engine = AllocationEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;
    let device = create_test_device(store.as_ref(), "nas", None).await;

    engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.20").for_device(device.id))
        .await
        .unwrap();

    let device = engine.unbind(device.id).await.unwrap();
    assert_eq!(device.ip_address, None);
    assert_eq!(records_for(store.as_ref(), Ipv4Addr::new(10, 0, 0, 20)).await.len(), 1);

    // Unbinding again is a no-op
    assert_eq!(engine.unbind(device.id).await.unwrap().ip_address, None);
}

async fn range_triples(store: &dyn IpamStore, subnet: SubnetId) -> Vec<(u8, u8, String)> {
    let mut triples: Vec<(u8, u8, String)> = store
        .list_ranges(subnet)
        .await
        .unwrap()
        .into_iter()
        .map(|range| {
            (
                range.start_addr.octets()[3],
                range.end_addr.octets()[3],
                range.role,
            )
        })
        .collect();
    triples.sort();
    triples
}

#[tokio::test]
async fn test_scheme_roundtrip() {
    let store = Arc::new(MemoryStore::new("test"));
    let subnets = SubnetService::new(store.clone());
    let schemes = RangeSchemeEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [192, 168, 1, 0], 24).await;

    for (start, end, role) in [(2, 49, "static"), (100, 199, "dhcp"), (250, 254, "infra")] {
        subnets
            .add_range(IpRange::new(
                lan.id,
                Ipv4Addr::new(192, 168, 1, start),
                Ipv4Addr::new(192, 168, 1, end),
                role,
            ))
            .await
            .unwrap();
    }
    let before = range_triples(store.as_ref(), lan.id).await;

    let scheme = schemes.save_scheme(lan.id, "home", "").await.unwrap();
    assert_eq!(scheme.entries.len(), 3);

    let applied = schemes.apply_scheme(lan.id, scheme.id, true).await.unwrap();
    assert_eq!(applied.len(), 3);
    assert_eq!(range_triples(store.as_ref(), lan.id).await, before);

    // Same layout on another subnet
    let lab = create_test_subnet(store.as_ref(), [10, 1, 2, 0], 24).await;
    let ranges = schemes.apply_scheme(lab.id, scheme.id, false).await.unwrap();
    assert!(ranges
        .iter()
        .any(|range| range.start_addr == Ipv4Addr::new(10, 1, 2, 100)));
    assert_eq!(range_triples(store.as_ref(), lab.id).await, before);
}

#[tokio::test]
async fn test_scheme_errors() {
    let store = Arc::new(MemoryStore::new("test"));
    let subnets = SubnetService::new(store.clone());
    let schemes = RangeSchemeEngine::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [192, 168, 1, 0], 24).await;

    assert!(matches!(
        schemes.save_scheme(lan.id, "empty", "").await,
        Err(IpamError::Validation { .. })
    ));
    assert!(matches!(
        schemes.save_scheme(404, "ghost", "").await,
        Err(IpamError::NotFound { .. })
    ));

    subnets
        .add_range(IpRange::new(
            lan.id,
            Ipv4Addr::new(192, 168, 1, 200),
            Ipv4Addr::new(192, 168, 1, 220),
            "dhcp",
        ))
        .await
        .unwrap();
    let scheme = schemes.save_scheme(lan.id, "upper", "").await.unwrap();
    assert!(matches!(
        schemes.save_scheme(lan.id, "upper", "").await,
        Err(IpamError::Conflict { .. })
    ));

    // The entry falls outside a /26 at .0, so nothing may change there
    let small = create_test_subnet(store.as_ref(), [10, 9, 9, 0], 26).await;
    subnets
        .add_range(IpRange::new(
            small.id,
            Ipv4Addr::new(10, 9, 9, 10),
            Ipv4Addr::new(10, 9, 9, 20),
            "static",
        ))
        .await
        .unwrap();
    assert!(matches!(
        schemes.apply_scheme(small.id, scheme.id, true).await,
        Err(IpamError::Validation { .. })
    ));
    assert_eq!(store.list_ranges(small.id).await.unwrap().len(), 1);

    schemes.delete_scheme(scheme.id).await.unwrap();
    assert!(schemes.list_schemes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_template_flow() {
    let store = Arc::new(MemoryStore::new("test"));
    let templates = SubnetTemplateEngine::new(store.clone(), true);
    let plain = SubnetTemplateEngine::new(store.clone(), false);
    let guest = TemplateRef::BuiltIn("guest".to_string());

    let prefill = templates.apply_template(&guest).await.unwrap();
    assert_eq!(prefill.gateway, Some(Ipv4Addr::new(192, 168, 30, 1)));
    assert_eq!(plain.apply_template(&guest).await.unwrap().gateway, None);

    assert!(matches!(
        templates
            .apply_template(&TemplateRef::BuiltIn("nope".to_string()))
            .await,
        Err(IpamError::NotFound { .. })
    ));

    // Round-trip a subnet into a user template
    let subnets = SubnetService::new(store.clone());
    let mut draft = Subnet::new(SITE, Ipv4Addr::new(10, 20, 0, 0), 24);
    draft.role = "cameras".to_string();
    let created = subnets.create_subnet(draft, true).await.unwrap().subnet;

    let saved = templates
        .save_subnet_as_template(created.id, "Cameras", Some("PoE cameras"))
        .await
        .unwrap();
    let prefill = templates
        .apply_template(&TemplateRef::User(saved.id))
        .await
        .unwrap();
    assert_eq!(prefill.prefix, created.prefix);
    assert_eq!(prefill.gateway, Some(Ipv4Addr::new(10, 20, 0, 1)));
    assert_eq!(prefill.role, "cameras");
    assert_eq!(prefill.description, "PoE cameras");

    assert!(matches!(
        templates
            .save_subnet_as_template(created.id, "Home LAN", None)
            .await,
        Err(IpamError::Conflict { .. })
    ));

    let listed = templates.list_templates().await.unwrap();
    assert!(listed
        .iter()
        .any(|entry| entry.reference == TemplateRef::User(saved.id)));

    templates.delete_template(saved.id).await.unwrap();
    assert!(matches!(
        templates.get_template(&TemplateRef::User(saved.id)).await,
        Err(IpamError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_subnet_lifecycle() {
    let store = Arc::new(MemoryStore::new("test"));
    let service = SubnetService::new(store.clone());
    let engine = AllocationEngine::new(store.clone());

    let lan = service
        .create_subnet(Subnet::new(SITE, Ipv4Addr::new(10, 0, 0, 0), 24), true)
        .await
        .unwrap();
    assert_eq!(lan.subnet.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
    assert!(lan.overlaps.is_empty());

    let half = service
        .create_subnet(Subnet::new(SITE, Ipv4Addr::new(10, 0, 0, 128), 25), false)
        .await
        .unwrap();
    assert_eq!(half.subnet.gateway, None);
    assert_eq!(half.overlaps.len(), 1);
    assert_eq!(service.overlaps(SITE).await.unwrap().len(), 1);

    // Misaligned prefixes are rejected
    assert!(matches!(
        service
            .create_subnet(Subnet::new(SITE, Ipv4Addr::new(10, 0, 0, 5), 24), true)
            .await,
        Err(IpamError::Validation { .. })
    ));

    let lan = lan.subnet;
    service
        .add_range(IpRange::new(
            lan.id,
            Ipv4Addr::new(10, 0, 0, 100),
            Ipv4Addr::new(10, 0, 0, 150),
            " dhcp ",
        ))
        .await
        .unwrap();
    engine
        .assign(&BindingRequest::new(lan.id, "10.0.0.2"))
        .await
        .unwrap();

    let page = service.cells(lan.id, 0, 256).await.unwrap();
    assert_eq!(page.page_count, 1);
    assert_eq!(page.cells[1].status, CellStatus::Gateway);
    assert_eq!(page.cells[2].status, CellStatus::Assigned);
    assert_eq!(page.cells[120].status, CellStatus::Range("dhcp".to_string()));

    let usage = service.utilization(lan.id).await.unwrap();
    assert_eq!((usage.used, usage.total), (2, 254));
    assert_eq!(
        service.next_available(lan.id).await.unwrap(),
        Some(Ipv4Addr::new(10, 0, 0, 3))
    );

    // Shrinking below the record is refused
    let mut shrunk = lan.clone();
    shrunk.mask = 31;
    shrunk.gateway = None;
    assert!(matches!(
        service.update_subnet(&shrunk).await,
        Err(IpamError::Validation { .. })
    ));

    service.delete_subnet(lan.id).await.unwrap();
    assert!(store.get_subnet(lan.id).await.unwrap().is_none());
    assert!(store.list_addresses(lan.id).await.unwrap().is_empty());
    assert!(store.list_ranges(lan.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_large_block_is_paged() {
    let store = Arc::new(MemoryStore::new("test"));
    let service = SubnetService::new(store.clone());
    let lab = create_test_subnet(store.as_ref(), [10, 10, 0, 0], 16).await;

    let first = service.cells(lab.id, 0, 256).await.unwrap();
    assert_eq!(first.page_count, 256);
    assert_eq!(first.cells.len(), 256);
    assert_eq!(first.cells[0].status, CellStatus::Network);

    let last = service.cells(lab.id, 255, 256).await.unwrap();
    assert_eq!(last.cells[255].address, Ipv4Addr::new(10, 10, 255, 255));
    assert_eq!(last.cells[255].status, CellStatus::Broadcast);

    assert!(service.cells(lab.id, 256, 256).await.unwrap().cells.is_empty());
}

#[tokio::test]
async fn test_range_overlaps_are_reported() {
    let store = Arc::new(MemoryStore::new("test"));
    let service = SubnetService::new(store.clone());
    let lan = create_test_subnet(store.as_ref(), [10, 0, 0, 0], 24).await;

    let a = service
        .add_range(IpRange::new(
            lan.id,
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 50),
            "static",
        ))
        .await
        .unwrap();
    let b = service
        .add_range(IpRange::new(
            lan.id,
            Ipv4Addr::new(10, 0, 0, 40),
            Ipv4Addr::new(10, 0, 0, 90),
            "dhcp",
        ))
        .await
        .unwrap();

    let overlaps = service.range_overlaps(lan.id).await.unwrap();
    assert_eq!(overlaps.len(), 1);
    assert_eq!((overlaps[0].first, overlaps[0].second), (a.id, b.id));

    assert!(matches!(
        service
            .add_range(IpRange::new(
                lan.id,
                Ipv4Addr::new(10, 0, 1, 1),
                Ipv4Addr::new(10, 0, 1, 9),
                "outside",
            ))
            .await,
        Err(IpamError::Validation { .. })
    ));
}
