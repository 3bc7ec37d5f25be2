//! Persistence abstraction
//!
//! Every call is an independent operation; stores offer no transaction
//! spanning more than one call.

use async_trait::async_trait;

use labipam_types::{
    Device, DeviceId, IpAddressRecord, IpRange, IpamError, IpamResult, RangeId, RangeScheme,
    RecordId, SchemeId, SiteId, StoreBackend, Subnet, SubnetId, SubnetTemplate, TemplateId,
};

/// CRUD access to inventory records.
///
/// `get_*` return `Ok(None)` for unknown ids, `update_*`/`delete_*` fail with
/// `NotFound`. `create_*` ignore the id of the argument and return the stored
/// value with its assigned id.
#[async_trait]
pub trait IpamStore: Send + Sync {
    fn backend(&self) -> StoreBackend;

    async fn list_subnets(&self, site: SiteId) -> IpamResult<Vec<Subnet>>;
    /// Subnets of every site
    async fn list_all_subnets(&self) -> IpamResult<Vec<Subnet>>;
    async fn get_subnet(&self, id: SubnetId) -> IpamResult<Option<Subnet>>;
    async fn create_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet>;
    async fn update_subnet(&self, subnet: &Subnet) -> IpamResult<Subnet>;
    async fn delete_subnet(&self, id: SubnetId) -> IpamResult<()>;

    async fn list_addresses(&self, subnet: SubnetId) -> IpamResult<Vec<IpAddressRecord>>;
    async fn get_address(&self, id: RecordId) -> IpamResult<Option<IpAddressRecord>>;
    /// Fails with `Conflict` if the subnet already holds a record for the address.
    async fn create_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord>;
    async fn update_address(&self, record: &IpAddressRecord) -> IpamResult<IpAddressRecord>;
    async fn delete_address(&self, id: RecordId) -> IpamResult<()>;

    async fn list_devices(&self, site: SiteId) -> IpamResult<Vec<Device>>;
    async fn get_device(&self, id: DeviceId) -> IpamResult<Option<Device>>;
    async fn create_device(&self, device: &Device) -> IpamResult<Device>;
    async fn update_device(&self, device: &Device) -> IpamResult<Device>;
    async fn delete_device(&self, id: DeviceId) -> IpamResult<()>;

    async fn list_ranges(&self, subnet: SubnetId) -> IpamResult<Vec<IpRange>>;
    async fn get_range(&self, id: RangeId) -> IpamResult<Option<IpRange>>;
    async fn create_range(&self, range: &IpRange) -> IpamResult<IpRange>;
    async fn update_range(&self, range: &IpRange) -> IpamResult<IpRange>;
    async fn delete_range(&self, id: RangeId) -> IpamResult<()>;

    async fn list_schemes(&self) -> IpamResult<Vec<RangeScheme>>;
    async fn get_scheme(&self, id: SchemeId) -> IpamResult<Option<RangeScheme>>;
    /// Fails with `Conflict` on a duplicate name.
    async fn create_scheme(&self, scheme: &RangeScheme) -> IpamResult<RangeScheme>;
    async fn delete_scheme(&self, id: SchemeId) -> IpamResult<()>;

    async fn list_templates(&self) -> IpamResult<Vec<SubnetTemplate>>;
    async fn get_template(&self, id: TemplateId) -> IpamResult<Option<SubnetTemplate>>;
    /// Fails with `Conflict` on a duplicate name.
    async fn create_template(&self, template: &SubnetTemplate) -> IpamResult<SubnetTemplate>;
    async fn delete_template(&self, id: TemplateId) -> IpamResult<()>;
}

pub(crate) async fn require_subnet(store: &dyn IpamStore, id: SubnetId) -> IpamResult<Subnet> {
    store
        .get_subnet(id)
        .await?
        .ok_or_else(|| IpamError::not_found("subnet", id))
}

pub(crate) async fn require_device(store: &dyn IpamStore, id: DeviceId) -> IpamResult<Device> {
    store
        .get_device(id)
        .await?
        .ok_or_else(|| IpamError::not_found("device", id))
}

pub(crate) async fn require_address(
    store: &dyn IpamStore,
    id: RecordId,
) -> IpamResult<IpAddressRecord> {
    store
        .get_address(id)
        .await?
        .ok_or_else(|| IpamError::not_found("address", id))
}
