//! Address-to-device bindings
//!
//! A binding lives in two places: the address record and the device's own
//! address field. Stores cannot write both atomically, so the record is
//! written first and the device side is reconciled afterwards, one call at a
//! time. A failed follow-up leaves the record in place and is reported as a
//! partial failure naming the step; re-running the assignment finishes it.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use labipam_types::{
    is_reserved_edge, parse_ipv4, AddressStatus, Device, DeviceId, FollowUpStep, IpAddressRecord,
    IpamError, IpamResult, RecordId, SiteId, Subnet, SubnetId,
};

use crate::store::{require_address, require_device, require_subnet, IpamStore};

/// Input of an assign or edit. Unset fields keep the record's current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindingRequest {
    pub address: String,
    #[serde(rename = "subnet", default)]
    pub subnet_id: SubnetId,
    #[serde(rename = "device")]
    pub device_id: Option<DeviceId>,
    pub status: Option<AddressStatus>,
    #[serde(rename = "dns-name")]
    pub dns_name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "assigned-to")]
    pub assigned_to: Option<String>,
}

impl BindingRequest {
    pub fn new(subnet_id: SubnetId, address: &str) -> Self {
        Self {
            address: address.to_string(),
            subnet_id,
            ..Default::default()
        }
    }

    pub fn for_device(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingOutcome {
    pub record: IpAddressRecord,
    /// Device whose address field was cleared because it held the address.
    #[serde(rename = "vacated-device")]
    pub vacated_device: Option<DeviceId>,
    /// Records deleted at the target device's previous address.
    #[serde(rename = "removed-records")]
    pub removed_records: Vec<RecordId>,
    /// Target device after its address field was pointed at the binding.
    pub device: Option<Device>,
}

/// A device address with no record behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceOnlyBinding {
    pub device: DeviceId,
    pub name: String,
    pub address: Ipv4Addr,
    /// Most specific subnet of the site covering the address.
    pub subnet: Option<SubnetId>,
}

fn partial_failure(step: FollowUpStep, record: &IpAddressRecord, source: IpamError) -> IpamError {
    log::warn!(
        "Binding of {} (record {}) saved, but failed to {}: {}",
        record.address,
        record.id,
        step,
        source
    );
    IpamError::PartialFailure {
        step,
        address: record.address,
        record_id: record.id,
        source: Box::new(source),
    }
}

/// Most specific subnet containing `address`.
fn covering_subnet(subnets: &[Subnet], address: Ipv4Addr) -> Option<&Subnet> {
    subnets
        .iter()
        .filter(|subnet| subnet.contains(address))
        .max_by_key(|subnet| subnet.mask)
}

pub struct AllocationEngine {
    store: Arc<dyn IpamStore>,
}

impl AllocationEngine {
    pub fn new(store: Arc<dyn IpamStore>) -> Self {
        Self { store }
    }

    /// Create or edit the record for an address and bind it to a device.
    ///
    /// Steps run strictly in order:
    /// 1. find the device currently holding the address,
    /// 2. capture the target device's previous address,
    /// 3. write the record (nothing else has been touched if this fails),
    /// 4. clear the previous holder's address field unless it is the target,
    /// 5. delete records left at the target device's previous address,
    /// 6. point the target device at the address.
    ///
    /// Validation and lookups fail before any write. Failures in steps 4-6 are
    /// returned as [`IpamError::PartialFailure`] and do not undo step 3.
    pub async fn assign(&self, request: &BindingRequest) -> IpamResult<BindingOutcome> {
        let store = self.store.as_ref();

        let address = parse_ipv4(&request.address)?;
        let subnet = require_subnet(store, request.subnet_id).await?;
        let net = subnet.cidr()?;
        if !net.contains(&address) {
            return Err(IpamError::validation(
                "address",
                format!("{address} is not within subnet {net}"),
            ));
        }
        if is_reserved_edge(&net, address) {
            return Err(IpamError::validation(
                "address",
                format!("{address} is the network or broadcast address of {net}"),
            ));
        }

        // 1. Device currently holding the address
        let devices = store.list_devices(subnet.site_id).await?;
        let device_on_this_ip = devices
            .iter()
            .find(|device| device.ip_address == Some(address))
            .cloned();

        // 2. Target device and the address it is moving away from
        let target = match request.device_id {
            Some(id) => Some(require_device(store, id).await?),
            None => None,
        };
        let target_id = target.as_ref().map(|device| device.id);
        let new_device_old_ip = target
            .as_ref()
            .and_then(|device| device.ip_address)
            .filter(|old| *old != address);

        // 3. Primary write
        let existing = store
            .list_addresses(subnet.id)
            .await?
            .into_iter()
            .find(|record| record.address == address);

        let record = match existing {
            Some(mut record) => {
                self.apply_fields(&mut record, request, target.as_ref());
                record.mask = subnet.mask;
                store.update_address(&record).await?
            }
            None => {
                let mut record = IpAddressRecord::new(subnet.id, address, subnet.mask);
                self.apply_fields(&mut record, request, target.as_ref());
                store.create_address(&record).await?
            }
        };
        log::info!(
            "Bound {} in subnet {} as record {}{}",
            address,
            subnet,
            record.id,
            target_id
                .map(|id| format!(" for device {id}"))
                .unwrap_or_default()
        );

        let mut outcome = BindingOutcome {
            record,
            vacated_device: None,
            removed_records: Vec::new(),
            device: None,
        };

        // 4. Vacate the previous holder, also when no target is given
        if let Some(mut holder) = device_on_this_ip {
            if Some(holder.id) != target_id {
                let step = FollowUpStep::VacatePreviousHolder {
                    device_id: holder.id,
                };
                holder.ip_address = None;
                store
                    .update_device(&holder)
                    .await
                    .map_err(|e| partial_failure(step, &outcome.record, e))?;
                log::info!("Cleared {} from device {}", address, holder.id);
                outcome.vacated_device = Some(holder.id);
            }
        }

        // 5. Remove records orphaned at the target's previous address
        if let (Some(old), Some(target)) = (new_device_old_ip, target.as_ref()) {
            let reused = devices
                .iter()
                .any(|device| device.id != target.id && device.ip_address == Some(old));
            if reused {
                log::debug!("Keeping records for {old}, still held by another device");
            } else {
                let step = FollowUpStep::RemoveOrphanedRecord { address: old };
                outcome.removed_records = self
                    .remove_records_for(old)
                    .await
                    .map_err(|e| partial_failure(step, &outcome.record, e))?;
            }
        }

        // 6. Point the target device at the address
        if let Some(mut device) = target {
            if device.ip_address != Some(address) {
                let step = FollowUpStep::PointDeviceAtAddress {
                    device_id: device.id,
                };
                device.ip_address = Some(address);
                device = store
                    .update_device(&device)
                    .await
                    .map_err(|e| partial_failure(step, &outcome.record, e))?;
                log::info!("Device {} now holds {}", device.id, address);
            }
            outcome.device = Some(device);
        }

        Ok(outcome)
    }

    fn apply_fields(
        &self,
        record: &mut IpAddressRecord,
        request: &BindingRequest,
        target: Option<&Device>,
    ) {
        if let Some(status) = request.status {
            record.status = status;
        }
        if let Some(dns_name) = &request.dns_name {
            record.dns_name = dns_name.clone();
        }
        if let Some(description) = &request.description {
            record.description = description.clone();
        }
        match (&request.assigned_to, target) {
            (Some(assigned_to), _) => record.assigned_to = assigned_to.clone(),
            (None, Some(device)) => record.assigned_to = device.name.clone(),
            (None, None) => {}
        }
    }

    /// Delete every record for `address`, whatever site its subnet belongs to.
    async fn remove_records_for(&self, address: Ipv4Addr) -> IpamResult<Vec<RecordId>> {
        let mut removed = Vec::new();
        for subnet in self.store.list_all_subnets().await? {
            for record in self.store.list_addresses(subnet.id).await? {
                if record.address == address {
                    self.store.delete_address(record.id).await?;
                    log::info!(
                        "Removed orphaned record {} for {} in subnet {}",
                        record.id,
                        address,
                        subnet
                    );
                    removed.push(record.id);
                }
            }
        }
        Ok(removed)
    }

    /// Clear a device's address field. Records are left untouched.
    pub async fn unbind(&self, device_id: DeviceId) -> IpamResult<Device> {
        let mut device = require_device(self.store.as_ref(), device_id).await?;
        let Some(address) = device.ip_address.take() else {
            return Ok(device);
        };

        let device = self.store.update_device(&device).await?;
        log::info!("Unbound {} from device {}", address, device_id);
        Ok(device)
    }

    /// Create a record mirroring a device-only binding.
    pub async fn promote(&self, device_id: DeviceId) -> IpamResult<IpAddressRecord> {
        let store = self.store.as_ref();
        let device = require_device(store, device_id).await?;
        let address = device.ip_address.ok_or_else(|| {
            IpamError::validation("device", format!("device {device_id} has no address to promote"))
        })?;

        let subnets = store.list_subnets(device.site_id).await?;
        let subnet = covering_subnet(&subnets, address).ok_or_else(|| {
            IpamError::validation(
                "address",
                format!("no subnet of site {} covers {}", device.site_id, address),
            )
        })?;

        if store
            .list_addresses(subnet.id)
            .await?
            .iter()
            .any(|record| record.address == address)
        {
            return Err(IpamError::conflict(
                "address",
                format!("{address} already has a record in subnet {subnet}"),
            ));
        }

        let mut record = IpAddressRecord::new(subnet.id, address, subnet.mask);
        record.assigned_to = device.name.clone();
        record.dns_name = device.hostname.clone().unwrap_or_default();

        let record = store.create_address(&record).await?;
        log::info!(
            "Promoted {} of device {} to record {}",
            address,
            device_id,
            record.id
        );
        Ok(record)
    }

    /// Delete a record. Device address fields are left as they are, so a
    /// device pointing at the address shows up again as a device-only binding.
    pub async fn release(&self, record_id: RecordId) -> IpamResult<IpAddressRecord> {
        let record = require_address(self.store.as_ref(), record_id).await?;
        self.store.delete_address(record_id).await?;
        log::info!("Deleted record {} for {}", record_id, record.address);
        Ok(record)
    }

    /// Device addresses in a site that have no record in any of its subnets.
    pub async fn device_only_bindings(&self, site: SiteId) -> IpamResult<Vec<DeviceOnlyBinding>> {
        let subnets = self.store.list_subnets(site).await?;
        let mut recorded = HashSet::new();
        for subnet in &subnets {
            for record in self.store.list_addresses(subnet.id).await? {
                recorded.insert(record.address);
            }
        }

        let bindings = self
            .store
            .list_devices(site)
            .await?
            .into_iter()
            .filter_map(|device| {
                let address = device.ip_address?;
                if recorded.contains(&address) {
                    return None;
                }
                Some(DeviceOnlyBinding {
                    device: device.id,
                    name: device.name,
                    address,
                    subnet: covering_subnet(&subnets, address).map(|subnet| subnet.id),
                })
            })
            .collect();

        Ok(bindings)
    }
}
