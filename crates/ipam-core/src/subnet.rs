//! Subnet and range lifecycle, and the derived views built from a subnet

use std::net::Ipv4Addr;
use std::sync::Arc;

use serde::Serialize;

use labipam_types::{
    Device, IpAddressRecord, IpRange, IpamError, IpamResult, RangeId, SiteId, Subnet, SubnetId,
};

use crate::arithmetic::suggest_gateway;
use crate::classifier::{range_overlaps, Cell, CellClassifier, RangeOverlap, Utilization};
use crate::overlap::{detect_overlaps, overlaps_with, OverlapWarning};
use crate::store::{require_subnet, IpamStore};

/// A subnet together with everything needed to classify its addresses.
#[derive(Debug, Clone)]
pub struct SubnetSnapshot {
    pub subnet: Subnet,
    pub records: Vec<IpAddressRecord>,
    pub ranges: Vec<IpRange>,
    pub devices: Vec<Device>,
}

impl SubnetSnapshot {
    pub fn classifier(&self) -> CellClassifier<'_> {
        CellClassifier::new(&self.subnet, &self.records, &self.ranges, &self.devices)
    }
}

/// A written subnet and the existing subnets it overlaps.
#[derive(Debug, Clone, Serialize)]
pub struct SubnetChange {
    pub subnet: Subnet,
    pub overlaps: Vec<OverlapWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CellPage {
    pub subnet: SubnetId,
    pub page: u32,
    #[serde(rename = "page-count")]
    pub page_count: u32,
    pub cells: Vec<Cell>,
}

pub struct SubnetService {
    store: Arc<dyn IpamStore>,
}

impl SubnetService {
    pub fn new(store: Arc<dyn IpamStore>) -> Self {
        Self { store }
    }

    pub async fn get_subnet(&self, id: SubnetId) -> IpamResult<Subnet> {
        require_subnet(self.store.as_ref(), id).await
    }

    pub async fn list_subnets(&self, site: SiteId) -> IpamResult<Vec<Subnet>> {
        self.store.list_subnets(site).await
    }

    pub async fn snapshot(&self, id: SubnetId) -> IpamResult<SubnetSnapshot> {
        let subnet = require_subnet(self.store.as_ref(), id).await?;
        let records = self.store.list_addresses(id).await?;
        let ranges = self.store.list_ranges(id).await?;
        let devices = self.store.list_devices(subnet.site_id).await?;

        log::debug!(
            "Loaded subnet {} with {} records, {} ranges, {} site devices",
            subnet,
            records.len(),
            ranges.len(),
            devices.len()
        );

        Ok(SubnetSnapshot {
            subnet,
            records,
            ranges,
            devices,
        })
    }

    /// Validate and persist a new subnet. Overlaps are reported, not refused.
    pub async fn create_subnet(
        &self,
        mut draft: Subnet,
        smart_gateway: bool,
    ) -> IpamResult<SubnetChange> {
        if draft.gateway.is_none() && smart_gateway {
            draft.gateway = suggest_gateway(draft.prefix, draft.mask);
        }
        draft.validate()?;

        let existing = self.store.list_subnets(draft.site_id).await?;
        let subnet = self.store.create_subnet(&draft).await?;
        let overlaps = overlaps_with(&subnet, &existing);

        for warning in &overlaps {
            log::warn!(
                "Subnet {} overlaps existing subnet {}",
                warning.cidr_a,
                warning.cidr_b
            );
        }
        log::info!("Created subnet {} (id {})", subnet, subnet.id);

        Ok(SubnetChange { subnet, overlaps })
    }

    /// Update a subnet. Its records and ranges must still fit the block.
    pub async fn update_subnet(&self, subnet: &Subnet) -> IpamResult<SubnetChange> {
        subnet.validate()?;
        let current = require_subnet(self.store.as_ref(), subnet.id).await?;

        if current.prefix != subnet.prefix || current.mask != subnet.mask {
            let net = subnet.cidr()?;
            for record in self.store.list_addresses(subnet.id).await? {
                if !net.contains(&record.address) {
                    return Err(IpamError::validation(
                        "prefix",
                        format!("record {} would fall outside {}", record.address, net),
                    ));
                }
            }
            for range in self.store.list_ranges(subnet.id).await? {
                range.validate_within(subnet)?;
            }
        }

        let existing = self.store.list_subnets(subnet.site_id).await?;
        let subnet = self.store.update_subnet(subnet).await?;
        let overlaps = overlaps_with(&subnet, &existing);

        log::info!("Updated subnet {} (id {})", subnet, subnet.id);
        Ok(SubnetChange { subnet, overlaps })
    }

    /// Delete a subnet with its ranges and address records.
    pub async fn delete_subnet(&self, id: SubnetId) -> IpamResult<()> {
        let subnet = require_subnet(self.store.as_ref(), id).await?;

        for range in self.store.list_ranges(id).await? {
            self.store.delete_range(range.id).await?;
        }
        for record in self.store.list_addresses(id).await? {
            self.store.delete_address(record.id).await?;
        }
        self.store.delete_subnet(id).await?;

        log::info!("Deleted subnet {} (id {})", subnet, id);
        Ok(())
    }

    pub async fn overlaps(&self, site: SiteId) -> IpamResult<Vec<OverlapWarning>> {
        let subnets = self.store.list_subnets(site).await?;
        Ok(detect_overlaps(&subnets))
    }

    pub async fn list_ranges(&self, subnet_id: SubnetId) -> IpamResult<Vec<IpRange>> {
        require_subnet(self.store.as_ref(), subnet_id).await?;
        self.store.list_ranges(subnet_id).await
    }

    pub async fn add_range(&self, mut range: IpRange) -> IpamResult<IpRange> {
        let subnet = require_subnet(self.store.as_ref(), range.subnet_id).await?;
        range.role = range.role.trim().to_string();
        range.validate_within(&subnet)?;

        let range = self.store.create_range(&range).await?;
        log::info!(
            "Added {} range {}-{} to subnet {}",
            range.role,
            range.start_addr,
            range.end_addr,
            subnet
        );
        Ok(range)
    }

    pub async fn delete_range(&self, id: RangeId) -> IpamResult<()> {
        self.store.delete_range(id).await?;
        log::info!("Deleted range {}", id);
        Ok(())
    }

    pub async fn range_overlaps(&self, subnet_id: SubnetId) -> IpamResult<Vec<RangeOverlap>> {
        Ok(range_overlaps(&self.list_ranges(subnet_id).await?))
    }

    pub async fn cells(&self, subnet_id: SubnetId, page: u32, page_size: u32) -> IpamResult<CellPage> {
        let snapshot = self.snapshot(subnet_id).await?;
        let classifier = snapshot.classifier();
        Ok(CellPage {
            subnet: subnet_id,
            page,
            page_count: classifier.page_count(page_size),
            cells: classifier.page(page, page_size),
        })
    }

    pub async fn utilization(&self, subnet_id: SubnetId) -> IpamResult<Utilization> {
        let snapshot = self.snapshot(subnet_id).await?;
        Ok(snapshot.classifier().utilization())
    }

    pub async fn next_available(&self, subnet_id: SubnetId) -> IpamResult<Option<Ipv4Addr>> {
        let snapshot = self.snapshot(subnet_id).await?;
        Ok(snapshot.classifier().next_available())
    }
}
