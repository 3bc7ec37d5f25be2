//! Per-address status classification
//!
//! Lookup maps are built once per classifier; each cell is then resolved in
//! constant time apart from the (small, pre-filtered) range scan.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use serde::{Serialize, Serializer};

use labipam_types::{Device, DeviceId, IpAddressRecord, IpRange, RangeId, RecordId, Subnet};

use crate::arithmetic::{
    int_to_ip, ip_to_int, network_range, subnet_block, usable_hosts, SubnetBlock,
};

/// Status of one address. Variants are listed in precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellStatus {
    Network,
    Broadcast,
    Gateway,
    Assigned,
    /// Inside a range; carries the range's role.
    Range(String),
    Available,
}

impl CellStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CellStatus::Network => "network",
            CellStatus::Broadcast => "broadcast",
            CellStatus::Gateway => "gateway",
            CellStatus::Assigned => "assigned",
            CellStatus::Range(role) => role,
            CellStatus::Available => "available",
        }
    }

    /// Counted towards utilization.
    pub fn is_used(&self) -> bool {
        matches!(self, CellStatus::Gateway | CellStatus::Assigned)
    }
}

impl std::fmt::Display for CellStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CellStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub address: Ipv4Addr,
    pub status: CellStatus,
    #[serde(rename = "record", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(rename = "device", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Utilization {
    pub used: u64,
    pub total: u64,
    pub percent: f64,
}

impl Utilization {
    pub fn new(used: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Self {
            used,
            total,
            percent,
        }
    }
}

/// Classifies the addresses of one subnet.
pub struct CellClassifier<'a> {
    block: SubnetBlock,
    mask: u8,
    network: u32,
    broadcast: u32,
    gateway: Option<u32>,
    records: HashMap<u32, &'a IpAddressRecord>,
    devices: HashMap<u32, &'a Device>,
    ranges: Vec<(u32, u32, &'a IpRange)>,
}

impl<'a> CellClassifier<'a> {
    /// `records` and `ranges` are the subnet's children; `devices` are the
    /// devices of the subnet's site.
    pub fn new(
        subnet: &Subnet,
        records: &'a [IpAddressRecord],
        ranges: &'a [IpRange],
        devices: &'a [Device],
    ) -> Self {
        let (network, broadcast) = network_range(subnet.prefix, subnet.mask);

        let mut record_map = HashMap::with_capacity(records.len());
        for record in records {
            record_map.entry(ip_to_int(record.address)).or_insert(record);
        }

        let mut device_map = HashMap::new();
        for device in devices {
            if let Some(address) = device.ip_address {
                device_map.entry(ip_to_int(address)).or_insert(device);
            }
        }

        let ranges = ranges
            .iter()
            .map(|range| (ip_to_int(range.start_addr), ip_to_int(range.end_addr), range))
            .collect();

        Self {
            block: subnet_block(subnet.prefix, subnet.mask),
            mask: subnet.mask,
            network,
            broadcast,
            gateway: subnet.gateway.map(ip_to_int),
            records: record_map,
            devices: device_map,
            ranges,
        }
    }

    pub fn block(&self) -> &SubnetBlock {
        &self.block
    }

    fn status_without_ranges(&self, value: u32) -> Option<CellStatus> {
        if self.mask < 31 {
            if value == self.network {
                return Some(CellStatus::Network);
            }
            if value == self.broadcast {
                return Some(CellStatus::Broadcast);
            }
        }
        if self.gateway == Some(value) {
            return Some(CellStatus::Gateway);
        }
        if self.records.contains_key(&value) || self.devices.contains_key(&value) {
            return Some(CellStatus::Assigned);
        }
        None
    }

    fn classify_with(&self, value: u32, ranges: &[(u32, u32, &IpRange)]) -> CellStatus {
        if let Some(status) = self.status_without_ranges(value) {
            return status;
        }
        ranges
            .iter()
            .find(|(start, end, _)| *start <= value && value <= *end)
            .map(|(_, _, range)| CellStatus::Range(range.role.clone()))
            .unwrap_or(CellStatus::Available)
    }

    pub fn classify(&self, address: Ipv4Addr) -> CellStatus {
        self.classify_with(ip_to_int(address), &self.ranges)
    }

    fn cell_with(&self, value: u32, ranges: &[(u32, u32, &IpRange)]) -> Cell {
        let status = self.classify_with(value, ranges);
        let record = self.records.get(&value);
        let device = self.devices.get(&value);

        let label = record
            .and_then(|record| record.label())
            .or_else(|| device.map(|device| device.name.as_str()))
            .map(str::to_string);

        Cell {
            address: int_to_ip(value),
            status,
            record_id: record.map(|record| record.id),
            device_id: device.map(|device| device.id),
            label,
        }
    }

    pub fn cell(&self, address: Ipv4Addr) -> Cell {
        self.cell_with(ip_to_int(address), &self.ranges)
    }

    pub fn page_count(&self, page_size: u32) -> u32 {
        self.block.page_count(page_size)
    }

    /// Cells of page `page` (0-based). Pages past the end are empty.
    pub fn page(&self, page: u32, page_size: u32) -> Vec<Cell> {
        let offsets = self.block.page_offsets(page, page_size);
        if offsets.is_empty() {
            return Vec::new();
        }

        let base = self.block.start_int();
        let first = base.saturating_add(offsets.start);
        let last = base.saturating_add(offsets.end - 1);

        let window_ranges: Vec<(u32, u32, &IpRange)> = self
            .ranges
            .iter()
            .filter(|(start, end, _)| *start <= last && first <= *end)
            .copied()
            .collect();

        offsets
            .filter_map(|offset| self.block.int_at(offset))
            .map(|value| self.cell_with(value, &window_ranges))
            .collect()
    }

    /// Gateway and assigned addresses across the whole block.
    pub fn utilization(&self) -> Utilization {
        let mut candidates: HashSet<u32> = self
            .records
            .keys()
            .chain(self.devices.keys())
            .copied()
            .collect();
        if let Some(gateway) = self.gateway {
            candidates.insert(gateway);
        }

        let used = candidates
            .into_iter()
            .filter(|value| self.network <= *value && *value <= self.broadcast)
            .filter(|value| {
                self.status_without_ranges(*value)
                    .is_some_and(|status| status.is_used())
            })
            .count() as u64;

        Utilization::new(used, usable_hosts(self.mask))
    }

    /// First available address in block order.
    pub fn next_available(&self) -> Option<Ipv4Addr> {
        (0..self.block.block_size)
            .filter_map(|offset| self.block.int_at(offset))
            .find(|value| self.classify_with(*value, &self.ranges) == CellStatus::Available)
            .map(int_to_ip)
    }
}

/// A pair of ranges in one subnet that share at least one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeOverlap {
    pub first: RangeId,
    pub second: RangeId,
}

/// Intra-subnet range overlaps. Reported only; ranges are allowed to overlap.
pub fn range_overlaps(ranges: &[IpRange]) -> Vec<RangeOverlap> {
    let mut overlaps = Vec::new();
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.start_addr <= b.end_addr && b.start_addr <= a.end_addr {
                overlaps.push(RangeOverlap {
                    first: a.id,
                    second: b.id,
                });
            }
        }
    }
    overlaps
}
