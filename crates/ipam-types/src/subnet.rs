use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::address::{cidr, is_reserved_edge};
use crate::error::{IpamError, IpamResult};

pub type SiteId = u64;
pub type SubnetId = u64;
pub type RangeId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubnetStatus {
    #[default]
    Active,
    Reserved,
    Deprecated,
}

impl std::fmt::Display for SubnetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnetStatus::Active => write!(f, "active"),
            SubnetStatus::Reserved => write!(f, "reserved"),
            SubnetStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subnet {
    #[serde(default)]
    pub id: SubnetId,
    #[serde(rename = "site")]
    pub site_id: SiteId,
    pub prefix: Ipv4Addr,
    pub mask: u8,
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "vlan")]
    pub vlan_id: Option<u64>,
    #[serde(default)]
    pub status: SubnetStatus,
}

impl Subnet {
    pub fn new(site_id: SiteId, prefix: Ipv4Addr, mask: u8) -> Self {
        Self {
            id: 0,
            site_id,
            prefix,
            mask,
            gateway: None,
            role: String::new(),
            description: String::new(),
            vlan_id: None,
            status: SubnetStatus::Active,
        }
    }

    pub fn cidr(&self) -> IpamResult<Ipv4Net> {
        cidr(self.prefix, self.mask)
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.cidr().map(|net| net.contains(&address)).unwrap_or(false)
    }

    pub fn validate(&self) -> IpamResult<()> {
        let net = self.cidr()?;

        if net.network() != self.prefix {
            return Err(IpamError::validation(
                "prefix",
                format!(
                    "{} is not the network address of /{} (expected {})",
                    self.prefix,
                    self.mask,
                    net.network()
                ),
            ));
        }

        if let Some(gateway) = self.gateway {
            if !net.contains(&gateway) {
                return Err(IpamError::validation(
                    "gateway",
                    format!("gateway {gateway} is not within subnet {net}"),
                ));
            }
            if is_reserved_edge(&net, gateway) {
                return Err(IpamError::validation(
                    "gateway",
                    format!("gateway {gateway} is the network or broadcast address of {net}"),
                ));
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.prefix, self.mask)
    }
}

/// A contiguous sub-block of a subnet tagged with an allocation role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpRange {
    #[serde(default)]
    pub id: RangeId,
    #[serde(rename = "subnet")]
    pub subnet_id: SubnetId,
    #[serde(rename = "start")]
    pub start_addr: Ipv4Addr,
    #[serde(rename = "end")]
    pub end_addr: Ipv4Addr,
    pub role: String,
    #[serde(default)]
    pub description: String,
}

impl IpRange {
    pub fn new(subnet_id: SubnetId, start_addr: Ipv4Addr, end_addr: Ipv4Addr, role: &str) -> Self {
        Self {
            id: 0,
            subnet_id,
            start_addr,
            end_addr,
            role: role.to_string(),
            description: String::new(),
        }
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.start_addr <= address && address <= self.end_addr
    }

    pub fn validate_within(&self, subnet: &Subnet) -> IpamResult<()> {
        if self.role.trim().is_empty() {
            return Err(IpamError::validation("role", "range role cannot be empty"));
        }

        if self.start_addr > self.end_addr {
            return Err(IpamError::validation(
                "range",
                format!("start {} is after end {}", self.start_addr, self.end_addr),
            ));
        }

        let net = subnet.cidr()?;
        for address in [self.start_addr, self.end_addr] {
            if !net.contains(&address) {
                return Err(IpamError::validation(
                    "range",
                    format!("{address} is not within subnet {net}"),
                ));
            }
        }

        Ok(())
    }
}
