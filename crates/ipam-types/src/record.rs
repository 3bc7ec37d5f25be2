use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subnet::{SiteId, SubnetId};

pub type RecordId = u64;
pub type DeviceId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    #[default]
    Active,
    Reserved,
    Dhcp,
    Deprecated,
}

impl std::fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressStatus::Active => write!(f, "active"),
            AddressStatus::Reserved => write!(f, "reserved"),
            AddressStatus::Dhcp => write!(f, "dhcp"),
            AddressStatus::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl std::str::FromStr for AddressStatus {
    type Err = crate::IpamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AddressStatus::Active),
            "reserved" => Ok(AddressStatus::Reserved),
            "dhcp" => Ok(AddressStatus::Dhcp),
            "deprecated" => Ok(AddressStatus::Deprecated),
            _ => Err(crate::IpamError::validation(
                "status",
                format!("unknown address status '{s}'"),
            )),
        }
    }
}

/// A managed address record, editable independently of any device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpAddressRecord {
    #[serde(default)]
    pub id: RecordId,
    pub address: Ipv4Addr,
    /// Mask of the parent subnet at the time the record was written.
    pub mask: u8,
    #[serde(rename = "subnet")]
    pub subnet_id: SubnetId,
    #[serde(default)]
    pub status: AddressStatus,
    #[serde(rename = "dns-name", default)]
    pub dns_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "assigned-to", default)]
    pub assigned_to: String,
    #[serde(rename = "updated-at", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl IpAddressRecord {
    pub fn new(subnet_id: SubnetId, address: Ipv4Addr, mask: u8) -> Self {
        Self {
            id: 0,
            address,
            mask,
            subnet_id,
            status: AddressStatus::Active,
            dns_name: String::new(),
            description: String::new(),
            assigned_to: String::new(),
            updated_at: None,
        }
    }

    /// Text shown for the record in address views.
    pub fn label(&self) -> Option<&str> {
        [self.assigned_to.as_str(), self.dns_name.as_str()]
            .into_iter()
            .find(|text| !text.is_empty())
    }
}

/// An inventory device. Its address field is the device's own view of its
/// binding and is matched against records by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    #[serde(default)]
    pub id: DeviceId,
    #[serde(rename = "site")]
    pub site_id: SiteId,
    pub name: String,
    #[serde(rename = "ip-address")]
    pub ip_address: Option<Ipv4Addr>,
    pub hostname: Option<String>,
    pub mac: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl Device {
    pub fn new(site_id: SiteId, name: &str) -> Self {
        Self {
            id: 0,
            site_id,
            name: name.to_string(),
            ip_address: None,
            hostname: None,
            mac: None,
            description: String::new(),
        }
    }

    pub fn with_address(mut self, address: Ipv4Addr) -> Self {
        self.ip_address = Some(address);
        self
    }
}
