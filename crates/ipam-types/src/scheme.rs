use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

pub type SchemeId = u64;
pub type TemplateId = u64;

/// One relative range of a scheme, expressed as last-octet offsets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemeEntry {
    #[serde(rename = "start-octet")]
    pub start_octet: u8,
    #[serde(rename = "end-octet")]
    pub end_octet: u8,
    pub role: String,
    #[serde(default)]
    pub description: String,
}

/// A named, subnet-agnostic layout of ranges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RangeScheme {
    #[serde(default)]
    pub id: SchemeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub entries: Vec<SchemeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubnetTemplate {
    #[serde(default)]
    pub id: TemplateId,
    pub name: String,
    pub prefix: Ipv4Addr,
    pub mask: u8,
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub description: String,
}

/// Values used to prefill a new subnet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubnetPrefill {
    pub prefix: Ipv4Addr,
    pub mask: u8,
    pub gateway: Option<Ipv4Addr>,
    pub role: String,
    pub description: String,
}
