//! Subnet overlap detection

use serde::Serialize;

use labipam_types::{Subnet, SubnetId};

use crate::arithmetic::{block_size, ip_to_int, netmask};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapWarning {
    #[serde(rename = "subnet-a")]
    pub subnet_a: SubnetId,
    #[serde(rename = "subnet-b")]
    pub subnet_b: SubnetId,
    #[serde(rename = "cidr-a")]
    pub cidr_a: String,
    #[serde(rename = "cidr-b")]
    pub cidr_b: String,
}

/// Inclusive integer span of a subnet's block.
fn block_span(subnet: &Subnet) -> (u32, u32) {
    let start = ip_to_int(subnet.prefix) & netmask(subnet.mask);
    let last_offset = (block_size(subnet.mask) - 1).min(u64::from(u32::MAX)) as u32;
    (start, start.saturating_add(last_offset))
}

pub fn blocks_overlap(a: &Subnet, b: &Subnet) -> bool {
    let (start_a, end_a) = block_span(a);
    let (start_b, end_b) = block_span(b);
    start_a <= end_b && start_b <= end_a
}

/// Every unordered pair of overlapping subnets, in input order.
pub fn detect_overlaps(subnets: &[Subnet]) -> Vec<OverlapWarning> {
    let mut warnings = Vec::new();
    for (i, a) in subnets.iter().enumerate() {
        for b in &subnets[i + 1..] {
            if blocks_overlap(a, b) {
                warnings.push(OverlapWarning {
                    subnet_a: a.id,
                    subnet_b: b.id,
                    cidr_a: a.to_string(),
                    cidr_b: b.to_string(),
                });
            }
        }
    }
    warnings
}

/// Overlaps between `candidate` and the existing subnets.
pub fn overlaps_with(candidate: &Subnet, existing: &[Subnet]) -> Vec<OverlapWarning> {
    existing
        .iter()
        .filter(|other| other.id != candidate.id || candidate.id == 0)
        .filter(|other| blocks_overlap(candidate, other))
        .map(|other| OverlapWarning {
            subnet_a: candidate.id,
            subnet_b: other.id,
            cidr_a: candidate.to_string(),
            cidr_b: other.to_string(),
        })
        .collect()
}
