//! IPv4 CIDR arithmetic
//!
//! All conversions go through `u32`, so blocks of /8 and wider never pass
//! through signed intermediates.

use std::net::Ipv4Addr;
use std::ops::Range;

use serde::Serialize;

/// Widest window of a block the classifier will materialise.
pub const MAX_BLOCK_WINDOW: u32 = 65536;

/// Default page size for address views.
pub const DEFAULT_PAGE_SIZE: u32 = 256;

/// Number of addresses in a block, `2^(32 - mask)`.
pub fn block_size(mask: u8) -> u64 {
    1u64 << (32 - u32::from(mask.min(32)))
}

/// Addresses a host can use. /31 links use both ends, a /32 is the host itself.
pub fn usable_hosts(mask: u8) -> u64 {
    match mask {
        32 => 1,
        31 => 2,
        _ => block_size(mask) - 2,
    }
}

pub fn ip_to_int(address: Ipv4Addr) -> u32 {
    u32::from(address)
}

pub fn int_to_ip(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

pub fn netmask(mask: u8) -> u32 {
    match mask {
        0 => 0,
        m if m >= 32 => u32::MAX,
        m => u32::MAX << (32 - u32::from(m)),
    }
}

/// First and last address of the block holding `prefix`, as integers.
pub fn network_range(prefix: Ipv4Addr, mask: u8) -> (u32, u32) {
    let bits = netmask(mask);
    let start = ip_to_int(prefix) & bits;
    (start, start | !bits)
}

/// Network address + 1, for masks that leave room for hosts.
pub fn suggest_gateway(prefix: Ipv4Addr, mask: u8) -> Option<Ipv4Addr> {
    if !(1..=30).contains(&mask) {
        return None;
    }
    let (start, _) = network_range(prefix, mask);
    Some(int_to_ip(start + 1))
}

/// The slice of a subnet presented to address views.
///
/// Blocks wider than /24 are capped at [`MAX_BLOCK_WINDOW`] addresses and
/// start at `.0` of the prefix's third octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubnetBlock {
    pub base: [u8; 3],
    pub start_octet: u8,
    pub block_size: u32,
}

pub fn subnet_block(prefix: Ipv4Addr, mask: u8) -> SubnetBlock {
    let [a, b, c, d] = prefix.octets();
    if mask >= 24 {
        SubnetBlock {
            base: [a, b, c],
            start_octet: d,
            block_size: block_size(mask) as u32,
        }
    } else {
        SubnetBlock {
            base: [a, b, c],
            start_octet: 0,
            block_size: block_size(mask).min(u64::from(MAX_BLOCK_WINDOW)) as u32,
        }
    }
}

impl SubnetBlock {
    pub fn start(&self) -> Ipv4Addr {
        let [a, b, c] = self.base;
        Ipv4Addr::new(a, b, c, self.start_octet)
    }

    pub fn start_int(&self) -> u32 {
        ip_to_int(self.start())
    }

    /// Integer address at `offset`, if the offset lies inside the window.
    pub fn int_at(&self, offset: u32) -> Option<u32> {
        if offset >= self.block_size {
            return None;
        }
        self.start_int().checked_add(offset)
    }

    pub fn page_count(&self, page_size: u32) -> u32 {
        let page_size = page_size.max(1);
        self.block_size.div_ceil(page_size)
    }

    /// Offsets covered by page `page` (0-based), clamped to the window.
    pub fn page_offsets(&self, page: u32, page_size: u32) -> Range<u32> {
        let page_size = page_size.max(1);
        let start = page.saturating_mul(page_size).min(self.block_size);
        let end = start.saturating_add(page_size).min(self.block_size);
        start..end
    }
}
