use std::net::Ipv4Addr;
use std::sync::OnceLock;

use ipnet::Ipv4Net;
use regex::Regex;

use crate::error::{IpamError, IpamResult};

pub const MIN_MASK: u8 = 1;
pub const MAX_MASK: u8 = 32;

fn dotted_quad_regex() -> &'static Regex {
    static DOTTED_QUAD: OnceLock<Regex> = OnceLock::new();
    DOTTED_QUAD.get_or_init(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap())
}

/// Parse a dotted-quad IPv4 address.
///
/// Only the plain `a.b.c.d` form is accepted; every octet must be at most 255.
pub fn parse_ipv4(value: &str) -> IpamResult<Ipv4Addr> {
    let value = value.trim();
    if !dotted_quad_regex().is_match(value) {
        return Err(IpamError::validation(
            "address",
            format!("'{value}' is not a dotted-quad IPv4 address"),
        ));
    }

    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(value.split('.')) {
        *slot = part.parse::<u8>().map_err(|_| {
            IpamError::validation("address", format!("octet '{part}' of '{value}' exceeds 255"))
        })?;
    }

    Ok(Ipv4Addr::from(octets))
}

pub fn validate_mask(mask: u8) -> IpamResult<()> {
    if !(MIN_MASK..=MAX_MASK).contains(&mask) {
        return Err(IpamError::validation(
            "mask",
            format!("mask /{mask} must be between {MIN_MASK} and {MAX_MASK}"),
        ));
    }
    Ok(())
}

/// Build the CIDR block for a prefix and mask.
pub fn cidr(prefix: Ipv4Addr, mask: u8) -> IpamResult<Ipv4Net> {
    validate_mask(mask)?;
    Ipv4Net::new(prefix, mask)
        .map_err(|e| IpamError::validation("mask", format!("/{mask} for {prefix}: {e}")))
}

/// Parse `a.b.c.d/n` into a prefix and mask. The prefix is not normalised.
pub fn parse_cidr(value: &str) -> IpamResult<(Ipv4Addr, u8)> {
    let (prefix, mask) = value.trim().split_once('/').ok_or_else(|| {
        IpamError::validation("prefix", format!("'{value}' is not in a.b.c.d/n notation"))
    })?;
    let mask = mask
        .parse::<u8>()
        .map_err(|_| IpamError::validation("mask", format!("'{mask}' is not a mask length")))?;
    validate_mask(mask)?;
    Ok((parse_ipv4(prefix)?, mask))
}

/// Whether `address` is the network or broadcast address of a block that has them.
pub fn is_reserved_edge(net: &Ipv4Net, address: Ipv4Addr) -> bool {
    net.prefix_len() < 31 && (address == net.network() || address == net.broadcast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(
            parse_ipv4("192.168.1.10").unwrap(),
            Ipv4Addr::new(192, 168, 1, 10)
        );
        assert_eq!(parse_ipv4(" 10.0.0.1 ").unwrap(), Ipv4Addr::new(10, 0, 0, 1));

        assert!(parse_ipv4("192.168.1").is_err());
        assert!(parse_ipv4("192.168.1.256").is_err());
        assert!(parse_ipv4("1234.1.1.1").is_err());
        assert!(parse_ipv4("a.b.c.d").is_err());
        assert!(parse_ipv4("10.0.0.1/24").is_err());
    }

    #[test]
    fn test_parse_cidr() {
        assert_eq!(
            parse_cidr("192.168.1.0/24").unwrap(),
            (Ipv4Addr::new(192, 168, 1, 0), 24)
        );
        assert!(parse_cidr("192.168.1.0").is_err());
        assert!(parse_cidr("192.168.1.0/33").is_err());
        assert!(parse_cidr("192.168.1.0/x").is_err());
    }

    #[test]
    fn test_validate_mask() {
        assert!(validate_mask(1).is_ok());
        assert!(validate_mask(32).is_ok());
        assert!(validate_mask(0).is_err());
        assert!(validate_mask(33).is_err());
    }

    #[test]
    fn test_reserved_edges() {
        let net = cidr(Ipv4Addr::new(10, 0, 0, 0), 24).unwrap();
        assert!(is_reserved_edge(&net, Ipv4Addr::new(10, 0, 0, 0)));
        assert!(is_reserved_edge(&net, Ipv4Addr::new(10, 0, 0, 255)));
        assert!(!is_reserved_edge(&net, Ipv4Addr::new(10, 0, 0, 1)));

        let p2p = cidr(Ipv4Addr::new(10, 0, 0, 0), 31).unwrap();
        assert!(!is_reserved_edge(&p2p, Ipv4Addr::new(10, 0, 0, 0)));
    }
}
