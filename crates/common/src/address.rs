//! Address allocation for the interface's IPv4 pool
//!
//! The network and broadcast addresses of the range are reserved. The server
//! takes the first usable address; peers get the lowest free one after it.

use crate::{Error, Result};
use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// IPv4 range peers are allocated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPool {
    network: Ipv4Network,
}

impl AddressPool {
    /// Parse a CIDR such as `10.8.0.0/24`. Host bits are masked off.
    pub fn parse(cidr: &str) -> Result<Self> {
        let parsed: Ipv4Network = cidr.trim().parse().map_err(|e| {
            Error::Configuration(format!("invalid address range {:?}: {}", cidr, e))
        })?;

        // server + at least one peer
        if parsed.prefix() > 30 {
            return Err(Error::Configuration(format!(
                "address range {} has no room for peers",
                cidr
            )));
        }

        let network = Ipv4Network::new(parsed.network(), parsed.prefix())
            .map_err(|e| Error::Configuration(e.to_string()))?;
        Ok(Self { network })
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    pub fn network(&self) -> Ipv4Network {
        self.network
    }

    fn first(&self) -> u32 {
        u32::from(self.network.network())
    }

    fn last(&self) -> u32 {
        u32::from(self.network.broadcast())
    }

    /// Address the server itself takes on first boot
    pub fn server_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first() + 1)
    }

    /// Whether `addr` lies strictly between the reserved first and last address
    pub fn contains_host(&self, addr: Ipv4Addr) -> bool {
        let value = u32::from(addr);
        value > self.first() && value < self.last()
    }

    /// Lowest address strictly inside the range that is not in `occupied`
    pub fn allocate(&self, occupied: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr> {
        (self.first() + 1..self.last())
            .map(Ipv4Addr::from)
            .find(|addr| !occupied.contains(addr))
            .ok_or_else(|| Error::CapacityExhausted {
                range: self.network.to_string(),
            })
    }
}

impl std::fmt::Display for AddressPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.network)
    }
}

/// Parse a dotted-quad IPv4 address supplied by a caller
pub fn parse_ipv4(input: &str) -> Result<Ipv4Addr> {
    input
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("{:?} is not a valid IPv4 address", input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(addrs: &[[u8; 4]]) -> HashSet<Ipv4Addr> {
        addrs.iter().map(|a| Ipv4Addr::from(*a)).collect()
    }

    #[test]
    fn test_server_address_is_first_usable() {
        let pool = AddressPool::parse("10.8.0.0/24").unwrap();
        assert_eq!(pool.server_address(), Ipv4Addr::new(10, 8, 0, 1));
    }

    #[test]
    fn test_host_bits_are_masked() {
        let pool = AddressPool::parse("10.8.0.77/24").unwrap();
        assert_eq!(pool.to_string(), "10.8.0.0/24");
    }

    #[test]
    fn test_allocates_lowest_free() {
        let pool = AddressPool::parse("10.8.0.0/24").unwrap();
        let taken = occupied(&[[10, 8, 0, 1]]);
        assert_eq!(pool.allocate(&taken).unwrap(), Ipv4Addr::new(10, 8, 0, 2));

        let taken = occupied(&[[10, 8, 0, 1], [10, 8, 0, 2], [10, 8, 0, 4]]);
        assert_eq!(pool.allocate(&taken).unwrap(), Ipv4Addr::new(10, 8, 0, 3));
    }

    #[test]
    fn test_never_hands_out_reserved() {
        let pool = AddressPool::parse("192.168.5.0/30").unwrap();
        // .0 network, .3 broadcast; .1 server, .2 the only peer slot
        let taken = occupied(&[[192, 168, 5, 1]]);
        assert_eq!(pool.allocate(&taken).unwrap(), Ipv4Addr::new(192, 168, 5, 2));

        let taken = occupied(&[[192, 168, 5, 1], [192, 168, 5, 2]]);
        assert!(matches!(
            pool.allocate(&taken),
            Err(Error::CapacityExhausted { .. })
        ));
    }

    #[test]
    fn test_sequential_allocations_are_distinct() {
        let pool = AddressPool::parse("10.0.0.0/28").unwrap();
        let mut taken = occupied(&[[10, 0, 0, 1]]);
        for _ in 0..13 {
            let addr = pool.allocate(&taken).unwrap();
            assert!(pool.contains_host(addr));
            assert!(taken.insert(addr));
        }
        assert!(pool.allocate(&taken).is_err());
        assert_eq!(taken.len(), 14);
    }

    #[test]
    fn test_contains_host_excludes_bounds() {
        let pool = AddressPool::parse("10.8.0.0/24").unwrap();
        assert!(!pool.contains_host(Ipv4Addr::new(10, 8, 0, 0)));
        assert!(!pool.contains_host(Ipv4Addr::new(10, 8, 0, 255)));
        assert!(!pool.contains_host(Ipv4Addr::new(10, 8, 1, 2)));
        assert!(pool.contains_host(Ipv4Addr::new(10, 8, 0, 254)));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(AddressPool::parse("10.8.0.x").is_err());
        assert!(AddressPool::parse("10.8.0.0/31").is_err());
        assert!(AddressPool::parse("").is_err());
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4(" 10.8.0.9 ").unwrap(), Ipv4Addr::new(10, 8, 0, 9));
        assert!(parse_ipv4("10.8.0").unwrap_err().is_validation());
        assert!(parse_ipv4("fe80::1").is_err());
    }
}
