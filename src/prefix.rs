//! Prefix model
//!
//! Every address is widened to 128 bits before it touches the trie. IPv6
//! addresses are used as-is. IPv4 addresses are embedded in the
//! IPv4-compatible block `::/96`, so `1.2.3.0/24` becomes `::1.2.3.0/120`.
//!
//! There is no IPv4 aliasing: `::ffff:1.2.3.4` (IPv4-mapped) and
//! `2002:0102:0304::` (6to4) are ordinary IPv6 addresses and never match an
//! IPv4 entry. Insertion and lookup both go through [`Address::from`], so
//! the embedding cannot drift between the two.

use crate::error::{GeoIpError, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Width of the unified address space in bits
pub const ADDRESS_BITS: u8 = 128;

/// Bit offset of the IPv4 block inside the unified address space
pub const IPV4_OFFSET: u8 = 96;

/// A 128-bit address in the unified address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u128);

impl Address {
    /// Create an address from raw unified-space bits
    pub const fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    /// Raw unified-space bits
    pub const fn bits(self) -> u128 {
        self.0
    }

    /// Bit at `depth` counting from the most significant bit
    #[inline]
    pub fn bit(self, depth: u8) -> bool {
        debug_assert!(depth < ADDRESS_BITS);
        (self.0 >> (127 - depth as u32)) & 1 == 1
    }

    /// True if the address lies inside the embedded IPv4 block
    pub fn is_embedded_ipv4(self) -> bool {
        self.0 >> 32 == 0
    }

    /// Convert back to a standard library address
    pub fn to_ip(self) -> IpAddr {
        if self.is_embedded_ipv4() {
            IpAddr::V4(Ipv4Addr::from(self.0 as u32))
        } else {
            IpAddr::V6(Ipv6Addr::from(self.0))
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(addr: Ipv4Addr) -> Self {
        Self(u32::from(addr) as u128)
    }
}

impl From<Ipv6Addr> for Address {
    fn from(addr: Ipv6Addr) -> Self {
        Self(u128::from(addr))
    }
}

impl From<IpAddr> for Address {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => v4.into(),
            IpAddr::V6(v6) => v6.into(),
        }
    }
}

/// An address plus prefix length, with host bits cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix {
    address: Address,
    len: u8,
}

impl Prefix {
    /// Create a prefix in the unified address space
    ///
    /// Bits beyond `len` are cleared, so `10.1.2.3/8` and `10.0.0.0/8` are
    /// the same prefix.
    pub fn new(address: Address, len: u8) -> Result<Self> {
        if len > ADDRESS_BITS {
            return Err(GeoIpError::InvalidPrefix(format!(
                "prefix length {} exceeds {}",
                len, ADDRESS_BITS
            )));
        }
        Ok(Self {
            address: Address(address.0 & network_mask(len)),
            len,
        })
    }

    /// Normalize raw network-order address bytes and a prefix length
    ///
    /// `raw` must be 4 bytes (IPv4) or 16 bytes (IPv6); `prefix_len` is
    /// interpreted in that family's width.
    pub fn normalize(raw: &[u8], prefix_len: u8) -> Result<Self> {
        match raw.len() {
            4 => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(raw);
                Self::from_ip(IpAddr::V4(Ipv4Addr::from(octets)), prefix_len)
            }
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(raw);
                Self::from_ip(IpAddr::V6(Ipv6Addr::from(octets)), prefix_len)
            }
            n => Err(GeoIpError::InvalidPrefix(format!(
                "address must be 4 or 16 bytes, got {}",
                n
            ))),
        }
    }

    /// Create a prefix from a standard library address and family prefix length
    pub fn from_ip(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        match addr {
            IpAddr::V4(_) => {
                if prefix_len > 32 {
                    return Err(GeoIpError::InvalidPrefix(format!(
                        "IPv4 prefix length {} exceeds 32",
                        prefix_len
                    )));
                }
                Self::new(addr.into(), IPV4_OFFSET + prefix_len)
            }
            IpAddr::V6(_) => {
                if prefix_len > 128 {
                    return Err(GeoIpError::InvalidPrefix(format!(
                        "IPv6 prefix length {} exceeds 128",
                        prefix_len
                    )));
                }
                Self::new(addr.into(), prefix_len)
            }
        }
    }

    /// Single-address prefix
    pub fn host(addr: IpAddr) -> Self {
        Self {
            address: addr.into(),
            len: ADDRESS_BITS,
        }
    }

    /// Network address in the unified space
    pub fn address(&self) -> Address {
        self.address
    }

    /// Prefix length in the unified space (0-128)
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u8 {
        self.len
    }

    /// True if every address of `other` is also covered by `self`
    pub fn contains(&self, other: &Prefix) -> bool {
        other.len >= self.len
            && (other.address.0 & network_mask(self.len)) == self.address.0
    }

    /// True if `addr` falls inside this prefix
    pub fn contains_address(&self, addr: Address) -> bool {
        (addr.0 & network_mask(self.len)) == self.address.0
    }

    /// Length as seen by the address family (IPv4 prefixes drop the 96-bit offset)
    pub fn family_len(&self) -> u8 {
        if self.is_ipv4() {
            self.len - IPV4_OFFSET
        } else {
            self.len
        }
    }

    /// True if this prefix lies entirely inside the embedded IPv4 block
    pub fn is_ipv4(&self) -> bool {
        self.len >= IPV4_OFFSET && self.address.is_embedded_ipv4()
    }
}

impl Prefix {
    /// IPv6 notation regardless of family, so `1.2.3.0/24` reads `::102:300/120`
    pub fn to_ipv6_string(&self) -> String {
        format!("{}/{}", Ipv6Addr::from(self.address.0), self.len)
    }
}

/// Prefixes inside the embedded IPv4 block print as IPv4; use
/// [`Prefix::to_ipv6_string`] when the caller asked in IPv6 terms.
impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv4() {
            write!(
                f,
                "{}/{}",
                Ipv4Addr::from(self.address.0 as u32),
                self.family_len()
            )
        } else {
            write!(f, "{}/{}", Ipv6Addr::from(self.address.0), self.len)
        }
    }
}

impl FromStr for Prefix {
    type Err = GeoIpError;

    /// Parse `addr/len` CIDR notation or a bare address
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, len)) => {
                let addr = addr.parse::<IpAddr>().map_err(|e| {
                    GeoIpError::InvalidPrefix(format!("'{}': {}", s, e))
                })?;
                let len = len.parse::<u8>().map_err(|e| {
                    GeoIpError::InvalidPrefix(format!("'{}': bad prefix length: {}", s, e))
                })?;
                Self::from_ip(addr, len)
            }
            None => s
                .parse::<IpAddr>()
                .map(Self::host)
                .map_err(|e| GeoIpError::InvalidPrefix(format!("'{}': {}", s, e))),
        }
    }
}

/// Mask keeping the top `len` bits
#[inline]
fn network_mask(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        u128::MAX << (ADDRESS_BITS - len) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ipv4_embeds_at_offset() {
        let prefix = Prefix::normalize(&[10, 1, 0, 0], 16).unwrap();
        assert_eq!(prefix.len(), 112);
        assert_eq!(prefix.address().bits(), 0x0A01_0000);
        assert_eq!(prefix.family_len(), 16);
        assert!(prefix.is_ipv4());
    }

    #[test]
    fn test_normalize_ipv6() {
        let raw = "2001:db8::".parse::<Ipv6Addr>().unwrap().octets();
        let prefix = Prefix::normalize(&raw, 32).unwrap();
        assert_eq!(prefix.len(), 32);
        assert!(!prefix.is_ipv4());
        assert_eq!(prefix.to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_normalize_rejects_bad_width() {
        assert!(matches!(
            Prefix::normalize(&[1, 2, 3], 8),
            Err(GeoIpError::InvalidPrefix(_))
        ));
        assert!(matches!(
            Prefix::normalize(&[0u8; 8], 8),
            Err(GeoIpError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_long_prefix() {
        assert!(Prefix::normalize(&[1, 2, 3, 4], 33).is_err());
        assert!(Prefix::normalize(&[0u8; 16], 129).is_err());
        assert!(Prefix::normalize(&[1, 2, 3, 4], 32).is_ok());
        assert!(Prefix::normalize(&[0u8; 16], 128).is_ok());
    }

    #[test]
    fn test_host_bits_cleared() {
        let a: Prefix = "10.1.2.3/8".parse().unwrap();
        let b: Prefix = "10.0.0.0/8".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn test_containment() {
        let wide: Prefix = "10.0.0.0/8".parse().unwrap();
        let narrow: Prefix = "10.1.0.0/16".parse().unwrap();
        let other: Prefix = "11.0.0.0/16".parse().unwrap();
        assert!(wide.contains(&narrow));
        assert!(!narrow.contains(&wide));
        assert!(!wide.contains(&other));
        assert!(wide.contains(&wide));
    }

    #[test]
    fn test_no_ipv4_aliasing() {
        let v4: Prefix = "1.2.3.0/24".parse().unwrap();
        let mapped = Address::from("::ffff:1.2.3.4".parse::<IpAddr>().unwrap());
        let six_to_four = Address::from("2002:102:304::".parse::<IpAddr>().unwrap());
        assert!(v4.contains_address(Address::from("1.2.3.4".parse::<IpAddr>().unwrap())));
        assert!(!v4.contains_address(mapped));
        assert!(!v4.contains_address(six_to_four));
    }

    #[test]
    fn test_bare_address_is_host_prefix() {
        let p: Prefix = "8.8.8.8".parse().unwrap();
        assert_eq!(p.len(), 128);
        assert_eq!(p.family_len(), 32);
        assert_eq!(p.to_string(), "8.8.8.8/32");
    }

    #[test]
    fn test_zero_length_prefix_covers_everything() {
        let all: Prefix = "::/0".parse().unwrap();
        assert!(all.contains_address(Address::from_bits(u128::MAX)));
        assert!(all.contains_address(Address::from_bits(0)));
    }

    #[test]
    fn test_bit_order() {
        let addr = Address::from("128.0.0.1".parse::<IpAddr>().unwrap());
        assert!(!addr.bit(0));
        assert!(addr.bit(96));
        assert!(addr.bit(127));
        assert!(!addr.bit(126));
    }

    #[test]
    fn test_round_trip_to_ip() {
        let v4: IpAddr = "203.0.113.7".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(Address::from(v4).to_ip(), v4);
        assert_eq!(Address::from(v6).to_ip(), v6);
    }
}
